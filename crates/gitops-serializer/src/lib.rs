//! Strict decode/encode, defaulting, conversion, comment preservation, and
//! patching on top of a frame reader/writer and a type registry (§4.3).

mod comments;
mod decode;
mod defaulting;
mod encode;
mod patch;

pub use decode::{DecodeOptions, Decoded, Decoder};
pub use defaulting::{Converter, Defaulter};
pub use encode::{EncodeOptions, Encoder};
pub use patch::{apply_patch, Patcher};
