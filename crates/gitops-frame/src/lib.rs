//! Splits a byte stream into semantic frames — YAML documents separated by
//! a `---` line, or concatenated top-level JSON values — and writes them
//! back out with the right separator discipline (§4.2).

mod reader;
mod single;
mod writer;

pub use gitops_core::ContentType;
pub use reader::{frame_reader, FrameReader, IoFrameReader};
pub use single::SingleFrameReader;
pub use writer::{frame_writer, FrameWriter, IoFrameWriter};

/// Default per-frame size cap before `Error::FrameOverflow` is raised.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Initial read-buffer size; doubles on each refill that doesn't yet
/// contain a full frame.
pub const INITIAL_BUFFER_SIZE: usize = 64 * 1024;
