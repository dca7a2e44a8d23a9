//! Shared identity, metadata, and error types for the GitOps object storage
//! core. Every other `gitops-*` crate depends on this one and nothing else
//! in the workspace depends on them (§2: crate dependency direction).

mod annotation;
mod cancel;
mod error;
mod gvk;
mod id;
mod meta;
mod variants;

pub use annotation::{comment_source, set_comment_source, take_comment_source, COMMENT_SOURCE_ANNOTATION};
pub use cancel::Cancellation;
pub use error::{
    ContentType, ConversionCause, Error, FieldError, PatchKind, Result, UnrecognizedCause,
};
pub use gvk::{Gk, Group, GroupKind, GroupVersion, GroupVersionKind, Gvk, Kind, Version, HUB_VERSION};
pub use id::{ObjectId, UnversionedObjectId};
pub use meta::{Object, ObjectList, ObjectMeta, TypeMeta};
pub use variants::{Partial, Unknown, Unstructured};
