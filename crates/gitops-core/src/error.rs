use std::path::PathBuf;

use crate::gvk::GroupKind;
use crate::gvk::GroupVersionKind;
use crate::id::UnversionedObjectId;

/// A single field-level validation failure, attached to `Error::Invalid`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Which part of TypeMeta made a frame's GVK unrecognized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnrecognizedCause {
    Group,
    Version,
    Kind,
}

impl std::fmt::Display for UnrecognizedCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            UnrecognizedCause::Group => "group",
            UnrecognizedCause::Version => "version",
            UnrecognizedCause::Kind => "kind",
        })
    }
}

/// Which leg of a conversion failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConversionCause {
    To,
    From,
    SchemeSetup,
    InvalidArgs,
}

impl std::fmt::Display for ConversionCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConversionCause::To => "convert-to",
            ConversionCause::From => "convert-from",
            ConversionCause::SchemeSetup => "scheme-setup",
            ConversionCause::InvalidArgs => "invalid-args",
        })
    }
}

/// The byte-level content type a frame/resource is encoded as (§6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContentType {
    Yaml,
    Json,
}

impl ContentType {
    pub fn extension(&self) -> &'static str {
        match self {
            ContentType::Yaml => ".yaml",
            ContentType::Json => ".json",
        }
    }

    /// Recognize a content type from a file extension (including the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            ".yaml" | ".yml" => Some(ContentType::Yaml),
            ".json" => Some(ContentType::Json),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ContentType::Yaml => "yaml",
            ContentType::Json => "json",
        })
    }
}

/// One of the three patch strategies the Patcher dispatches on (§4.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchKind {
    JsonMerge,
    JsonPatch,
    StrategicMerge,
}

impl std::fmt::Display for PatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PatchKind::JsonMerge => "json-merge",
            PatchKind::JsonPatch => "json-patch",
            PatchKind::StrategicMerge => "strategic-merge",
        })
    }
}

/// The unified error taxonomy surfaced across every component boundary (§7).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("object not found: {0}")]
    NotFound(UnversionedObjectId),

    #[error("object already exists: {0}")]
    AlreadyExists(UnversionedObjectId),

    #[error("object {id} is invalid: {errors:?}")]
    Invalid {
        id: UnversionedObjectId,
        errors: Vec<FieldError>,
    },

    #[error("unrecognized {cause}: {gvk}")]
    UnrecognizedType {
        gvk: GroupVersionKind,
        cause: UnrecognizedCause,
        raw_bytes: Vec<u8>,
    },

    #[error("group-kind {gk} does not match namespace {namespace:?}")]
    NamespacedMismatch { gk: GroupKind, namespace: String },

    #[error("no such namespace: {0}")]
    NoSuchNamespace(String),

    #[error("name is required")]
    NameRequired,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("cannot save a partial/metadata-only object")]
    CannotSaveMetadata,

    #[error("frame exceeds the maximum allowed size")]
    FrameOverflow,

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(ContentType),

    #[error("unsupported patch type: {0}")]
    UnsupportedPatchType(PatchKind),

    #[error("too many watches: only one subscriber is supported")]
    TooManyWatches,

    #[error("not tracked: {0}")]
    NotTracked(String),

    #[error("a file contains more than one frame, which mapped storage does not support: {0}")]
    MultiFrameFile(PathBuf),

    #[error("strict decode: {0}")]
    StrictDecode(String),

    #[error("conversion failed ({cause}) for {gvk}")]
    Conversion {
        gvk: GroupVersionKind,
        cause: ConversionCause,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("operation was cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse JSON")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }
}
