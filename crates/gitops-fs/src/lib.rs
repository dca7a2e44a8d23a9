//! A cancellation-aware filesystem abstraction (§6), plus a local-disk
//! implementation used by `gitops-storage`.

mod local;

pub use local::LocalFilesystem;

use std::path::{Path, PathBuf};

use gitops_core::{Cancellation, ContentType, Result};

/// One entry found by `read_dir`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// The result of `stat` (§4.6): a checksum plus enough metadata for the
/// raw storage layer's cache-invalidation decisions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileStat {
    pub is_dir: bool,
    pub len: u64,
    /// Defaults to the modification timestamp in nanoseconds, rendered as
    /// a decimal string; a richer implementation may substitute a content
    /// hash or similar (§4.6: "if the filesystem's `stat` result
    /// advertises a richer checksum via a recognized capability, it is
    /// preferred").
    pub checksum: String,
}

/// A filesystem abstraction every operation on which accepts a
/// `Cancellation` token (§6).
pub trait Filesystem: Send + Sync {
    fn mkdir_all(&self, path: &Path, cancel: &Cancellation) -> Result<()>;
    fn remove(&self, path: &Path, cancel: &Cancellation) -> Result<()>;
    fn stat(&self, path: &Path, cancel: &Cancellation) -> Result<FileStat>;
    fn read_dir(&self, path: &Path, cancel: &Cancellation) -> Result<Vec<DirEntry>>;
    fn exists(&self, path: &Path, cancel: &Cancellation) -> Result<bool>;
    fn read_file(&self, path: &Path, cancel: &Cancellation) -> Result<Vec<u8>>;
    fn write_file(&self, path: &Path, content: &[u8], cancel: &Cancellation) -> Result<()>;
    /// Recursively list every regular file under `root`.
    fn walk(&self, root: &Path, cancel: &Cancellation) -> Result<Vec<PathBuf>>;
}

/// Recognize a path's content type from its extension (§6).
pub fn content_type_of(path: &Path) -> Option<ContentType> {
    let ext = path.extension()?.to_str()?;
    ContentType::from_extension(&format!(".{ext}"))
}
