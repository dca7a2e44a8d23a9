//! FileFinder: maps object identity to/from relative filesystem paths
//! (§4.5). Two variants share this interface: `SimpleFileFinder`
//! (layout-derived) and `MappedFileFinder` (cache-backed).

use std::path::{Path, PathBuf};

use gitops_core::{ContentType, GroupKind, ObjectId, Result, UnversionedObjectId};

pub trait FileFinder: Send + Sync {
    fn object_path(&self, id: &ObjectId) -> Result<PathBuf>;
    fn object_at(&self, path: &Path) -> Result<ObjectId>;
    fn list_namespaces(&self, gk: &GroupKind) -> Result<Vec<String>>;
    fn list_object_ids(&self, gk: &GroupKind, namespace: &str) -> Result<Vec<UnversionedObjectId>>;
    fn content_type(&self, id: &ObjectId) -> Result<ContentType>;
}
