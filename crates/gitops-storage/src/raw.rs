//! Raw storage (§4.6): a byte-level store keyed by `UnversionedObjectId`,
//! delegating paths to a `FileFinder` and bytes to a `Filesystem`.

use std::path::PathBuf;
use std::sync::Arc;

use gitops_core::{Cancellation, ContentType, Error, GroupKind, Result, UnversionedObjectId, Version};
use gitops_fs::Filesystem;

use crate::finder::FileFinder;
use crate::namespace::NamespaceScope;

/// Result of `RawStorage::stat` (§4.6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawStat {
    pub content_type: ContentType,
    pub checksum: String,
    pub path: PathBuf,
    pub id: UnversionedObjectId,
}

/// A FileFinder's path resolution sometimes depends on a pinned version
/// (a caller-supplied `extensionResolver` may branch on it), but raw
/// storage only ever knows a GK/name/namespace. Path-resolution calls pin
/// the group's hub sentinel, which every variant in this crate ignores
/// for everything but a version-aware `extensionResolver`.
fn pin_hub(id: &UnversionedObjectId) -> gitops_core::ObjectId {
    id.with_version(Version::hub())
}

pub struct RawStorage {
    finder: Arc<dyn FileFinder>,
    fs: Arc<dyn Filesystem>,
    scope: NamespaceScope,
}

impl RawStorage {
    pub fn new(finder: Arc<dyn FileFinder>, fs: Arc<dyn Filesystem>, scope: NamespaceScope) -> Self {
        Self { finder, fs, scope }
    }

    fn validate_namespace(&self, id: &UnversionedObjectId) -> Result<()> {
        let namespaced = self.scope.is_namespaced(&id.gk);
        if namespaced && id.namespace.is_empty() {
            return Err(Error::NamespacedMismatch {
                gk: id.gk.clone(),
                namespace: id.namespace.clone(),
            });
        }
        if !namespaced && !id.namespace.is_empty() {
            return Err(Error::NamespacedMismatch {
                gk: id.gk.clone(),
                namespace: id.namespace.clone(),
            });
        }
        Ok(())
    }

    fn path_for(&self, id: &UnversionedObjectId) -> Result<PathBuf> {
        self.finder.object_path(&pin_hub(id))
    }

    pub fn content_type(&self, id: &UnversionedObjectId) -> Result<ContentType> {
        self.validate_namespace(id)?;
        self.finder.content_type(&pin_hub(id))
    }

    pub fn exists(&self, id: &UnversionedObjectId, cancel: &Cancellation) -> Result<bool> {
        self.validate_namespace(id)?;
        let path = self.path_for(id)?;
        self.fs.exists(&path, cancel)
    }

    pub fn read(&self, id: &UnversionedObjectId, cancel: &Cancellation) -> Result<Vec<u8>> {
        self.validate_namespace(id)?;
        let path = self.path_for(id)?;
        self.fs.read_file(&path, cancel)
    }

    pub fn write(&self, id: &UnversionedObjectId, content: &[u8], cancel: &Cancellation) -> Result<()> {
        self.validate_namespace(id)?;
        let path = self.path_for(id)?;
        self.fs.write_file(&path, content, cancel)
    }

    pub fn delete(&self, id: &UnversionedObjectId, cancel: &Cancellation) -> Result<()> {
        self.validate_namespace(id)?;
        let path = self.path_for(id)?;
        self.fs.remove(&path, cancel)
    }

    pub fn stat(&self, id: &UnversionedObjectId, cancel: &Cancellation) -> Result<RawStat> {
        self.validate_namespace(id)?;
        let path = self.path_for(id)?;
        let content_type = self.finder.content_type(&pin_hub(id))?;
        let stat = self.fs.stat(&path, cancel)?;
        Ok(RawStat {
            content_type,
            checksum: stat.checksum,
            path,
            id: id.clone(),
        })
    }

    pub fn list_namespaces(&self, gk: &GroupKind) -> Result<Vec<String>> {
        self.finder.list_namespaces(gk)
    }

    pub fn list_object_ids(&self, gk: &GroupKind, namespace: &str) -> Result<Vec<UnversionedObjectId>> {
        self.finder.list_object_ids(gk, namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple::{LayoutOptions, SimpleFileFinder};
    use gitops_core::GroupKind;
    use gitops_fs::LocalFilesystem;

    fn storage(dir: &std::path::Path, scope: NamespaceScope) -> RawStorage {
        let finder = Arc::new(SimpleFileFinder::new(dir, scope.clone(), LayoutOptions::default()));
        let fs = Arc::new(LocalFilesystem::new());
        RawStorage::new(finder, fs, scope)
    }

    fn gk() -> GroupKind {
        GroupKind::new("foogroup", "Simple")
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path(), NamespaceScope::new());
        let cancel = Cancellation::new();
        let id = UnversionedObjectId::new(gk(), "a", "");
        storage.write(&id, b"hello", &cancel).unwrap();
        assert_eq!(storage.read(&id, &cancel).unwrap(), b"hello");
        assert!(storage.exists(&id, &cancel).unwrap());
    }

    #[test]
    fn namespaced_id_without_namespace_fails() {
        let dir = tempfile::tempdir().unwrap();
        let scope = NamespaceScope::new().mark_namespaced(gk());
        let storage = storage(dir.path(), scope);
        let cancel = Cancellation::new();
        let id = UnversionedObjectId::new(gk(), "a", "");
        let err = storage.write(&id, b"hello", &cancel).unwrap_err();
        assert!(matches!(err, Error::NamespacedMismatch { .. }));
    }

    #[test]
    fn non_namespaced_id_with_namespace_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path(), NamespaceScope::new());
        let cancel = Cancellation::new();
        let id = UnversionedObjectId::new(gk(), "a", "ns1");
        let err = storage.write(&id, b"hello", &cancel).unwrap_err();
        assert!(matches!(err, Error::NamespacedMismatch { .. }));
    }

    #[test]
    fn stat_reports_checksum_and_path() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path(), NamespaceScope::new());
        let cancel = Cancellation::new();
        let id = UnversionedObjectId::new(gk(), "a", "");
        storage.write(&id, b"hello", &cancel).unwrap();
        let stat = storage.stat(&id, &cancel).unwrap();
        assert_eq!(stat.content_type, ContentType::Yaml);
        assert!(!stat.checksum.is_empty());
    }

    #[test]
    fn delete_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path(), NamespaceScope::new());
        let cancel = Cancellation::new();
        let id = UnversionedObjectId::new(gk(), "a", "");
        storage.write(&id, b"hello", &cancel).unwrap();
        storage.delete(&id, &cancel).unwrap();
        assert!(!storage.exists(&id, &cancel).unwrap());
    }
}
