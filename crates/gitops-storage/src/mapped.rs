//! Cache-backed ("Mapped") FileFinder (§4.5.2): a three-level mapping
//! `GroupKind -> namespace -> name -> ChecksumPath`, kept in sync by the
//! caller (typically a watch-driven reconciler) rather than derived from a
//! fixed layout.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use gitops_core::{ContentType, Error, GroupKind, ObjectId, Result, UnversionedObjectId};
use parking_lot::Mutex;

use crate::finder::FileFinder;

/// A path plus the checksum it was last observed with, used by the watch
/// pipeline to decide whether a reconciliation is stale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChecksumPath {
    pub path: PathBuf,
    pub checksum: String,
}

impl ChecksumPath {
    pub fn new(path: impl Into<PathBuf>, checksum: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            checksum: checksum.into(),
        }
    }
}

type NameMap = HashMap<String, ChecksumPath>;
type NamespaceMap = HashMap<String, NameMap>;

/// A `FileFinder` whose mapping is populated externally (`set_mapping`,
/// `set_mappings`, `delete_mapping`) instead of derived from a fixed
/// directory layout. `object_path`/`content_type` fail with
/// `Error::NotTracked` for any ID not yet in the cache.
#[derive(Default)]
pub struct MappedFileFinder {
    cache: Mutex<HashMap<GroupKind, NamespaceMap>>,
}

impl MappedFileFinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mapping(&self, id: UnversionedObjectId, path: ChecksumPath) {
        let mut cache = self.cache.lock();
        cache
            .entry(id.gk)
            .or_default()
            .entry(id.namespace)
            .or_default()
            .insert(id.name, path);
    }

    pub fn set_mappings(&self, mappings: Vec<(UnversionedObjectId, ChecksumPath)>) {
        let mut cache = self.cache.lock();
        cache.clear();
        drop(cache);
        for (id, path) in mappings {
            self.set_mapping(id, path);
        }
    }

    pub fn delete_mapping(&self, id: &UnversionedObjectId) {
        let mut cache = self.cache.lock();
        if let Some(namespaces) = cache.get_mut(&id.gk) {
            if let Some(names) = namespaces.get_mut(&id.namespace) {
                names.remove(&id.name);
            }
        }
    }

    fn lookup(&self, id: &UnversionedObjectId) -> Option<ChecksumPath> {
        let cache = self.cache.lock();
        cache.get(&id.gk)?.get(&id.namespace)?.get(&id.name).cloned()
    }

    /// The current path/checksum entry for `id`, if tracked. Used by
    /// callers (e.g. move reconciliation) that need the prior checksum
    /// rather than just the path.
    pub fn mapping(&self, id: &UnversionedObjectId) -> Option<ChecksumPath> {
        self.lookup(id)
    }
}

impl FileFinder for MappedFileFinder {
    fn object_path(&self, id: &ObjectId) -> Result<PathBuf> {
        let unversioned = id.without_version();
        self.lookup(&unversioned)
            .map(|cp| cp.path)
            .ok_or_else(|| Error::NotTracked(unversioned.to_string()))
    }

    fn object_at(&self, path: &Path) -> Result<ObjectId> {
        let cache = self.cache.lock();
        for (gk, namespaces) in cache.iter() {
            for (namespace, names) in namespaces.iter() {
                for (name, cp) in names.iter() {
                    if cp.path == path {
                        let unversioned = UnversionedObjectId::new(gk.clone(), name.clone(), namespace.clone());
                        return Ok(unversioned.with_version(gitops_core::Version::hub()));
                    }
                }
            }
        }
        Err(Error::NotTracked(path.display().to_string()))
    }

    fn list_namespaces(&self, gk: &GroupKind) -> Result<Vec<String>> {
        let cache = self.cache.lock();
        let mut namespaces: Vec<String> = cache.get(gk).map(|m| m.keys().cloned().collect()).unwrap_or_default();
        namespaces.sort();
        Ok(namespaces)
    }

    fn list_object_ids(&self, gk: &GroupKind, namespace: &str) -> Result<Vec<UnversionedObjectId>> {
        let cache = self.cache.lock();
        let mut ids: Vec<UnversionedObjectId> = cache
            .get(gk)
            .and_then(|m| m.get(namespace))
            .map(|names| {
                names
                    .keys()
                    .map(|name| UnversionedObjectId::new(gk.clone(), name.clone(), namespace))
                    .collect()
            })
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }

    fn content_type(&self, id: &ObjectId) -> Result<ContentType> {
        let unversioned = id.without_version();
        let cp = self
            .lookup(&unversioned)
            .ok_or_else(|| Error::NotTracked(unversioned.to_string()))?;
        cp.path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(|e| ContentType::from_extension(&format!(".{e}")))
            .ok_or_else(|| Error::other(format!("cannot infer content type for {}", cp.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitops_core::GroupVersionKind;

    fn gk() -> GroupKind {
        GroupKind::new("foogroup", "Simple")
    }

    fn id(namespace: &str, name: &str) -> ObjectId {
        ObjectId::new(GroupVersionKind::new("foogroup", "v1alpha1", "Simple"), name, namespace)
    }

    #[test]
    fn unmapped_id_fails_with_not_tracked() {
        let finder = MappedFileFinder::new();
        let err = finder.object_path(&id("ns1", "a")).unwrap_err();
        assert!(matches!(err, Error::NotTracked(_)));
    }

    #[test]
    fn set_mapping_then_object_path_succeeds() {
        let finder = MappedFileFinder::new();
        finder.set_mapping(
            UnversionedObjectId::new(gk(), "a", "ns1"),
            ChecksumPath::new("/root/a.yaml", "123"),
        );
        let path = finder.object_path(&id("ns1", "a")).unwrap();
        assert_eq!(path, PathBuf::from("/root/a.yaml"));
    }

    #[test]
    fn delete_mapping_removes_entry() {
        let finder = MappedFileFinder::new();
        let uid = UnversionedObjectId::new(gk(), "a", "ns1");
        finder.set_mapping(uid.clone(), ChecksumPath::new("/root/a.yaml", "123"));
        finder.delete_mapping(&uid);
        assert!(finder.object_path(&id("ns1", "a")).is_err());
    }

    #[test]
    fn object_at_scans_for_matching_path() {
        let finder = MappedFileFinder::new();
        finder.set_mapping(
            UnversionedObjectId::new(gk(), "a", "ns1"),
            ChecksumPath::new("/root/a.yaml", "123"),
        );
        let found = finder.object_at(Path::new("/root/a.yaml")).unwrap();
        assert_eq!(found.name, "a");
        assert_eq!(found.namespace, "ns1");
    }

    #[test]
    fn list_object_ids_reflects_current_mappings() {
        let finder = MappedFileFinder::new();
        finder.set_mapping(UnversionedObjectId::new(gk(), "a", "ns1"), ChecksumPath::new("/root/a.yaml", "1"));
        finder.set_mapping(UnversionedObjectId::new(gk(), "b", "ns1"), ChecksumPath::new("/root/b.yaml", "2"));
        let ids = finder.list_object_ids(&gk(), "ns1").unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn set_mappings_replaces_the_whole_cache() {
        let finder = MappedFileFinder::new();
        finder.set_mapping(UnversionedObjectId::new(gk(), "a", "ns1"), ChecksumPath::new("/root/a.yaml", "1"));
        finder.set_mappings(vec![(
            UnversionedObjectId::new(gk(), "b", "ns1"),
            ChecksumPath::new("/root/b.yaml", "2"),
        )]);
        assert!(finder.object_path(&id("ns1", "a")).is_err());
        assert!(finder.object_path(&id("ns1", "b")).is_ok());
    }

    #[test]
    fn content_type_inferred_from_extension() {
        let finder = MappedFileFinder::new();
        finder.set_mapping(UnversionedObjectId::new(gk(), "a", "ns1"), ChecksumPath::new("/root/a.json", "1"));
        assert_eq!(finder.content_type(&id("ns1", "a")).unwrap(), ContentType::Json);
    }
}
