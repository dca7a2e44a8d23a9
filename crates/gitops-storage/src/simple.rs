//! Layout-derived ("Simple") FileFinder (§4.5.1).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use gitops_core::{ContentType, Error, GroupKind, ObjectId, Result, UnversionedObjectId};
use walkdir::WalkDir;

use crate::finder::FileFinder;
use crate::namespace::NamespaceScope;

pub type ExtensionResolver = Arc<dyn Fn(&ObjectId) -> ContentType + Send + Sync>;

/// Layout options (§4.5.1).
#[derive(Clone)]
pub struct LayoutOptions {
    pub disable_group_directory: bool,
    pub sub_directory_file_name: Option<String>,
    pub content_type: ContentType,
    pub extension_resolver: Option<ExtensionResolver>,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            disable_group_directory: false,
            sub_directory_file_name: None,
            content_type: ContentType::Yaml,
            extension_resolver: None,
        }
    }
}

impl std::fmt::Debug for LayoutOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutOptions")
            .field("disable_group_directory", &self.disable_group_directory)
            .field("sub_directory_file_name", &self.sub_directory_file_name)
            .field("content_type", &self.content_type)
            .field("extension_resolver", &self.extension_resolver.is_some())
            .finish()
    }
}

/// Deterministic path from ID plus layout options (§4.5.1). `object_at` is
/// unsupported: the layout is not injective enough for reliable reverse
/// lookup under all options.
pub struct SimpleFileFinder {
    root: PathBuf,
    scope: NamespaceScope,
    options: LayoutOptions,
}

impl SimpleFileFinder {
    pub fn new(root: impl Into<PathBuf>, scope: NamespaceScope, options: LayoutOptions) -> Self {
        Self {
            root: root.into(),
            scope,
            options,
        }
    }

    fn extension_for(&self, id: &ObjectId) -> &'static str {
        match &self.options.extension_resolver {
            Some(f) => f(id).extension(),
            None => self.options.content_type.extension(),
        }
    }

    fn base_dir(&self, gk: &GroupKind) -> PathBuf {
        let mut p = self.root.clone();
        if !self.options.disable_group_directory && !gk.group.is_empty() {
            p.push(gk.group.as_str());
        }
        p.push(gk.kind.as_str());
        p
    }

    fn leaf_dir(&self, gk: &GroupKind, namespace: &str) -> PathBuf {
        let mut p = self.base_dir(gk);
        if self.scope.is_namespaced(gk) {
            p.push(namespace);
        }
        p
    }
}

impl FileFinder for SimpleFileFinder {
    fn object_path(&self, id: &ObjectId) -> Result<PathBuf> {
        let gk = id.gvk.group_kind();
        let mut p = self.leaf_dir(&gk, &id.namespace);
        let ext = self.extension_for(id);
        match &self.options.sub_directory_file_name {
            Some(name) => {
                p.push(&id.name);
                p.push(format!("{name}{ext}"));
            }
            None => p.push(format!("{}{}", id.name, ext)),
        }
        Ok(p)
    }

    fn object_at(&self, _path: &Path) -> Result<ObjectId> {
        Err(Error::other(
            "SimpleFileFinder does not support reverse lookup: the layout is not injective enough under all options",
        ))
    }

    fn list_namespaces(&self, gk: &GroupKind) -> Result<Vec<String>> {
        let base = self.base_dir(gk);
        if !base.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in WalkDir::new(&base).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| Error::other(e.to_string()))?;
            if entry.file_type().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn list_object_ids(&self, gk: &GroupKind, namespace: &str) -> Result<Vec<UnversionedObjectId>> {
        let leaf = self.leaf_dir(gk, namespace);
        if !leaf.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in WalkDir::new(&leaf).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| Error::other(e.to_string()))?;
            match &self.options.sub_directory_file_name {
                Some(sub_name) => {
                    if !entry.file_type().is_dir() {
                        continue;
                    }
                    let has_marker = self.options.content_type.extension();
                    let marker = entry.path().join(format!("{sub_name}{has_marker}"));
                    if marker.exists() {
                        if let Some(name) = entry.file_name().to_str() {
                            ids.push(UnversionedObjectId::new(gk.clone(), name, namespace));
                        }
                    }
                }
                None => {
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    let recognized = entry
                        .path()
                        .extension()
                        .and_then(|e| e.to_str())
                        .and_then(|e| ContentType::from_extension(&format!(".{e}")))
                        .is_some();
                    if !recognized {
                        continue;
                    }
                    if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                        ids.push(UnversionedObjectId::new(gk.clone(), stem, namespace));
                    }
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn content_type(&self, id: &ObjectId) -> Result<ContentType> {
        Ok(match &self.options.extension_resolver {
            Some(f) => f(id),
            None => self.options.content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitops_core::GroupVersionKind;

    fn id(namespace: &str) -> ObjectId {
        ObjectId::new(GroupVersionKind::new("foogroup", "v1alpha1", "Simple"), "myobj", namespace)
    }

    #[test]
    fn path_for_non_namespaced_has_no_namespace_segment() {
        let finder = SimpleFileFinder::new("/root", NamespaceScope::new(), LayoutOptions::default());
        let path = finder.object_path(&id("")).unwrap();
        assert_eq!(path, PathBuf::from("/root/foogroup/Simple/myobj.yaml"));
    }

    #[test]
    fn path_for_namespaced_includes_namespace_segment() {
        let scope = NamespaceScope::new().mark_namespaced(GroupKind::new("foogroup", "Simple"));
        let finder = SimpleFileFinder::new("/root", scope, LayoutOptions::default());
        let path = finder.object_path(&id("ns1")).unwrap();
        assert_eq!(path, PathBuf::from("/root/foogroup/Simple/ns1/myobj.yaml"));
    }

    #[test]
    fn disable_group_directory_drops_group_segment() {
        let options = LayoutOptions {
            disable_group_directory: true,
            ..LayoutOptions::default()
        };
        let finder = SimpleFileFinder::new("/root", NamespaceScope::new(), options);
        let path = finder.object_path(&id("")).unwrap();
        assert_eq!(path, PathBuf::from("/root/Simple/myobj.yaml"));
    }

    #[test]
    fn sub_directory_file_name_nests_under_object_name() {
        let options = LayoutOptions {
            sub_directory_file_name: Some("object".to_string()),
            ..LayoutOptions::default()
        };
        let finder = SimpleFileFinder::new("/root", NamespaceScope::new(), options);
        let path = finder.object_path(&id("")).unwrap();
        assert_eq!(path, PathBuf::from("/root/foogroup/Simple/myobj/object.yaml"));
    }

    #[test]
    fn object_at_is_unsupported() {
        let finder = SimpleFileFinder::new("/root", NamespaceScope::new(), LayoutOptions::default());
        assert!(finder.object_at(Path::new("/root/foogroup/Simple/myobj.yaml")).is_err());
    }

    #[test]
    fn list_object_ids_finds_recognized_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let leaf = dir.path().join("foogroup/Simple");
        std::fs::create_dir_all(&leaf).unwrap();
        std::fs::write(leaf.join("a.yaml"), "").unwrap();
        std::fs::write(leaf.join("b.json"), "").unwrap();
        std::fs::write(leaf.join("c.txt"), "").unwrap();

        let finder = SimpleFileFinder::new(dir.path(), NamespaceScope::new(), LayoutOptions::default());
        let mut ids = finder.list_object_ids(&GroupKind::new("foogroup", "Simple"), "").unwrap();
        ids.sort();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn list_namespaces_lists_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("foogroup/Simple");
        std::fs::create_dir_all(base.join("ns1")).unwrap();
        std::fs::create_dir_all(base.join("ns2")).unwrap();

        let finder = SimpleFileFinder::new(dir.path(), NamespaceScope::new(), LayoutOptions::default());
        let namespaces = finder.list_namespaces(&GroupKind::new("foogroup", "Simple")).unwrap();
        assert_eq!(namespaces, vec!["ns1".to_string(), "ns2".to_string()]);
    }
}
