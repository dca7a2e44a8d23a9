//! Typed storage façade (§4.9): `get`/`list`/`create`/`update`/`delete`/
//! `patch`/`deleteAllOf` on top of a `Backend`.

use std::sync::Arc;

use gitops_core::{
    Cancellation, Error, GroupKind, GroupVersionKind, Object, ObjectId, PatchKind, Result, Unstructured,
};
use gitops_registry::Registry;
use gitops_serializer::Patcher;

use crate::backend::Backend;
use crate::namespace::NamespaceScope;

/// A client-side predicate run against every decoded item before it is
/// included in a `list` result (§4.9).
pub type Filter = Arc<dyn Fn(&dyn Object) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct ListOptions {
    pub namespace: Option<String>,
    pub filters: Vec<Filter>,
}

/// Higher-level API composing a `Backend` (§4.9).
pub struct Facade {
    backend: Backend,
    scope: NamespaceScope,
}

impl Facade {
    pub fn new(backend: Backend, scope: NamespaceScope) -> Self {
        Self { backend, scope }
    }

    pub fn scheme(&self) -> &Registry {
        self.backend.registry()
    }

    /// `get(key, obj)`: set name/namespace on `target` from `id`, delegate
    /// to the backend (§4.9).
    pub fn get(&self, id: &ObjectId, target: &mut dyn Object, cancel: &Cancellation) -> Result<()> {
        target.metadata_mut().name = id.name.clone();
        target.metadata_mut().namespace = id.namespace.clone();
        self.backend.get(id, target, cancel)
    }

    pub fn create(&self, obj: Box<dyn Object>, cancel: &Cancellation) -> Result<Box<dyn Object>> {
        self.backend.create(obj, cancel)
    }

    pub fn update(&self, obj: Box<dyn Object>, cancel: &Cancellation) -> Result<Box<dyn Object>> {
        self.backend.update(obj, cancel)
    }

    pub fn delete(&self, obj: &mut dyn Object, cancel: &Cancellation) -> Result<()> {
        self.backend.delete(obj, cancel)
    }

    fn namespaces_to_scan(&self, gk: &GroupKind, namespace: Option<&str>) -> Result<Vec<String>> {
        if self.scope.is_namespaced(gk) {
            match namespace {
                Some(ns) => Ok(vec![ns.to_string()]),
                None => self.backend.list_namespaces(gk),
            }
        } else if namespace.is_some() {
            Err(Error::other(format!("{gk} is not namespaced; cannot list it by namespace")))
        } else {
            Ok(vec![String::new()])
        }
    }

    /// Fan out decode of every matching ID in parallel across a bounded
    /// channel, apply the client-side filter chain, and assemble the
    /// result. Per-ID decode errors accumulate and are surfaced together
    /// rather than aborting the whole list (§4.9).
    pub fn list(&self, element_gvk: &GroupVersionKind, opts: ListOptions, cancel: &Cancellation) -> Result<Vec<Box<dyn Object>>> {
        let gk = element_gvk.group_kind();
        let namespaces = self.namespaces_to_scan(&gk, opts.namespace.as_deref())?;

        let mut ids = Vec::new();
        for ns in &namespaces {
            ids.extend(self.backend.list_object_ids(&gk, ns)?);
        }

        let (tx, rx) = crossbeam_channel::bounded::<Result<Box<dyn Object>>>(ids.len().max(1));
        std::thread::scope(|scope| {
            for id in &ids {
                let tx = tx.clone();
                let versioned = id.with_version(element_gvk.version.clone());
                scope.spawn(move || {
                    let result = self
                        .backend
                        .registry()
                        .new_object(element_gvk)
                        .and_then(|mut target| {
                            self.backend.get(&versioned, target.as_mut(), cancel)?;
                            Ok(target)
                        });
                    let _ = tx.send(result);
                });
            }
        });
        drop(tx);

        let mut items = Vec::new();
        let mut errors = Vec::new();
        for result in rx {
            match result {
                Ok(obj) => {
                    if opts.filters.iter().all(|f| f(obj.as_ref())) {
                        items.push(obj);
                    }
                }
                Err(e) => errors.push(e.to_string()),
            }
        }

        if !errors.is_empty() {
            return Err(Error::other(format!("{} error(s) while listing {gk}: {}", errors.len(), errors.join("; "))));
        }
        Ok(items)
    }

    /// Read current state, compute the patched document via the given
    /// strategy, and perform an internal update through the backend
    /// (§4.9).
    pub fn patch(&self, id: &ObjectId, kind: PatchKind, patch_bytes: &[u8], cancel: &Cancellation) -> Result<Box<dyn Object>> {
        let mut current = self.backend.registry().new_object(&id.gvk)?;
        self.backend.get(id, current.as_mut(), cancel)?;
        let patcher = Patcher::new(self.backend.registry());
        let patched = patcher.patch_typed(current, kind, patch_bytes)?;
        self.backend.update(patched, cancel)
    }

    /// List into an unstructured list, delete each item individually
    /// (§4.9).
    pub fn delete_all_of(&self, gvk: &GroupVersionKind, namespace: Option<&str>, cancel: &Cancellation) -> Result<usize> {
        let gk = gvk.group_kind();
        let namespaces = self.namespaces_to_scan(&gk, namespace)?;

        let mut count = 0;
        for ns in namespaces {
            for id in self.backend.list_object_ids(&gk, &ns)? {
                let mut obj = Unstructured::new(gvk.clone());
                obj.metadata_mut().name = id.name;
                obj.metadata_mut().namespace = id.namespace;
                self.backend.delete(&mut obj, cancel)?;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultStorageVersionResolver;
    use crate::namespace::{GenericNamespaceEnforcer, NamespaceEnforcerConfig};
    use crate::raw::RawStorage;
    use crate::simple::{LayoutOptions, SimpleFileFinder};
    use gitops_core::{ContentType, ObjectMeta, TypeMeta};
    use gitops_fs::LocalFilesystem;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    struct SimpleV1Alpha1 {
        #[serde(flatten)]
        type_meta: TypeMeta,
        #[serde(default)]
        metadata: ObjectMeta,
        #[serde(default)]
        test_string: String,
    }

    impl Object for SimpleV1Alpha1 {
        fn gvk(&self) -> GroupVersionKind {
            self.type_meta.gvk()
        }
        fn set_gvk(&mut self, gvk: GroupVersionKind) {
            self.type_meta = TypeMeta::from_gvk(&gvk);
        }
        fn metadata(&self) -> &ObjectMeta {
            &self.metadata
        }
        fn metadata_mut(&mut self) -> &mut ObjectMeta {
            &mut self.metadata
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    fn gvk() -> GroupVersionKind {
        GroupVersionKind::new("foogroup", "v1alpha1", "Simple")
    }

    fn facade(dir: &std::path::Path) -> Facade {
        let registry = Registry::builder().register::<SimpleV1Alpha1>(gvk()).build();
        let scope = NamespaceScope::new();
        let finder = Arc::new(SimpleFileFinder::new(dir, scope.clone(), LayoutOptions::default()));
        let fs = Arc::new(LocalFilesystem::new());
        let raw = RawStorage::new(finder, fs, scope.clone());
        let enforcer = Arc::new(GenericNamespaceEnforcer::new(scope.clone(), NamespaceEnforcerConfig::default()));
        let version_resolver = Arc::new(DefaultStorageVersionResolver::new(registry.clone()));
        let backend = Backend::new(raw, registry, enforcer, version_resolver, None, ContentType::Yaml);
        Facade::new(backend, scope)
    }

    #[test]
    fn list_returns_every_created_object() {
        let dir = tempfile::tempdir().unwrap();
        let facade = facade(dir.path());
        let cancel = Cancellation::new();

        for name in ["a", "b", "c"] {
            let mut obj = SimpleV1Alpha1::default();
            obj.metadata.name = name.into();
            facade.create(Box::new(obj), &cancel).unwrap();
        }

        let items = facade.list(&gvk(), ListOptions::default(), &cancel).unwrap();
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn list_applies_client_side_filters() {
        let dir = tempfile::tempdir().unwrap();
        let facade = facade(dir.path());
        let cancel = Cancellation::new();

        for name in ["a", "b"] {
            let mut obj = SimpleV1Alpha1::default();
            obj.metadata.name = name.into();
            facade.create(Box::new(obj), &cancel).unwrap();
        }

        let opts = ListOptions {
            namespace: None,
            filters: vec![Arc::new(|obj: &dyn Object| obj.name() == "a")],
        };
        let items = facade.list(&gvk(), opts, &cancel).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name(), "a");
    }

    #[test]
    fn patch_updates_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let facade = facade(dir.path());
        let cancel = Cancellation::new();

        let mut obj = SimpleV1Alpha1::default();
        obj.metadata.name = "foo".into();
        obj.test_string = "old".into();
        facade.create(Box::new(obj), &cancel).unwrap();

        let id = ObjectId::new(gvk(), "foo", "");
        let patched = facade
            .patch(&id, PatchKind::JsonMerge, br#"{"test_string":"new"}"#, &cancel)
            .unwrap();
        assert_eq!(
            patched.as_any().downcast_ref::<SimpleV1Alpha1>().unwrap().test_string,
            "new"
        );

        let mut reread = SimpleV1Alpha1::default();
        facade.get(&id, &mut reread, &cancel).unwrap();
        assert_eq!(reread.test_string, "new");
    }

    #[test]
    fn delete_all_of_removes_every_object() {
        let dir = tempfile::tempdir().unwrap();
        let facade = facade(dir.path());
        let cancel = Cancellation::new();

        for name in ["a", "b"] {
            let mut obj = SimpleV1Alpha1::default();
            obj.metadata.name = name.into();
            facade.create(Box::new(obj), &cancel).unwrap();
        }

        let deleted = facade.delete_all_of(&gvk(), None, &cancel).unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(facade.list(&gvk(), ListOptions::default(), &cancel).unwrap().len(), 0);
    }

    #[test]
    fn listing_a_namespace_on_a_non_namespaced_kind_fails() {
        let dir = tempfile::tempdir().unwrap();
        let facade = facade(dir.path());
        let cancel = Cancellation::new();
        let opts = ListOptions {
            namespace: Some("ns1".to_string()),
            filters: Vec::new(),
        };
        assert!(facade.list(&gvk(), opts, &cancel).is_err());
    }
}
