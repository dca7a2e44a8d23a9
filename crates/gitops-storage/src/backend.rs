//! Backend (§4.8): composes raw storage, the registry, namespace policy,
//! a storage-version resolver, and an optional validator into the
//! per-operation contract every higher-level API builds on.

use std::sync::Arc;

use gitops_core::{
    Cancellation, ContentType, Error, Group, GroupVersion, GroupVersionKind, Object, Partial, Result,
    UnversionedObjectId,
};
use gitops_registry::Registry;
use gitops_serializer::Converter;

use crate::namespace::{NamespaceEnforcer, NamespaceReader};
use crate::raw::RawStorage;

/// Which operation a `Validator` is being consulted for (§4.8 step 5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

/// A pluggable write-time validator, invoked after existence checks but
/// before the write itself (§4.8 step 5).
pub trait Validator: Send + Sync {
    fn validate(&self, obj: &dyn Object, op: OperationKind) -> Result<()>;
}

/// Resolves the version a group is written at. The default implementation
/// always defers to the registry's preferred external (§4.8: "consulted
/// per-write so a newer preferred external automatically governs future
/// writes").
pub trait StorageVersionResolver: Send + Sync {
    fn resolve(&self, group: &Group) -> Option<gitops_core::Version>;
}

pub struct DefaultStorageVersionResolver {
    registry: Registry,
}

impl DefaultStorageVersionResolver {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }
}

impl StorageVersionResolver for DefaultStorageVersionResolver {
    fn resolve(&self, group: &Group) -> Option<gitops_core::Version> {
        self.registry.preferred_external(group)
    }
}

pub struct Backend {
    raw: RawStorage,
    registry: Registry,
    enforcer: Arc<dyn NamespaceEnforcer>,
    version_resolver: Arc<dyn StorageVersionResolver>,
    validator: Option<Arc<dyn Validator>>,
    /// Used to resolve a new object's content type when the FileFinder
    /// cannot yet answer (e.g. a `MappedFileFinder` with no mapping for
    /// an object that does not exist yet).
    default_content_type: ContentType,
}

impl Backend {
    pub fn new(
        raw: RawStorage,
        registry: Registry,
        enforcer: Arc<dyn NamespaceEnforcer>,
        version_resolver: Arc<dyn StorageVersionResolver>,
        validator: Option<Arc<dyn Validator>>,
        default_content_type: ContentType,
    ) -> Self {
        Self {
            raw,
            registry,
            enforcer,
            version_resolver,
            validator,
            default_content_type,
        }
    }

    /// Prefer the registry's own reverse lookup, falling back to the
    /// object's already-set GVK for unregistered types (e.g.
    /// `Unstructured`, used by `deleteAllOf`).
    fn resolve_gvk(&self, obj: &dyn Object) -> Result<GroupVersionKind> {
        match self.registry.object_kinds(obj) {
            Ok(candidates) => Ok(candidates.into_iter().next().expect("object_kinds never returns empty on success")),
            Err(_) if !obj.gvk().kind.is_empty() => Ok(obj.gvk()),
            Err(e) => Err(e),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn list_namespaces(&self, gk: &gitops_core::GroupKind) -> Result<Vec<String>> {
        self.raw.list_namespaces(gk)
    }

    pub fn list_object_ids(&self, gk: &gitops_core::GroupKind, namespace: &str) -> Result<Vec<UnversionedObjectId>> {
        self.raw.list_object_ids(gk, namespace)
    }

    fn resolve_content_type(&self, id: &UnversionedObjectId) -> ContentType {
        self.raw.content_type(id).unwrap_or(self.default_content_type)
    }

    /// Read `id` into `target` (§4.8 step 7: "read bytes, resolve content
    /// type, `decodeInto`").
    pub fn get(&self, id: &gitops_core::ObjectId, target: &mut dyn Object, cancel: &Cancellation) -> Result<()> {
        cancel.check()?;
        let unversioned = id.without_version();
        if !self.raw.exists(&unversioned, cancel)? {
            return Err(Error::NotFound(unversioned));
        }
        let content_type = self.raw.content_type(&unversioned)?;
        let bytes = self.raw.read(&unversioned, cancel)?;
        let value = decode_value(content_type, &bytes)?;
        let gvk = type_meta_gvk(&value)?;
        self.registry.decode_into(&gvk, value, target)?;
        Ok(())
    }

    pub fn create(&self, obj: Box<dyn Object>, cancel: &Cancellation) -> Result<Box<dyn Object>> {
        self.write_object(obj, OperationKind::Create, cancel)
    }

    pub fn update(&self, obj: Box<dyn Object>, cancel: &Cancellation) -> Result<Box<dyn Object>> {
        self.write_object(obj, OperationKind::Update, cancel)
    }

    pub fn delete(&self, obj: &mut dyn Object, cancel: &Cancellation) -> Result<()> {
        cancel.check()?;
        let gvk = self.resolve_gvk(obj)?;
        obj.set_gvk(gvk.clone());
        if obj.name().is_empty() {
            return Err(Error::NameRequired);
        }
        self.enforcer.enforce(obj, self)?;
        let id = UnversionedObjectId::new(gvk.group_kind(), obj.name().to_string(), obj.namespace().to_string());

        if !self.raw.exists(&id, cancel)? {
            return Err(Error::NotFound(id));
        }
        if let Some(validator) = &self.validator {
            validator.validate(obj, OperationKind::Delete)?;
        }
        self.raw.delete(&id, cancel)
    }

    fn write_object(&self, mut obj: Box<dyn Object>, op: OperationKind, cancel: &Cancellation) -> Result<Box<dyn Object>> {
        cancel.check()?;
        if obj.as_any().downcast_ref::<Partial>().is_some() {
            return Err(Error::CannotSaveMetadata);
        }

        let gvk = self.resolve_gvk(obj.as_ref())?;
        obj.set_gvk(gvk.clone());
        if obj.name().is_empty() {
            return Err(Error::NameRequired);
        }
        self.enforcer.enforce(obj.as_mut(), self)?;
        let id = UnversionedObjectId::new(gvk.group_kind(), obj.name().to_string(), obj.namespace().to_string());

        let exists = self.raw.exists(&id, cancel)?;
        match op {
            OperationKind::Create if exists => return Err(Error::AlreadyExists(id)),
            OperationKind::Update if !exists => return Err(Error::NotFound(id)),
            _ => {}
        }

        if let Some(validator) = &self.validator {
            validator.validate(obj.as_ref(), op)?;
        }

        let content_type = self.resolve_content_type(&id);
        let version = self.version_resolver.resolve(&id.gk.group).ok_or_else(|| Error::Conversion {
            gvk: gvk.clone(),
            cause: gitops_core::ConversionCause::SchemeSetup,
            source: None,
        })?;
        let gv = GroupVersion {
            group: id.gk.group.clone(),
            version,
        };

        if obj.metadata().creation_timestamp.is_none() {
            obj.metadata_mut().creation_timestamp = Some(chrono::Utc::now());
        }

        let converter = Converter::new(&self.registry);
        let converted = converter.convert_for_group_version(obj, gv)?;

        let value = self.registry.encode(converted.as_ref())?;
        let bytes = encode_bytes(content_type, &value)?;
        self.raw.write(&id, &bytes, cancel)?;

        Ok(converted)
    }
}

impl NamespaceReader for Backend {
    fn list_namespace_names(&self, gk: &gitops_core::GroupKind) -> Result<Vec<String>> {
        Ok(self
            .raw
            .list_object_ids(gk, "")?
            .into_iter()
            .map(|id| id.name)
            .collect())
    }
}

fn type_meta_gvk(value: &serde_json::Value) -> Result<GroupVersionKind> {
    let api_version = value.get("apiVersion").and_then(|v| v.as_str()).unwrap_or("");
    let kind = value.get("kind").and_then(|v| v.as_str()).unwrap_or("");
    Ok(GroupVersionKind::from_api_version_kind(api_version, kind))
}

fn decode_value(content_type: ContentType, bytes: &[u8]) -> Result<serde_json::Value> {
    match content_type {
        ContentType::Yaml => {
            let text = std::str::from_utf8(bytes).map_err(|e| Error::other(e.to_string()))?;
            let value: serde_yaml::Value = serde_yaml::from_str(text)?;
            Ok(serde_json::to_value(value)?)
        }
        ContentType::Json => Ok(serde_json::from_slice(bytes)?),
    }
}

fn encode_bytes(content_type: ContentType, value: &serde_json::Value) -> Result<Vec<u8>> {
    match content_type {
        ContentType::Yaml => Ok(serde_yaml::to_string(value)?.into_bytes()),
        ContentType::Json => Ok(serde_json::to_vec(value)?),
    }
}
