use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gvk::GroupVersionKind;

/// TypeMeta identifies the schema of an object via its `apiVersion`/`kind`
/// pair, the on-wire spelling of a GVK.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeMeta {
    #[serde(rename = "apiVersion", default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
}

impl TypeMeta {
    pub fn from_gvk(gvk: &GroupVersionKind) -> Self {
        Self {
            api_version: gvk.api_version(),
            kind: gvk.kind.to_string(),
        }
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::from_api_version_kind(&self.api_version, &self.kind)
    }

    pub fn is_empty(&self) -> bool {
        self.api_version.is_empty() && self.kind.is_empty()
    }
}

/// Object metadata common to every typed/unstructured object: name,
/// namespace, annotations, and creation timestamp (§3).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Implemented by every concrete, registry-known Rust type that represents
/// a GitOps object ("Typed" variant). Implementations are ordinary structs
/// deriving `Serialize`/`Deserialize`; this trait is the thin seam the
/// registry, serializer, and storage layers need to read and rewrite
/// identity and metadata without knowing the concrete type.
pub trait Object: std::fmt::Debug + Send + Sync {
    fn gvk(&self) -> GroupVersionKind;
    fn set_gvk(&mut self, gvk: GroupVersionKind);
    fn metadata(&self) -> &ObjectMeta;
    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    fn name(&self) -> &str {
        &self.metadata().name
    }

    fn namespace(&self) -> &str {
        &self.metadata().namespace
    }

    /// Downcasting seam for the registry's conversion/defaulting dispatch,
    /// which is keyed by concrete Rust type rather than by GVK alone.
    /// Implementations are always `{ self }`/`{ self }` one-liners.
    fn as_any(&self) -> &dyn std::any::Any;
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

/// Marker for types that additionally behave as a list wrapper around a
/// homogeneous or heterogeneous element sequence (§4.3 "meta-list").
pub trait ObjectList: Object {
    fn item_count(&self) -> usize;
}
