use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ContentType;
use crate::gvk::GroupVersionKind;
use crate::meta::{Object, ObjectMeta, TypeMeta};

/// A metadata-only view of an object (§3: "Partial" variant). Read-only —
/// the object recognizer and list-filter paths use it without needing a
/// registered concrete type, but it must never be written back to storage
/// (`Error::CannotSaveMetadata`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Partial {
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    #[serde(default)]
    pub metadata: ObjectMeta,
}

impl Object for Partial {
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

/// A schema-less object tree with a manually-set GVK (§3: "Unstructured").
/// Bypasses the registry's conversion/defaulting machinery entirely; useful
/// for generic tooling that walks objects of any kind (e.g. `deleteAllOf`,
/// §4.9).
///
/// `metadata` is kept as a typed field rather than inside `fields` so the
/// `Object` trait's by-reference accessors are cheap; `fields` holds every
/// other top-level key of the document.
#[derive(Clone, Debug, Default)]
pub struct Unstructured {
    gvk: GroupVersionKind,
    metadata: ObjectMeta,
    pub fields: serde_json::Map<String, Value>,
}

impl Unstructured {
    pub fn new(gvk: GroupVersionKind) -> Self {
        Self {
            gvk,
            metadata: ObjectMeta::default(),
            fields: serde_json::Map::new(),
        }
    }

    pub fn from_value(gvk: GroupVersionKind, content: Value) -> Self {
        let mut fields = content.as_object().cloned().unwrap_or_default();
        fields.remove("apiVersion");
        fields.remove("kind");
        let metadata = fields
            .remove("metadata")
            .map(|v| serde_json::from_value(v).unwrap_or_default())
            .unwrap_or_default();
        Self {
            gvk,
            metadata,
            fields,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("apiVersion".to_string(), Value::String(self.gvk.api_version()));
        map.insert("kind".to_string(), Value::String(self.gvk.kind.to_string()));
        map.insert(
            "metadata".to_string(),
            serde_json::to_value(&self.metadata).unwrap_or(Value::Null),
        );
        Value::Object(map)
    }
}

impl Object for Unstructured {
    fn gvk(&self) -> GroupVersionKind {
        self.gvk.clone()
    }

    fn set_gvk(&mut self, gvk: GroupVersionKind) {
        self.gvk = gvk;
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

/// Raw bytes kept alongside an unregistered GVK, used when a decoded
/// frame's type is unknown to the registry and the caller opted in via
/// `decode_unknown` (§3: "Unknown" variant, §4.3).
#[derive(Clone, Debug)]
pub struct Unknown {
    pub gvk: GroupVersionKind,
    pub content_type: ContentType,
    pub raw: Vec<u8>,
}
