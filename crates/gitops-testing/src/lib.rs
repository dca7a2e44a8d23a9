//! Shared `foogroup` fixture types used across this workspace's test
//! suites, plus small temp-directory helpers for storage/watch tests.

use gitops_core::{GroupVersionKind, Object, ObjectMeta, TypeMeta};
use gitops_registry::{Registry, RegistryBuilder};
use serde::{Deserialize, Serialize};

pub const GROUP: &str = "foogroup";

pub fn simple_gvk() -> GroupVersionKind {
    GroupVersionKind::new(GROUP, "v1alpha1", "Simple")
}

pub fn complex_v1alpha1_gvk() -> GroupVersionKind {
    GroupVersionKind::new(GROUP, "v1alpha1", "Complex")
}

pub fn crd_v1alpha1_gvk() -> GroupVersionKind {
    GroupVersionKind::new(GROUP, "v1alpha1", "CRD")
}

pub fn crd_hub_gvk() -> GroupVersionKind {
    GroupVersionKind::new(GROUP, gitops_core::HUB_VERSION, "CRD")
}

/// `Simple`: the minimal fixture used by identity/storage/watch tests.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Simple {
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub test_string: String,
}

impl Object for Simple {
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

/// `Complex`: exercises defaulting (scenario 2 of the testable-properties
/// scenario list — "Defaulted complex external").
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Complex {
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(rename = "Int64", default)]
    pub int64: i64,
    #[serde(default)]
    pub bool: bool,
    #[serde(default)]
    pub int: i32,
    #[serde(default)]
    pub string: String,
}

impl Object for Complex {
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

/// Preferred external version of `Complex`'s defaulter: unconditionally
/// sets `int64` to its preferred default. Used by `register_defaults`.
pub fn default_complex(obj: &mut Complex) {
    obj.int64 = 5;
}

/// `CRD`, registered in both an external version (`v1alpha1`) and the
/// group's hub/internal version, exercising hub conversion (scenario 3)
/// and comment-preserving round-trips (scenario 4).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CrdV1Alpha1 {
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub test_string: String,
}

impl Object for CrdV1Alpha1 {
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

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CrdHub {
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub other_string: String,
}

impl Object for CrdHub {
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

fn crd_v1alpha1_to_hub(from: &CrdV1Alpha1, to: &mut CrdHub) -> gitops_core::Result<()> {
    to.other_string = format!("Old string {}", from.test_string);
    Ok(())
}

fn crd_hub_to_v1alpha1(from: &CrdHub, to: &mut CrdV1Alpha1) -> gitops_core::Result<()> {
    to.test_string = from.other_string.strip_prefix("Old string ").unwrap_or(&from.other_string).to_string();
    Ok(())
}

/// Build a registry carrying every fixture type, with the `CRD` kind's
/// `v1alpha2` marked as the group's hub version. Shared by `gitops-watch`
/// and `gitops-events` integration tests; `gitops-serializer` and
/// `gitops-storage` keep their own narrower registries since they predate
/// this crate and only need a subset of these types.
pub fn registry() -> Registry {
    builder().build()
}

pub fn builder() -> RegistryBuilder {
    Registry::builder()
        .register::<Simple>(simple_gvk())
        .register::<Complex>(complex_v1alpha1_gvk())
        .register_default::<Complex, _>(default_complex)
        .register::<CrdV1Alpha1>(crd_v1alpha1_gvk())
        .register::<CrdHub>(crd_hub_gvk())
        .register_hub(GROUP, gitops_core::HUB_VERSION)
        .register_conversion::<CrdV1Alpha1, CrdHub, _>(crd_v1alpha1_gvk(), crd_hub_gvk(), crd_v1alpha1_to_hub)
        .register_conversion::<CrdHub, CrdV1Alpha1, _>(crd_hub_gvk(), crd_v1alpha1_gvk(), crd_hub_to_v1alpha1)
}

/// A temp directory plus the bookkeeping storage/watch tests repeatedly
/// need: a root path that outlives the `TempDir` guard's scope as long as
/// this struct is held.
pub struct TempRoot {
    dir: tempfile::TempDir,
}

impl TempRoot {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp directory"),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }
}

impl Default for TempRoot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_round_trips_simple() {
        let registry = registry();
        let value = serde_json::json!({
            "apiVersion": "foogroup/v1alpha1",
            "kind": "Simple",
            "metadata": {"name": "foo"},
            "test_string": "bar",
        });
        let obj = registry.decode(&simple_gvk(), value).unwrap();
        assert_eq!(obj.name(), "foo");
    }

    #[test]
    fn complex_defaulting_sets_preferred_int64() {
        let registry = registry();
        let mut obj = Complex::default();
        registry.default(&mut obj);
        assert_eq!(obj.int64, 5);
    }

    #[test]
    fn crd_converts_to_and_from_hub() {
        let registry = registry();
        let mut external = CrdV1Alpha1::default();
        external.set_gvk(crd_v1alpha1_gvk());
        external.test_string = "foobar".into();

        let mut hub = CrdHub::default();
        hub.set_gvk(crd_hub_gvk());
        registry.convert(&external, &mut hub).unwrap();
        assert_eq!(hub.other_string, "Old string foobar");

        let mut back = CrdV1Alpha1::default();
        back.set_gvk(crd_v1alpha1_gvk());
        registry.convert(&hub, &mut back).unwrap();
        assert_eq!(back.test_string, "foobar");
    }
}
