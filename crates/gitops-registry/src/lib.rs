//! The process-wide type registry (§4.1).
//!
//! A `Registry` is built once via `RegistryBuilder::register*` calls and is
//! then read-only: `Registry` is a cheap `Clone` around an `Arc<Inner>`, and
//! every read-side method takes `&self`, matching §5's "effectively
//! immutable after construction, safe to read concurrently."

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use gitops_core::{Error, Group, GroupVersionKind, Object, Result, Version};

type NewFn = Box<dyn Fn() -> Box<dyn Object> + Send + Sync>;
type ConvertFn = Box<dyn Fn(&dyn Any, &mut dyn Any) -> Result<()> + Send + Sync>;
type DefaultFn = Box<dyn Fn(&mut dyn Any) + Send + Sync>;
type DecodeFn = Box<dyn Fn(serde_json::Value, bool) -> Result<Box<dyn Object>> + Send + Sync>;
type DecodeIntoFn = Box<dyn Fn(serde_json::Value, bool, &mut dyn Any) -> Result<()> + Send + Sync>;
type EncodeFn = Box<dyn Fn(&dyn Any) -> Result<serde_json::Value> + Send + Sync>;

/// The top-level JSON keys `T`'s `Deserialize` impl actually recognizes,
/// derived rather than hand-maintained: every registered type in this
/// workspace shapes its fields as `#[serde(flatten)] type_meta: TypeMeta`
/// plus a handful of directly-named fields, none of which use
/// `skip_serializing_if`, so serializing a default value and reading back
/// its object keys recovers exactly the set `strict` decode should allow.
/// `apiVersion`/`kind` are added explicitly since `TypeMeta` skips them
/// when empty.
fn known_top_level_keys<T: Default + Serialize>() -> HashSet<String> {
    let mut keys: HashSet<String> = serde_json::to_value(T::default())
        .ok()
        .and_then(|v| v.as_object().map(|obj| obj.keys().cloned().collect()))
        .unwrap_or_default();
    keys.insert("apiVersion".to_string());
    keys.insert("kind".to_string());
    keys
}

/// Strict decode's unknown-field check (§4.3): every top-level key in
/// `value` must be one `known` recognizes.
fn reject_unknown_fields(value: &serde_json::Value, known: &HashSet<String>) -> Result<()> {
    let Some(obj) = value.as_object() else {
        return Ok(());
    };
    for key in obj.keys() {
        if !known.contains(key) {
            return Err(Error::StrictDecode(format!("unknown field `{key}`")));
        }
    }
    Ok(())
}

struct Inner {
    constructors: HashMap<GroupVersionKind, NewFn>,
    /// Reverse index from a concrete Rust type to every GVK it was
    /// registered under, used by `object_kinds`.
    type_gvks: HashMap<TypeId, Vec<GroupVersionKind>>,
    conversions: HashMap<(GroupVersionKind, GroupVersionKind), ConvertFn>,
    /// Last-wins per concrete type (§3 Open Question resolution: keyed by
    /// `TypeId`, a second registration for the same type silently replaces
    /// the first).
    defaulters: HashMap<TypeId, DefaultFn>,
    hub_versions: HashMap<Group, Version>,
    /// Per-group version priority, preferred-external first. The hub
    /// version, if any, is never included here (§3).
    version_priority: HashMap<Group, Vec<Version>>,
    decoders: HashMap<GroupVersionKind, DecodeFn>,
    decode_intos: HashMap<GroupVersionKind, DecodeIntoFn>,
    encoders: HashMap<GroupVersionKind, EncodeFn>,
}

/// A process-wide, read-only type registry (§4.1).
#[derive(Clone)]
pub struct Registry(Arc<Inner>);

/// Builds a `Registry`. Construction happens once per schema universe;
/// the builder is consumed by `build()`.
#[derive(Default)]
pub struct RegistryBuilder {
    constructors: HashMap<GroupVersionKind, NewFn>,
    type_gvks: HashMap<TypeId, Vec<GroupVersionKind>>,
    conversions: HashMap<(GroupVersionKind, GroupVersionKind), ConvertFn>,
    defaulters: HashMap<TypeId, DefaultFn>,
    hub_versions: HashMap<Group, Version>,
    version_priority: HashMap<Group, Vec<Version>>,
    decoders: HashMap<GroupVersionKind, DecodeFn>,
    decode_intos: HashMap<GroupVersionKind, DecodeIntoFn>,
    encoders: HashMap<GroupVersionKind, EncodeFn>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a concrete type under a GVK. `T::default()` must produce a
    /// valid zero value usable by `Registry::new`; `T`'s `Serialize`/
    /// `Deserialize` impls back `Registry::decode`/`Registry::encode`.
    pub fn register<T>(mut self, gvk: GroupVersionKind) -> Self
    where
        T: Object + Default + Clone + Serialize + DeserializeOwned + 'static,
    {
        self.type_gvks
            .entry(TypeId::of::<T>())
            .or_default()
            .push(gvk.clone());
        self.constructors
            .insert(gvk.clone(), Box::new(|| Box::new(T::default())));
        let known_fields = known_top_level_keys::<T>();
        self.decoders.insert(
            gvk.clone(),
            Box::new(move |value, strict| {
                if strict {
                    reject_unknown_fields(&value, &known_fields)?;
                }
                let obj: T = serde_json::from_value(value)?;
                Ok(Box::new(obj) as Box<dyn Object>)
            }),
        );
        let known_fields = known_top_level_keys::<T>();
        self.decode_intos.insert(
            gvk.clone(),
            Box::new(move |value, strict, any| {
                if strict {
                    reject_unknown_fields(&value, &known_fields)?;
                }
                let obj: T = serde_json::from_value(value)?;
                let target = any
                    .downcast_mut::<T>()
                    .ok_or_else(|| Error::other("decodeInto: target concrete type mismatch"))?;
                *target = obj;
                Ok(())
            }),
        );
        self.encoders.insert(
            gvk.clone(),
            Box::new(|any| {
                let obj = any
                    .downcast_ref::<T>()
                    .ok_or_else(|| Error::other("encode: concrete type mismatch"))?;
                Ok(serde_json::to_value(obj)?)
            }),
        );
        if !gvk.is_hub() {
            let versions = self.version_priority.entry(gvk.group.clone()).or_default();
            if !versions.contains(&gvk.version) {
                versions.push(gvk.version.clone());
            }
        }
        self
    }

    /// Mark `(group, version)` as the group's internal/hub version.
    pub fn register_hub(mut self, group: impl Into<Group>, version: impl Into<Version>) -> Self {
        self.hub_versions.insert(group.into(), version.into());
        self
    }

    /// Explicitly set a group's version priority order, preferred-external
    /// first. Overrides the registration-order default.
    pub fn set_version_priority(mut self, group: impl Into<Group>, versions: Vec<Version>) -> Self {
        self.version_priority.insert(group.into(), versions);
        self
    }

    /// Register a conversion function between two concrete, already
    /// `register`ed types.
    pub fn register_conversion<A, B, F>(mut self, from: GroupVersionKind, to: GroupVersionKind, f: F) -> Self
    where
        A: Object + 'static,
        B: Object + 'static,
        F: Fn(&A, &mut B) -> Result<()> + Send + Sync + 'static,
    {
        let wrapped: ConvertFn = Box::new(move |from_any, to_any| {
            let from = from_any
                .downcast_ref::<A>()
                .ok_or_else(|| Error::other("conversion source type mismatch"))?;
            let to = to_any
                .downcast_mut::<B>()
                .ok_or_else(|| Error::other("conversion target type mismatch"))?;
            f(from, to)
        });
        self.conversions.insert((from, to), wrapped);
        self
    }

    /// Register a defaulting function for a concrete type. Registering a
    /// second function for the same `T` replaces the first (last-wins,
    /// §3 Open Question resolution) rather than erroring, since multiple
    /// registrations for one type are almost always a caller mistake that
    /// should still produce a working registry.
    pub fn register_default<T, F>(mut self, f: F) -> Self
    where
        T: Object + 'static,
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        let wrapped: DefaultFn = Box::new(move |any| {
            if let Some(t) = any.downcast_mut::<T>() {
                f(t);
            }
        });
        if self.defaulters.insert(TypeId::of::<T>(), wrapped).is_some() {
            tracing::debug!(
                type_name = std::any::type_name::<T>(),
                "replacing previously registered defaulting function (last-wins)"
            );
        }
        self
    }

    pub fn build(self) -> Registry {
        Registry(Arc::new(Inner {
            constructors: self.constructors,
            type_gvks: self.type_gvks,
            conversions: self.conversions,
            defaulters: self.defaulters,
            hub_versions: self.hub_versions,
            version_priority: self.version_priority,
            decoders: self.decoders,
            decode_intos: self.decode_intos,
            encoders: self.encoders,
        }))
    }
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Allocate a zero-valued instance for `gvk` (§4.1).
    pub fn new_object(&self, gvk: &GroupVersionKind) -> Result<Box<dyn Object>> {
        let ctor = self
            .0
            .constructors
            .get(gvk)
            .ok_or_else(|| Error::UnrecognizedType {
                gvk: gvk.clone(),
                cause: gitops_core::UnrecognizedCause::Kind,
                raw_bytes: Vec::new(),
            })?;
        Ok(ctor())
    }

    /// Deserialize `value` into the concrete type registered under `gvk`.
    /// Tolerant of unknown top-level fields; use [`Registry::decode_strict`]
    /// to reject them (§4.3).
    pub fn decode(&self, gvk: &GroupVersionKind, value: serde_json::Value) -> Result<Box<dyn Object>> {
        self.decode_with(gvk, value, false)
    }

    /// As [`Registry::decode`], but fails with `Error::StrictDecode` if
    /// `value` carries a top-level field the registered type does not
    /// recognize (§4.3).
    pub fn decode_strict(&self, gvk: &GroupVersionKind, value: serde_json::Value) -> Result<Box<dyn Object>> {
        self.decode_with(gvk, value, true)
    }

    fn decode_with(&self, gvk: &GroupVersionKind, value: serde_json::Value, strict: bool) -> Result<Box<dyn Object>> {
        let f = self.0.decoders.get(gvk).ok_or_else(|| Error::UnrecognizedType {
            gvk: gvk.clone(),
            cause: self.classify_unrecognized(gvk),
            raw_bytes: Vec::new(),
        })?;
        let mut obj = f(value, strict)?;
        obj.set_gvk(gvk.clone());
        Ok(obj)
    }

    /// Deserialize `value` directly into `target`'s concrete type in
    /// place, failing if `target`'s concrete type differs from the one
    /// registered under `gvk`. Tolerant of unknown top-level fields; use
    /// [`Registry::decode_into_strict`] to reject them (§4.3).
    pub fn decode_into(&self, gvk: &GroupVersionKind, value: serde_json::Value, target: &mut dyn Object) -> Result<()> {
        self.decode_into_with(gvk, value, false, target)
    }

    /// As [`Registry::decode_into`], but fails with `Error::StrictDecode`
    /// if `value` carries a top-level field the registered type does not
    /// recognize (§4.3).
    pub fn decode_into_strict(&self, gvk: &GroupVersionKind, value: serde_json::Value, target: &mut dyn Object) -> Result<()> {
        self.decode_into_with(gvk, value, true, target)
    }

    fn decode_into_with(&self, gvk: &GroupVersionKind, value: serde_json::Value, strict: bool, target: &mut dyn Object) -> Result<()> {
        let f = self
            .0
            .decode_intos
            .get(gvk)
            .ok_or_else(|| Error::UnrecognizedType {
                gvk: gvk.clone(),
                cause: self.classify_unrecognized(gvk),
                raw_bytes: Vec::new(),
            })?;
        f(value, strict, target.as_any_mut())?;
        target.set_gvk(gvk.clone());
        Ok(())
    }

    /// Serialize `obj` via its concrete type's registered encoder.
    pub fn encode(&self, obj: &dyn Object) -> Result<serde_json::Value> {
        let gvk = obj.gvk();
        let f = self
            .0
            .encoders
            .get(&gvk)
            .ok_or_else(|| Error::other(format!("no encoder registered for {gvk}")))?;
        f(obj.as_any())
    }

    /// Reverse-lookup the GVK(s) a concrete object is registered under.
    /// If more than one GVK is registered for the object's Rust type, the
    /// object's own (non-empty) GVK disambiguates; otherwise this fails
    /// (§4.1 Ambiguity rule).
    pub fn object_kinds(&self, obj: &dyn Object) -> Result<Vec<GroupVersionKind>> {
        let type_id = obj.as_any().type_id();
        let candidates = self
            .0
            .type_gvks
            .get(&type_id)
            .cloned()
            .unwrap_or_default();

        if candidates.is_empty() {
            return Err(Error::other("object's type is not registered"));
        }
        if candidates.len() == 1 {
            return Ok(candidates);
        }

        let set_gvk = obj.gvk();
        if set_gvk.kind.is_empty() {
            return Err(Error::other(
                "object kind is ambiguous and no GVK was set to disambiguate",
            ));
        }
        if candidates.contains(&set_gvk) {
            Ok(vec![set_gvk])
        } else {
            Err(Error::other("object's set GVK does not match any registered candidate"))
        }
    }

    /// Run the registered conversion function from `from`'s GVK to `to`'s
    /// GVK (§4.1, §4.3 Converter).
    pub fn convert(&self, from: &dyn Object, to: &mut dyn Object) -> Result<()> {
        let key = (from.gvk(), to.gvk());
        let f = self.0.conversions.get(&key).ok_or_else(|| Error::Conversion {
            gvk: from.gvk(),
            cause: gitops_core::ConversionCause::To,
            source: None,
        })?;
        f(from.as_any(), to.as_any_mut())
    }

    /// Apply the registered defaulting function for `obj`'s concrete type,
    /// if any (§4.1, §4.3 Defaulter). A missing defaulter is not an error —
    /// not every type needs one.
    pub fn default(&self, obj: &mut dyn Object) {
        let type_id = (*obj.as_any()).type_id();
        if let Some(f) = self.0.defaulters.get(&type_id) {
            f(obj.as_any_mut());
        }
    }

    /// True iff `f` has a defaulting function registered (used by the
    /// serializer to decide whether `default=true` has any effect).
    pub fn has_defaulter(&self, obj: &dyn Object) -> bool {
        self.0.defaulters.contains_key(&(*obj.as_any()).type_id())
    }

    /// The group's hub/internal version, if one is registered.
    pub fn hub_version(&self, group: &Group) -> Option<Version> {
        self.0.hub_versions.get(group).cloned()
    }

    pub fn is_hub_version(&self, group: &Group, version: &Version) -> bool {
        self.hub_version(group).as_ref() == Some(version) || version.is_hub()
    }

    /// Preferred external version first (§4.1, §3).
    pub fn prioritized_versions(&self, group: &Group) -> Vec<Version> {
        self.0.version_priority.get(group).cloned().unwrap_or_default()
    }

    /// The group's preferred external version, if any are registered.
    pub fn preferred_external(&self, group: &Group) -> Option<Version> {
        self.prioritized_versions(group).into_iter().next()
    }

    pub fn is_registered(&self, gvk: &GroupVersionKind) -> bool {
        self.0.constructors.contains_key(gvk)
    }

    /// All registered GVKs sharing `gk`'s group and kind, in no particular
    /// order. Used by the serializer to classify an unrecognized frame as
    /// `UnknownGroup`/`UnknownVersion`/`UnknownKind` (§4.3).
    pub fn classify_unrecognized(&self, candidate: &GroupVersionKind) -> gitops_core::UnrecognizedCause {
        let any_group_match = self
            .0
            .constructors
            .keys()
            .any(|gvk| gvk.group == candidate.group);
        if !any_group_match {
            return gitops_core::UnrecognizedCause::Group;
        }
        let any_kind_match = self.0.constructors.keys().any(|gvk| {
            gvk.group == candidate.group && gvk.kind == candidate.kind
        });
        if !any_kind_match {
            return gitops_core::UnrecognizedCause::Kind;
        }
        gitops_core::UnrecognizedCause::Version
    }
}
