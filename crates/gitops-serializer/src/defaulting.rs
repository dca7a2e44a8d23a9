use gitops_core::{Error, GroupVersionKind, Object, Result};
use gitops_registry::Registry;

/// Applies registered defaulting functions, round-tripping through the
/// preferred external version when the target is hub/internal (§4.3).
pub struct Defaulter<'a> {
    registry: &'a Registry,
}

impl<'a> Defaulter<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// `default(obj)`: for hub/internal input, convert to preferred
    /// external, default there, convert back; otherwise default in place.
    pub fn default(&self, obj: &mut dyn Object) -> Result<()> {
        default_in_place(self.registry, obj)
    }

    /// `newDefaultedObject(gvk)`: construct then default.
    pub fn new_defaulted_object(&self, gvk: &GroupVersionKind) -> Result<Box<dyn Object>> {
        let mut obj = self.registry.new_object(gvk)?;
        obj.set_gvk(gvk.clone());
        self.default(obj.as_mut())?;
        Ok(obj)
    }
}

pub(crate) fn default_in_place(registry: &Registry, obj: &mut dyn Object) -> Result<()> {
    if !obj.gvk().is_hub() {
        registry.default(obj);
        return Ok(());
    }
    let group = obj.gvk().group.clone();
    let preferred = registry
        .preferred_external(&group)
        .ok_or_else(|| Error::other(format!("no external version registered for group {group}")))?;
    let ext_gvk = GroupVersionKind::new(group, preferred, obj.gvk().kind.clone());

    let mut external = registry.new_object(&ext_gvk)?;
    external.set_gvk(ext_gvk.clone());
    registry.convert(obj, external.as_mut())?;
    registry.default(external.as_mut());
    registry.convert(external.as_ref(), obj)?;
    Ok(())
}

/// Converts objects to/from a group's hub (internal) version (§4.3).
pub struct Converter<'a> {
    registry: &'a Registry,
}

impl<'a> Converter<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// For hub-style objects, convert `obj` onto its group's registered
    /// hub sibling; classic (non-hub-aware) types convert straight to
    /// their own internal version the same way.
    pub fn convert_to_hub(&self, obj: Box<dyn Object>) -> Result<Box<dyn Object>> {
        convert_to_hub(self.registry, obj)
    }

    pub fn convert_to_preferred_external(&self, obj: Box<dyn Object>) -> Result<Box<dyn Object>> {
        convert_to_preferred_external(self.registry, obj)
    }

    pub fn convert_for_group_version(
        &self,
        obj: Box<dyn Object>,
        gv: gitops_core::GroupVersion,
    ) -> Result<Box<dyn Object>> {
        let target_gvk = gv.with_kind(obj.gvk().kind.clone());
        if obj.gvk() == target_gvk {
            return Ok(obj);
        }
        let mut target = self.registry.new_object(&target_gvk)?;
        target.set_gvk(target_gvk.clone());
        self.registry.convert(obj.as_ref(), target.as_mut())?;
        Ok(target)
    }
}

pub(crate) fn convert_to_hub(registry: &Registry, obj: Box<dyn Object>) -> Result<Box<dyn Object>> {
    if obj.gvk().is_hub() {
        return Ok(obj);
    }
    let hub_version = match registry.hub_version(&obj.gvk().group) {
        Some(v) => v,
        None => return Ok(obj),
    };
    let hub_gvk = GroupVersionKind::new(obj.gvk().group.clone(), hub_version, obj.gvk().kind.clone());
    let mut hub = registry.new_object(&hub_gvk)?;
    hub.set_gvk(hub_gvk.clone());
    registry.convert(obj.as_ref(), hub.as_mut())?;
    Ok(hub)
}

pub(crate) fn convert_to_preferred_external(registry: &Registry, obj: Box<dyn Object>) -> Result<Box<dyn Object>> {
    if !obj.gvk().is_hub() {
        return Ok(obj);
    }
    let group = obj.gvk().group.clone();
    let preferred = registry
        .preferred_external(&group)
        .ok_or_else(|| Error::other(format!("no external version registered for group {group}")))?;
    let ext_gvk = GroupVersionKind::new(group, preferred, obj.gvk().kind.clone());
    let mut external = registry.new_object(&ext_gvk)?;
    external.set_gvk(ext_gvk.clone());
    registry.convert(obj.as_ref(), external.as_mut())?;
    Ok(external)
}
