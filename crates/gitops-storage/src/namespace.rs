//! Namespace policy: which GroupKinds are namespaced, and a pluggable
//! enforcer run before every write (§4.7).

use std::collections::HashSet;

use gitops_core::{Error, GroupKind, Object, Result};

/// Tracks which GroupKinds are namespaced (spec.md leaves this
/// determination to the caller's schema knowledge rather than the
/// registry, which only maps GVK to construction/conversion/defaulting —
/// resolved here as an explicit, caller-populated set).
#[derive(Clone, Debug, Default)]
pub struct NamespaceScope {
    namespaced: HashSet<GroupKind>,
}

impl NamespaceScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_namespaced(mut self, gk: GroupKind) -> Self {
        self.namespaced.insert(gk);
        self
    }

    pub fn is_namespaced(&self, gk: &GroupKind) -> bool {
        self.namespaced.contains(gk)
    }
}

/// A read-only view over existing namespaces for a GroupKind, consulted
/// by `namespaceGroupKind`-validated enforcement (§4.7 step 4). The
/// backend passes its own reader so policy can query existing state.
pub trait NamespaceReader {
    fn list_namespace_names(&self, gk: &GroupKind) -> Result<Vec<String>>;
}

/// Configuration for the generic namespace enforcer (§4.7).
#[derive(Clone, Debug, Default)]
pub struct NamespaceEnforcerConfig {
    pub default_namespace: String,
    /// If set, a namespaced write's namespace must name an existing
    /// object of this GroupKind (e.g. a `Namespace` resource type).
    pub namespace_group_kind: Option<GroupKind>,
}

pub trait NamespaceEnforcer: Send + Sync {
    /// Apply policy to `obj` in place before a write (§4.7).
    fn enforce(&self, obj: &mut dyn Object, reader: &dyn NamespaceReader) -> Result<()>;
}

/// The generic four-step enforcer described in §4.7.
pub struct GenericNamespaceEnforcer {
    scope: NamespaceScope,
    config: NamespaceEnforcerConfig,
}

impl GenericNamespaceEnforcer {
    pub fn new(scope: NamespaceScope, config: NamespaceEnforcerConfig) -> Self {
        Self { scope, config }
    }
}

impl NamespaceEnforcer for GenericNamespaceEnforcer {
    fn enforce(&self, obj: &mut dyn Object, reader: &dyn NamespaceReader) -> Result<()> {
        let gk = obj.gvk().group_kind();

        if !self.scope.is_namespaced(&gk) {
            obj.metadata_mut().namespace.clear();
            return Ok(());
        }

        if obj.metadata().namespace.is_empty() {
            if self.config.default_namespace.is_empty() {
                return Err(Error::InvalidParameter(
                    "namespace required but no default namespace configured".to_string(),
                ));
            }
            obj.metadata_mut().namespace = self.config.default_namespace.clone();
        }

        if let Some(ns_gk) = &self.config.namespace_group_kind {
            let existing = reader.list_namespace_names(ns_gk)?;
            let namespace = obj.metadata().namespace.clone();
            if !existing.iter().any(|n| n == &namespace) {
                return Err(Error::NoSuchNamespace(namespace));
            }
        }

        Ok(())
    }
}
