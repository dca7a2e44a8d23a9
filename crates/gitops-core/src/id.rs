use std::fmt;

use crate::gvk::{GroupKind, GroupVersionKind};

/// Identifies an object without pinning a version: (GK, name, namespace).
///
/// Namespace is the empty string iff the group-kind is non-namespaced
/// (§3 invariant). Name must be non-empty for any ID presented to the
/// backend, but `UnversionedObjectID` itself does not enforce that so that
/// partially-built IDs can flow through recognizer/namespace-enforcement
/// code before the backend's own check runs.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnversionedObjectId {
    pub gk: GroupKind,
    pub name: String,
    pub namespace: String,
}

impl UnversionedObjectId {
    pub fn new(gk: GroupKind, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            gk,
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn with_version(&self, version: impl Into<crate::gvk::Version>) -> ObjectId {
        ObjectId {
            gvk: GroupVersionKind {
                group: self.gk.group.clone(),
                version: version.into(),
                kind: self.gk.kind.clone(),
            },
            name: self.name.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

impl fmt::Display for UnversionedObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.gk, self.name)
        } else {
            write!(f, "{}/{}/{}", self.gk, self.namespace, self.name)
        }
    }
}

/// `UnversionedObjectId` plus a pinned version.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId {
    pub gvk: GroupVersionKind,
    pub name: String,
    pub namespace: String,
}

impl ObjectId {
    pub fn new(gvk: GroupVersionKind, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            gvk,
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn without_version(&self) -> UnversionedObjectId {
        UnversionedObjectId {
            gk: self.gvk.group_kind(),
            name: self.name.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}, Kind={}", self.gvk.api_version(), self.name, self.gvk.kind)
        } else {
            write!(
                f,
                "{}/{}/{}, Kind={}",
                self.gvk.api_version(),
                self.namespace,
                self.name,
                self.gvk.kind
            )
        }
    }
}
