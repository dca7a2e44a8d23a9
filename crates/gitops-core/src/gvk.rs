use std::fmt;

/// Sentinel version string marking a group's internal/hub version.
///
/// Types registered under this version are never written to storage; the
/// storage-version resolver always pins an external version (§4.8).
pub const HUB_VERSION: &str = "__internal";

macro_rules! string_newtype {
    ($name:ident) => {
        #[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                Ok(Self(String::deserialize(deserializer)?))
            }
        }
    };
}

string_newtype!(Group);
string_newtype!(Version);
string_newtype!(Kind);

impl Version {
    /// True iff this version is the group's internal/hub sentinel.
    pub fn is_hub(&self) -> bool {
        self.0 == HUB_VERSION
    }

    pub fn hub() -> Self {
        Self(HUB_VERSION.to_string())
    }
}

/// Identifies a schema family across versions: (group, kind).
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKind {
    pub group: Group,
    pub kind: Kind,
}

impl GroupKind {
    pub fn new(group: impl Into<Group>, kind: impl Into<Kind>) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

/// Identifies a schema: (group, version, kind).
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupVersionKind {
    pub group: Group,
    pub version: Version,
    pub kind: Kind,
}

pub type Gvk = GroupVersionKind;
pub type Gk = GroupKind;

impl GroupVersionKind {
    pub fn new(
        group: impl Into<Group>,
        version: impl Into<Version>,
        kind: impl Into<Kind>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind {
            group: self.group.clone(),
            kind: self.kind.clone(),
        }
    }

    pub fn group_version(&self) -> GroupVersion {
        GroupVersion {
            group: self.group.clone(),
            version: self.version.clone(),
        }
    }

    pub fn is_hub(&self) -> bool {
        self.version.is_hub()
    }

    /// The `apiVersion` string, e.g. `foogroup/v1alpha1`, or just `v1alpha1`
    /// for the core (empty) group.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.to_string()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Parse an `apiVersion` + `kind` pair as found in TypeMeta.
    pub fn from_api_version_kind(api_version: &str, kind: &str) -> Self {
        let (group, version) = match api_version.split_once('/') {
            Some((g, v)) => (g, v),
            None => ("", api_version),
        };
        Self::new(group, version, kind)
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

/// (group, version) pair, used when pinning a storage version.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupVersion {
    pub group: Group,
    pub version: Version,
}

impl GroupVersion {
    pub fn with_kind(&self, kind: impl Into<Kind>) -> GroupVersionKind {
        GroupVersionKind {
            group: self.group.clone(),
            version: self.version.clone(),
            kind: kind.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_version_with_group() {
        let gvk = GroupVersionKind::new("foogroup", "v1alpha1", "Simple");
        assert_eq!(gvk.api_version(), "foogroup/v1alpha1");
    }

    #[test]
    fn api_version_core_group() {
        let gvk = GroupVersionKind::new("", "v1", "Pod");
        assert_eq!(gvk.api_version(), "v1");
    }

    #[test]
    fn from_api_version_kind_round_trips() {
        let gvk = GroupVersionKind::from_api_version_kind("foogroup/v1alpha1", "Simple");
        assert_eq!(gvk.group.as_str(), "foogroup");
        assert_eq!(gvk.version.as_str(), "v1alpha1");
        assert_eq!(gvk.kind.as_str(), "Simple");
        assert_eq!(gvk.api_version(), "foogroup/v1alpha1");
    }

    #[test]
    fn from_api_version_kind_no_group() {
        let gvk = GroupVersionKind::from_api_version_kind("v1", "Pod");
        assert!(gvk.group.is_empty());
        assert_eq!(gvk.version.as_str(), "v1");
    }

    #[test]
    fn hub_version_sentinel() {
        assert!(Version::hub().is_hub());
        assert!(!Version::from("v1alpha1").is_hub());
    }
}
