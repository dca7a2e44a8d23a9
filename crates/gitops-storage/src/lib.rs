//! Filesystem-backed object storage: FileFinder variants, namespace
//! policy, raw byte storage, a backend composing them into a
//! per-operation contract, and a typed façade on top (§4.5-§4.9).

mod backend;
mod facade;
mod finder;
mod mapped;
mod namespace;
mod raw;
mod simple;

pub use backend::{Backend, DefaultStorageVersionResolver, OperationKind, StorageVersionResolver, Validator};
pub use facade::{Facade, Filter, ListOptions};
pub use finder::FileFinder;
pub use mapped::{ChecksumPath, MappedFileFinder};
pub use namespace::{
    GenericNamespaceEnforcer, NamespaceEnforcer, NamespaceEnforcerConfig, NamespaceReader, NamespaceScope,
};
pub use raw::{RawStat, RawStorage};
pub use simple::{ExtensionResolver, LayoutOptions, SimpleFileFinder};
