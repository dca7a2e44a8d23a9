//! Recursive filesystem watch with batching, move reconciliation, and
//! suspension (§4.10).

mod emitter;
mod excluder;

pub use emitter::{Emitter, FileEvent, FileEventKind, WatcherOptions};
pub use excluder::{GitExcluder, PathExcluder};
