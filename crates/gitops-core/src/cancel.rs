use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// A cheap, clonable cancellation handle (§4.8 step 1, §5).
///
/// The backend's synchronous, thread-based design (§5: "parallel,
/// multi-threaded; no global event loop") has no async runtime to anchor a
/// `tokio_util::sync::CancellationToken` to, so this is a plain
/// `Arc<AtomicBool>` instead.
#[derive(Clone, Debug, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail fast with `Error::Cancelled` if cancellation has been requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
