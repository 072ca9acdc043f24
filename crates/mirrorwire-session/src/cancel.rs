use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mirrorwire_transport::SourceCloser;
use tracing::debug;

/// Cancels a session from outside its reader loop.
///
/// Cancelling marks the session and shuts the socket down, so a read that is
/// blocked waiting for bytes returns immediately. The session then reports
/// [`crate::SessionError::SourceClosed`].
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    closer: Mutex<Option<SourceCloser>>,
}

impl CancelHandle {
    pub(crate) fn new(closer: Option<SourceCloser>) -> Self {
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                closer: Mutex::new(closer),
            }),
        }
    }

    /// Request cancellation. Safe to call any number of times from any thread.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("session cancellation requested");
        if let Some(closer) = self.take_closer() {
            if let Err(err) = closer.close() {
                debug!(%err, "closing source on cancel failed");
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Forget the closer once the session has released its source. Later
    /// cancels only set the flag.
    pub(crate) fn disarm(&self) {
        drop(self.take_closer());
    }

    fn take_closer(&self) -> Option<SourceCloser> {
        match self.inner.closer.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}
