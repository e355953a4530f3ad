//! One-shot, re-armable timer used for connection and stall timeouts.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Runs a callback once after a delay. Re-arming replaces the pending tick;
/// stopping (or dropping the timer) cancels it.
pub struct Timer {
    callback: Arc<dyn Fn() + Send + Sync>,
    runtime: Handle,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Timer {
    /// Must be called from within a Tokio runtime. The timer may later be
    /// armed from any thread, e.g. a transport's blocking worker.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
            runtime: Handle::current(),
            pending: Mutex::new(None),
        }
    }

    /// Fire after `delay`, cancelling any tick already scheduled.
    pub fn tick_after(&self, delay: Duration) {
        let callback = Arc::clone(&self.callback);
        let tick = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        if let Some(previous) = self.pending.lock().replace(tick) {
            previous.abort();
        }
    }

    pub fn stop(&self) {
        if let Some(pending) = self.pending.lock().take() {
            pending.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|pending| !pending.is_finished())
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}
