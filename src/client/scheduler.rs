use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

/// Holds at most one live refresh timer. Arming replaces and aborts any
/// previous timer, so storing a new session always reschedules.
pub(crate) struct RefreshScheduler {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub(crate) fn new() -> Self {
        Self {
            handle: Mutex::new(None),
        }
    }

    pub(crate) fn arm<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!("Arming refresh timer for {:?}", delay);
        let new = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        if let Ok(mut guard) = self.handle.lock()
            && let Some(old) = guard.replace(new)
        {
            old.abort();
        }
    }

    pub(crate) fn cancel(&self) {
        if let Ok(mut guard) = self.handle.lock()
            && let Some(old) = guard.take()
        {
            debug!("Cancelling refresh timer");
            old.abort();
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
