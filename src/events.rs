//! Lifecycle event notification.
//!
//! UI bindings hold a reference to the engine and subscribe here instead of
//! reading ambient globals. `subscribe` returns a [`Subscription`] disposer;
//! dropping it (or calling `unsubscribe`) detaches the listener.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Payload per lifecycle transition.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    LoginStart {
        provider: String,
    },
    LoginSuccess {
        provider: String,
        session_id: String,
    },
    LoginError {
        provider: String,
        message: String,
    },
    LogoutStart,
    LogoutSuccess {
        /// Whether the best-effort server-side logout call went through.
        /// Local state is cleared either way.
        server_synced: bool,
    },
    StateChanged {
        authenticated: bool,
    },
    /// Auto-refresh gave up on the current session.
    TokenExpired,
}

type Listener = Arc<dyn Fn(&AuthEvent) + Send + Sync + 'static>;
type ListenerMap = Mutex<HashMap<u64, Listener>>;

#[derive(Default)]
pub(crate) struct EventBus {
    listeners: Arc<ListenerMap>,
    next_id: AtomicU64,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.insert(id, Arc::new(listener));
        }
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub(crate) fn emit(&self, event: AuthEvent) {
        tracing::debug!(?event, "Emitting auth event");
        // Snapshot under the lock, invoke outside it: a listener may
        // subscribe or drop its own Subscription while running.
        let snapshot: Vec<Listener> = match self.listeners.lock() {
            Ok(listeners) => listeners.values().cloned().collect(),
            Err(_) => return,
        };
        for listener in snapshot {
            listener(&event);
        }
    }
}

/// Disposer for a registered listener. The listener stays attached until
/// this is dropped or `unsubscribe` is called.
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerMap>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade()
            && let Ok(mut listeners) = listeners.lock()
        {
            listeners.remove(&self.id);
        }
    }
}
