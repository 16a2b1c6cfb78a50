//! Join notifications for external consumers of the presence layer.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::error;
use uuid::Uuid;

/// Receives a player's uuid whenever that player first appears in the cache.
pub trait PresenceListener: Send + Sync {
    fn on_player_join(&self, uuid: Uuid);
}

impl<F: Fn(Uuid) + Send + Sync> PresenceListener for F {
    fn on_player_join(&self, uuid: Uuid) {
        self(uuid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Unordered set of listeners. Listeners are called outside any lock, so a
/// listener may register or unregister others.
#[derive(Default)]
pub struct PresenceFeed {
    next_id: AtomicU64,
    listeners: DashMap<ListenerId, Arc<dyn PresenceListener>>,
}

impl PresenceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: impl PresenceListener + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.insert(id, Arc::new(listener));
        id
    }

    /// Returns whether `id` was registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub fn unregister_all(&self) {
        self.listeners.clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn notify_join(&self, uuid: Uuid) {
        let listeners: Vec<_> = self.listeners.iter().map(|e| e.value().clone()).collect();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener.on_player_join(uuid))).is_err() {
                error!(%uuid, "Presence listener panicked");
            }
        }
    }
}

impl std::fmt::Debug for PresenceFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceFeed")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
