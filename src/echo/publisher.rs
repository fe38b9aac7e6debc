// src/echo/publisher.rs — Subscriber registry and state persistence
//
// Listeners are called synchronously, in subscription order, with the full
// state after every mutation. The registry lock is never held while a
// listener runs, so a listener may subscribe, unsubscribe or query the
// engine without deadlocking.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use super::types::{EchoState, Interaction};
use crate::infra::errors::EchoError;
use crate::storage::Storage;

pub type Listener = Arc<dyn Fn(&EchoState) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener)>>,
}

/// Broadcasts state snapshots to subscribers.
#[derive(Default)]
pub struct StatePublisher {
    registry: Arc<Registry>,
}

/// Handle returned by `subscribe`. Dropping it keeps the listener
/// registered; call `unsubscribe` to remove it.
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            if let Ok(mut listeners) = registry.listeners.lock() {
                listeners.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

impl StatePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Listener) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.registry.listeners.lock() {
            listeners.push((id, listener));
        }
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry
            .listeners
            .lock()
            .map(|l| l.len())
            .unwrap_or(0)
    }

    /// Call every current listener with `state`.
    pub fn notify(&self, state: &EchoState) {
        let listeners: Vec<Listener> = match self.registry.listeners.lock() {
            Ok(l) => l.iter().map(|(_, f)| f.clone()).collect(),
            Err(_) => return,
        };
        for listener in listeners {
            listener(state);
        }
    }
}

/// On-disk layout of the persisted engine state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub state: EchoState,
    #[serde(default)]
    pub interactions: Vec<Interaction>,
    #[serde(default)]
    pub saved_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl PersistedState {
    /// Snapshot `state` plus the most recent `limit` interactions.
    pub fn capture(state: &EchoState, log: &[Interaction], limit: usize) -> Self {
        let start = log.len().saturating_sub(limit);
        Self {
            state: state.clone(),
            interactions: log[start..].to_vec(),
            saved_at: Some(chrono::Utc::now()),
        }
    }

    pub fn to_blob(&self) -> Result<String, EchoError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_blob(blob: &str) -> Result<Self, EchoError> {
        Ok(serde_json::from_str(blob)?)
    }
}

/// Load and decode persisted state. Missing, unreadable or corrupt blobs
/// all come back as `None`.
pub fn load_state(storage: &dyn Storage, key: &str) -> Option<PersistedState> {
    let blob = match storage.load(key) {
        Ok(Some(b)) => b,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!("Failed to load '{}': {}", key, e);
            return None;
        }
    };

    match PersistedState::from_blob(&blob) {
        Ok(p) => Some(p),
        Err(e) => {
            tracing::warn!("Ignoring corrupt state blob '{}': {}", key, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::echo::event_log::EventLog;
    use crate::echo::types::NewInteraction;
    use crate::storage::MemoryStorage;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_notify_reaches_all_subscribers() {
        let publisher = StatePublisher::new();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let hits = hits.clone();
            let _ = publisher.subscribe(Arc::new(move |_s: &EchoState| {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }
        publisher.notify(&EchoState::default());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let publisher = StatePublisher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = publisher.subscribe(Arc::new(move |_s: &EchoState| {
            h.fetch_add(1, Ordering::SeqCst);
        }));

        publisher.notify(&EchoState::default());
        sub.unsubscribe();
        publisher.notify(&EchoState::default());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn test_listener_may_subscribe_during_notify() {
        let publisher = Arc::new(StatePublisher::new());
        let p = publisher.clone();
        let _ = publisher.subscribe(Arc::new(move |_s: &EchoState| {
            let _ = p.subscribe(Arc::new(|_s: &EchoState| {}));
        }));
        publisher.notify(&EchoState::default());
        assert_eq!(publisher.subscriber_count(), 2);
    }

    #[test]
    fn test_capture_keeps_most_recent() {
        let mut log = EventLog::new();
        for i in 0..25 {
            log.append(NewInteraction::new(format!("m{i}"), "x"));
        }
        let p = PersistedState::capture(&EchoState::default(), log.entries(), 10);
        assert_eq!(p.interactions.len(), 10);
        assert_eq!(p.interactions[0].module, "m15");
    }

    #[test]
    fn test_load_corrupt_blob_is_none() {
        let storage = MemoryStorage::new();
        storage.save("k", "{not json").unwrap();
        assert!(load_state(&storage, "k").is_none());
        assert!(load_state(&storage, "missing").is_none());
    }

    #[test]
    fn test_blob_roundtrip() {
        let mut state = EchoState::default();
        state.total_interactions = 42;
        let blob = PersistedState::capture(&state, &[], 1000).to_blob().unwrap();

        let storage = MemoryStorage::new();
        storage.save("k", &blob).unwrap();
        let loaded = load_state(&storage, "k").unwrap();
        assert_eq!(loaded.state.total_interactions, 42);
    }
}
