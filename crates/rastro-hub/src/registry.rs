//! Set of currently connected observers.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::gauge;
use parking_lot::RwLock;
use rastro_core::ConnectionId;
use tracing::{debug, warn};

use crate::metrics::WS_CONNECTIONS_ACTIVE;
use crate::observer::ObserverHandle;

/// Membership of live observers, keyed by connection id.
///
/// Readers take a [`snapshot`](Self::snapshot) and iterate the copy, so
/// concurrent register/deregister never invalidates an iteration.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: RwLock<HashMap<ConnectionId, ObserverHandle>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer.
    ///
    /// Registering the same connection twice is a caller bug; the newer
    /// handle replaces the older one.
    pub fn register(&self, observer: ObserverHandle) {
        let id = observer.id().clone();
        let count = {
            let mut observers = self.observers.write();
            if observers.insert(id.clone(), observer).is_some() {
                warn!(conn_id = %id, "observer registered twice, replacing previous handle");
            }
            observers.len()
        };
        gauge!(WS_CONNECTIONS_ACTIVE).set(count as f64);
        debug!(conn_id = %id, observers = count, "observer registered");
    }

    /// Remove `observer` if it is the registered handle for its id.
    ///
    /// Returns `false` when nothing was removed: the observer was never
    /// registered, was already removed, or its id now belongs to a newer
    /// connection.
    pub fn deregister(&self, observer: &ObserverHandle) -> bool {
        let id = observer.id();
        let (removed, count) = {
            let mut observers = self.observers.write();
            let same = observers
                .get(id)
                .is_some_and(|current| Arc::ptr_eq(current, observer));
            if same {
                let _ = observers.remove(id);
            }
            (same, observers.len())
        };
        if removed {
            gauge!(WS_CONNECTIONS_ACTIVE).set(count as f64);
            debug!(conn_id = %id, observers = count, "observer deregistered");
        }
        removed
    }

    /// Copy of the current membership.
    pub fn snapshot(&self) -> Vec<ObserverHandle> {
        self.observers.read().values().cloned().collect()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.observers.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::ChannelObserver;

    fn handle(id: &str) -> ObserverHandle {
        let (obs, _rx) = ChannelObserver::new(ConnectionId::from(id), 8);
        obs
    }

    #[test]
    fn register_and_deregister() {
        let registry = ObserverRegistry::new();
        let a = handle("a");
        let b = handle("b");
        registry.register(Arc::clone(&a));
        registry.register(Arc::clone(&b));
        assert_eq!(registry.len(), 2);

        assert!(registry.deregister(&a));
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains(&ConnectionId::from("a")));
        assert!(registry.contains(&ConnectionId::from("b")));
    }

    #[test]
    fn deregister_is_idempotent() {
        let registry = ObserverRegistry::new();
        let a = handle("a");
        registry.register(Arc::clone(&a));
        assert!(registry.deregister(&a));
        assert!(!registry.deregister(&a));
        assert!(registry.is_empty());
    }

    #[test]
    fn deregister_never_registered_is_noop() {
        let registry = ObserverRegistry::new();
        registry.register(handle("a"));
        assert!(!registry.deregister(&handle("stranger")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stale_handle_does_not_evict_reused_id() {
        let registry = ObserverRegistry::new();
        let old = handle("10.0.0.1:5000");
        let new = handle("10.0.0.1:5000");
        registry.register(Arc::clone(&old));
        registry.register(Arc::clone(&new));

        assert!(!registry.deregister(&old));
        assert!(registry.contains(&ConnectionId::from("10.0.0.1:5000")));
        assert!(registry.deregister(&new));
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshot_survives_concurrent_mutation() {
        let registry = ObserverRegistry::new();
        let handles: Vec<_> = (0..5).map(|i| handle(&format!("c{i}"))).collect();
        for h in &handles {
            registry.register(Arc::clone(h));
        }

        let snapshot = registry.snapshot();
        for h in &handles {
            registry.deregister(h);
        }
        assert!(registry.is_empty());
        assert_eq!(snapshot.len(), 5);
    }

    #[test]
    fn concurrent_register_deregister() {
        let registry = Arc::new(ObserverRegistry::new());
        let workers: Vec<_> = (0..8)
            .map(|n| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let h = handle(&format!("w{n}_{i}"));
                        registry.register(Arc::clone(&h));
                        let _ = registry.snapshot();
                        if i % 2 == 0 {
                            assert!(registry.deregister(&h));
                        }
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(registry.len(), 8 * 25);
    }
}
