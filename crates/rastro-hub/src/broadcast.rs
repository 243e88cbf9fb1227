//! Store-then-fan-out of location updates.

use std::sync::Arc;

use metrics::counter;
use rastro_core::{ConnectionId, DriverId, Location};
use tracing::{debug, warn};

use crate::metrics::{BROADCAST_DELIVERIES_TOTAL, BROADCAST_EVICTIONS_TOTAL, LOCATION_UPDATES_TOTAL};
use crate::observer::ObserverHandle;
use crate::registry::ObserverRegistry;
use crate::store::LocationStore;

/// Outcome of one [`BroadcastEngine::publish`]. Never sent to the producer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Observers in the snapshot.
    pub recipients: usize,
    /// Observers that accepted the payload.
    pub delivered: usize,
    /// Observers removed because their push failed.
    pub pruned: Vec<ConnectionId>,
}

/// Writes each update to the store, then pushes it to every observer.
///
/// The store and the registry are locked one after the other, never
/// together: a reader may see the new location slightly before or after
/// observers receive it.
pub struct BroadcastEngine {
    store: Arc<LocationStore>,
    registry: Arc<ObserverRegistry>,
}

impl BroadcastEngine {
    pub fn new(store: Arc<LocationStore>, registry: Arc<ObserverRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &Arc<LocationStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ObserverRegistry> {
        &self.registry
    }

    /// Record `location` for `driver` and fan it out.
    ///
    /// Each observer is pushed independently. Observers whose push fails are
    /// deregistered and closed once the iteration is done. Never fails.
    pub fn publish(&self, driver: DriverId, location: Location) -> FanOut {
        self.store.put(driver.clone(), location);
        counter!(LOCATION_UPDATES_TOTAL).increment(1);

        let payload: Arc<str> = match location.encode() {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(driver_id = %driver, error = %e, "failed to encode location, skipping fan-out");
                return FanOut::default();
            }
        };

        let observers = self.registry.snapshot();
        let mut delivered = 0usize;
        let mut failed: Vec<ObserverHandle> = Vec::new();
        for observer in &observers {
            match observer.push(Arc::clone(&payload)) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    counter!(BROADCAST_EVICTIONS_TOTAL, "reason" => e.reason()).increment(1);
                    warn!(conn_id = %observer.id(), driver_id = %driver, error = %e, "evicting observer");
                    failed.push(Arc::clone(observer));
                }
            }
        }
        counter!(BROADCAST_DELIVERIES_TOTAL).increment(delivered as u64);

        let pruned: Vec<ConnectionId> = failed
            .into_iter()
            .map(|observer| {
                let _ = self.registry.deregister(&observer);
                observer.close();
                observer.id().clone()
            })
            .collect();

        debug!(
            driver_id = %driver,
            recipients = observers.len(),
            delivered,
            pruned = pruned.len(),
            "location published"
        );

        FanOut {
            recipients: observers.len(),
            delivered,
            pruned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{ChannelObserver, Observer, PushError};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc;

    /// Observer whose pushes always fail.
    struct BrokenObserver {
        id: ConnectionId,
        closed: AtomicBool,
    }

    impl BrokenObserver {
        fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: ConnectionId::from(id),
                closed: AtomicBool::new(false),
            })
        }
    }

    impl Observer for BrokenObserver {
        fn id(&self) -> &ConnectionId {
            &self.id
        }
        fn push(&self, _payload: Arc<str>) -> Result<(), PushError> {
            Err(PushError::Closed)
        }
        fn close(&self) {
            self.closed.store(true, Ordering::Relaxed);
        }
    }

    fn engine() -> BroadcastEngine {
        BroadcastEngine::new(
            Arc::new(LocationStore::new()),
            Arc::new(ObserverRegistry::new()),
        )
    }

    fn attach(engine: &BroadcastEngine, id: &str) -> (Arc<ChannelObserver>, mpsc::Receiver<Arc<str>>) {
        let (obs, rx) = ChannelObserver::new(ConnectionId::from(id), 16);
        engine.registry().register(obs.clone());
        (obs, rx)
    }

    fn received(rx: &mut mpsc::Receiver<Arc<str>>) -> Location {
        let payload = rx.try_recv().expect("observer received nothing");
        serde_json::from_str(&payload).unwrap()
    }

    #[test]
    fn publish_updates_store_and_notifies_observer() {
        let engine = engine();
        let (_a, mut rx_a) = attach(&engine, "a");

        let fan_out = engine.publish("d1".into(), Location::new(1.0, 2.0, 100));

        assert_eq!(fan_out.delivered, 1);
        assert!(fan_out.pruned.is_empty());
        assert_eq!(received(&mut rx_a), Location::new(1.0, 2.0, 100));
        assert_eq!(engine.store().get(&"d1".into()).unwrap(), Location::new(1.0, 2.0, 100));
    }

    #[test]
    fn publish_with_no_observers_still_stores() {
        let engine = engine();
        let fan_out = engine.publish("d1".into(), Location::new(1.0, 1.0, 1));
        assert_eq!(fan_out, FanOut::default());
        assert!(engine.store().get(&"d1".into()).is_ok());
    }

    #[test]
    fn failed_observers_are_pruned_and_others_still_receive() {
        let engine = engine();
        let mut healthy = Vec::new();
        for id in ["h1", "h2", "h3"] {
            healthy.push(attach(&engine, id));
        }
        let broken = [BrokenObserver::new("b1"), BrokenObserver::new("b2")];
        for b in &broken {
            engine.registry().register(b.clone());
        }
        assert_eq!(engine.registry().len(), 5);

        let fan_out = engine.publish("d1".into(), Location::new(1.0, 2.0, 100));

        assert_eq!(fan_out.recipients, 5);
        assert_eq!(fan_out.delivered, 3);
        let mut pruned: Vec<String> = fan_out.pruned.iter().map(ToString::to_string).collect();
        pruned.sort();
        assert_eq!(pruned, ["b1", "b2"]);
        for b in &broken {
            assert!(b.closed.load(Ordering::Relaxed));
            assert!(!engine.registry().contains(&b.id));
        }
        for (_, rx) in &mut healthy {
            assert_eq!(received(rx), Location::new(1.0, 2.0, 100));
        }

        // Pruned observers take no part in later broadcasts.
        let fan_out = engine.publish("d1".into(), Location::new(3.0, 4.0, 200));
        assert_eq!(fan_out.recipients, 3);
        assert_eq!(fan_out.delivered, 3);
        assert!(fan_out.pruned.is_empty());
    }

    #[test]
    fn slow_observer_is_evicted_on_full_queue() {
        let engine = engine();
        let (slow, _slow_rx) = ChannelObserver::new(ConnectionId::from("slow"), 1);
        engine.registry().register(slow.clone());
        let (_fast, mut fast_rx) = attach(&engine, "fast");

        engine.publish("d1".into(), Location::new(1.0, 1.0, 1));
        let fan_out = engine.publish("d1".into(), Location::new(2.0, 2.0, 2));

        assert_eq!(fan_out.pruned, vec![ConnectionId::from("slow")]);
        assert!(slow.is_closed());
        assert_eq!(received(&mut fast_rx), Location::new(1.0, 1.0, 1));
        assert_eq!(received(&mut fast_rx), Location::new(2.0, 2.0, 2));
    }

    #[test]
    fn disconnected_observer_misses_later_updates() {
        let engine = engine();
        let (a, mut rx_a) = attach(&engine, "a");
        let (_b, mut rx_b) = attach(&engine, "b");

        let a_handle: ObserverHandle = a;
        assert!(engine.registry().deregister(&a_handle));

        let fan_out = engine.publish("d1".into(), Location::new(5.0, 6.0, 7));
        assert_eq!(fan_out.delivered, 1);
        assert_eq!(received(&mut rx_b), Location::new(5.0, 6.0, 7));
        assert!(rx_a.try_recv().is_err());
        assert!(!engine.registry().contains(&ConnectionId::from("a")));
    }

    #[tokio::test]
    async fn concurrent_publishes_leave_one_whole_value() {
        let engine = Arc::new(engine());
        let first = Location::new(1.0, 1.0, 100);
        let second = Location::new(2.0, 2.0, 200);

        let tasks: Vec<_> = [first, second]
            .into_iter()
            .map(|loc| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.publish("d1".into(), loc) })
            })
            .collect();
        for t in tasks {
            t.await.unwrap();
        }

        let seen = engine.store().get(&"d1".into()).unwrap();
        assert!(seen == first || seen == second, "torn record: {seen:?}");
    }
}
