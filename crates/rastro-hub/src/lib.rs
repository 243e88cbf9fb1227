//! # rastro-hub
//!
//! The real-time location hub.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `store` | Last known [`Location`](rastro_core::Location) per driver |
//! | `observer` | Push handle for one connected party |
//! | `registry` | Set of live observers, snapshot for iteration |
//! | `broadcast` | Store-then-fan-out with eviction of failed observers |
//! | `directory` | In-memory driver profiles |
//!
//! ## Data Flow
//!
//! connection → `BroadcastEngine::publish` → `LocationStore::put` →
//! `ObserverRegistry::snapshot` → `Observer::push` per observer → failed
//! observers deregistered and closed.

#![deny(unsafe_code)]

pub mod broadcast;
pub mod directory;
pub mod metrics;
pub mod observer;
pub mod registry;
pub mod store;

pub use broadcast::{BroadcastEngine, FanOut};
pub use directory::{DriverDirectory, DriverProfile, NewDriver};
pub use observer::{ChannelObserver, Observer, ObserverHandle, PushError};
pub use registry::ObserverRegistry;
pub use store::LocationStore;
