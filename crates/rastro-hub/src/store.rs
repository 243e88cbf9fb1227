//! Last known location per driver.

use dashmap::DashMap;
use rastro_core::{DriverId, HubError, Location};

/// Concurrent map from driver to most recent [`Location`].
///
/// Writes are last-write-wins by arrival: the embedded timestamp is not
/// compared, so a late stale update replaces a newer one. Entries are never
/// evicted.
#[derive(Debug, Default)]
pub struct LocationStore {
    tracks: DashMap<DriverId, Location>,
}

impl LocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `location` as the driver's current position.
    pub fn put(&self, id: DriverId, location: Location) {
        let _ = self.tracks.insert(id, location);
    }

    /// Current position of `id`, or [`HubError::NotFound`] if it never reported.
    pub fn get(&self, id: &DriverId) -> Result<Location, HubError> {
        self.tracks
            .get(id)
            .map(|entry| *entry.value())
            .ok_or_else(|| HubError::NotFound(id.to_string()))
    }

    /// Number of tracked drivers.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Copy of every track, ordered by driver id.
    pub fn snapshot(&self) -> Vec<(DriverId, Location)> {
        let mut tracks: Vec<(DriverId, Location)> = self
            .tracks
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        tracks.sort_by(|a, b| a.0.cmp(&b.0));
        tracks
    }
}
