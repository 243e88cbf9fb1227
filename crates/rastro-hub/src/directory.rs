//! In-memory driver profiles.
//!
//! Independent of the location store: profiles are created explicitly and
//! their coordinates are only changed through [`DriverDirectory::update_location`].

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rastro_core::{DriverId, HubError};
use serde::{Deserialize, Serialize};

/// A known driver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriverProfile {
    pub id: DriverId,
    pub name: String,
    pub vehicle: String,
    pub license: String,
    pub latitude: f64,
    pub longitude: f64,
    pub last_seen: DateTime<Utc>,
}

/// Request body for creating a driver.
#[derive(Clone, Debug, Deserialize)]
pub struct NewDriver {
    pub id: DriverId,
    pub name: String,
    #[serde(default)]
    pub vehicle: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

#[derive(Debug, Default)]
pub struct DriverDirectory {
    drivers: DashMap<DriverId, DriverProfile>,
}

impl DriverDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// All profiles ordered by id.
    pub fn list(&self) -> Vec<DriverProfile> {
        let mut all: Vec<DriverProfile> = self.drivers.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn get(&self, id: &DriverId) -> Result<DriverProfile, HubError> {
        self.drivers
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| HubError::NotFound(id.to_string()))
    }

    /// Add a driver. Fails with `Conflict` if the id is taken; an existing
    /// profile is never overwritten (use `update_location` to move it).
    pub fn create(&self, new: NewDriver) -> Result<DriverProfile, HubError> {
        if new.id.as_str().trim().is_empty() {
            return Err(HubError::Malformed("driver id must not be empty".into()));
        }
        match self.drivers.entry(new.id.clone()) {
            Entry::Occupied(_) => Err(HubError::Conflict(format!("driver {} already exists", new.id))),
            Entry::Vacant(slot) => {
                let profile = DriverProfile {
                    id: new.id,
                    name: new.name,
                    vehicle: new.vehicle,
                    license: new.license,
                    latitude: new.latitude,
                    longitude: new.longitude,
                    last_seen: Utc::now(),
                };
                let _ = slot.insert(profile.clone());
                Ok(profile)
            }
        }
    }

    /// Move an existing driver and refresh `last_seen`.
    pub fn update_location(
        &self,
        id: &DriverId,
        latitude: f64,
        longitude: f64,
    ) -> Result<DriverProfile, HubError> {
        let mut entry = self
            .drivers
            .get_mut(id)
            .ok_or_else(|| HubError::NotFound(id.to_string()))?;
        let profile = entry.value_mut();
        profile.latitude = latitude;
        profile.longitude = longitude;
        profile.last_seen = Utc::now();
        Ok(profile.clone())
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}
