use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::HubError;

/// A position report: the record producers send and observers receive.
///
/// Values are replaced wholesale on every update, never edited in place.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// Producer-supplied epoch timestamp. Not interpreted by the hub.
    pub timestamp: i64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
        }
    }

    /// Decode an inbound frame. Must be a JSON object with all three
    /// fields; extra fields are ignored.
    pub fn decode(text: &str) -> Result<Self, HubError> {
        Self::from_object(serde_json::from_str(text)?)
    }

    /// Decode a binary frame carrying the same JSON document.
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, HubError> {
        Self::from_object(serde_json::from_slice(bytes)?)
    }

    // serde would also accept the struct as a positional array.
    fn from_object(object: Map<String, Value>) -> Result<Self, HubError> {
        Ok(serde_json::from_value(Value::Object(object))?)
    }

    /// Serialize to the outbound wire shape.
    pub fn encode(&self) -> Result<String, HubError> {
        serde_json::to_string(self).map_err(|e| HubError::Malformed(e.to_string()))
    }
}
