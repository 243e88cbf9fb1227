//! # rastro-core
//!
//! Value types shared by the hub and the server: the [`Location`] record
//! exchanged on the wire, string identifiers, and the hub error taxonomy.

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod location;

pub use errors::HubError;
pub use ids::{ConnectionId, DriverId};
pub use location::Location;
