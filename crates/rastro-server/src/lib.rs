//! # rastro-server
//!
//! Axum HTTP + `WebSocket` surface of the location hub.
//!
//! - `GET /ws`: every connection both publishes and observes locations
//! - `GET /drivers/{id}/track`, `GET /tracks`: last known positions
//! - `/drivers`: in-memory driver directory
//! - `GET /health`, `GET /metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::{load_settings_from_path, settings_path, ServerConfig, Settings};
pub use errors::ServerError;
pub use server::{AppState, RastroServer};
