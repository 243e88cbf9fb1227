//! Metric names recorded by the hub and the server.

/// Location updates accepted (counter).
pub const LOCATION_UPDATES_TOTAL: &str = "location_updates_total";
/// Successful pushes to observers (counter).
pub const BROADCAST_DELIVERIES_TOTAL: &str = "broadcast_deliveries_total";
/// Observers removed after a failed push (counter, labels: reason).
pub const BROADCAST_EVICTIONS_TOTAL: &str = "broadcast_evictions_total";
/// Inbound frames rejected as malformed (counter).
pub const MALFORMED_MESSAGES_TOTAL: &str = "malformed_messages_total";
/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket connections closed (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Currently registered observers (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
