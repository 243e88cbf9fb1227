//! WebSocket connections: lifecycle state machine and socket loops.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `handler` | `Connecting → Active → Closed` state machine, frame handling |
//! | `socket` | Read loop, writer task, heartbeat |

pub mod handler;
pub mod socket;

pub use handler::{CloseReason, ConnectionHandler, ConnectionState, FrameOutcome, Inbound};
pub use socket::serve_socket;
