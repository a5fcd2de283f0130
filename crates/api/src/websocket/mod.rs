//! Real-time chat transport
//!
//! Staff of a pharmacy and anonymous shoppers join the same conversation
//! channel over a WebSocket.
//!
//! # Architecture
//!
//! - **Events**: the typed wire protocol exchanged on the socket
//! - **Connection**: per-socket identity plus its bounded outbound queue
//! - **Hub**: in-memory registry performing conversation fan-out
//! - **Inbound**: reads frames and dispatches their side effects
//! - **Outbound**: sole writer of the socket, with liveness probes
//! - **Handler**: Axum upgrade route tying the pieces together

pub mod connection;
pub mod events;
pub mod handler;
pub mod hub;
pub mod inbound;
pub mod outbound;

pub use connection::{Client, PumpSettings};
pub use handler::ws_handler;
pub use hub::{Hub, HubStats};
pub use inbound::ChatContext;
