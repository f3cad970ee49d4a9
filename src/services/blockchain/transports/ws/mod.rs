//! WebSocket transport.
//!
//! One socket per transport. A reader task owns the receiving half of the stream and
//! dispatches every frame: responses to the request awaiting them, subscription
//! notifications to their channel, pongs to the ping awaiting them.

mod config;
mod connection;
mod transport;

pub use config::WsConfig;
pub use transport::WsTransportClient;
