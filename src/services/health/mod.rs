//! Connection health supervision.
//!
//! - `liveness`: the merged liveness policy of probes and sweep
//! - `heartbeat`: per-network probe loops and the global staleness sweep
//! - `reconnect`: the reconnection state machine and its hooks

mod heartbeat;
mod liveness;
mod reconnect;

pub use heartbeat::{HeartbeatMonitor, ProbeOutcome};
pub use liveness::{LivenessPolicy, FAILURES_TO_DEAD};
pub use reconnect::{ReconnectHook, Reconnector};
