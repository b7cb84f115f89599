//! Metric helpers for `sessionframe`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! every helper compiles to a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking sessions bound to a worker.
pub const SESSIONS_ACTIVE: &str = "sessionframe_sessions_active";
/// Name of the counter tracking framed packets.
pub const PACKETS_PROCESSED: &str = "sessionframe_packets_processed_total";
/// Name of the counter tracking sessions that ended with an error.
pub const ERRORS_TOTAL: &str = "sessionframe_errors_total";
/// Name of the counter tracking idle and packet read timeouts.
pub const TIMEOUTS_TOTAL: &str = "sessionframe_read_timeouts_total";
/// Name of the counter tracking panics inside session tasks.
pub const SESSION_PANICS: &str = "sessionframe_session_panics_total";

/// Direction of packet processing.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Packets received from a client.
    Inbound,
    /// Responses sent to a client.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the active sessions gauge.
pub fn inc_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).increment(1.0);
}

/// Decrement the active sessions gauge.
pub fn dec_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).decrement(1.0);
}

/// Record a processed packet for the given direction.
pub fn inc_packets(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(PACKETS_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a session that ended with an error.
pub fn inc_errors() {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL).increment(1);
}

/// Record an idle or packet read timeout.
pub fn inc_timeouts() {
    #[cfg(feature = "metrics")]
    counter!(TIMEOUTS_TOTAL).increment(1);
}

/// Record a panic caught in a session task.
pub fn inc_session_panics() {
    #[cfg(feature = "metrics")]
    counter!(SESSION_PANICS).increment(1);
}
