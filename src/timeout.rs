//! Idle, packet and session deadlines.
//!
//! A packet read starts under the idle deadline. Once its first byte arrives
//! the deadline is re-armed with the packet timeout. Both are further capped
//! by the session deadline, so a session expires even in the middle of a
//! frame.

use std::time::Duration;

use tokio::time::Instant;

/// Timeout configuration shared by every session.
///
/// A `None` or zero duration disables the corresponding timeout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeoutPolicy {
    /// Limit on the whole session lifetime.
    pub session: Option<Duration>,
    /// Limit on waiting for the first byte of a packet.
    pub idle: Option<Duration>,
    /// Limit on finishing a packet once its first byte arrived.
    pub packet: Option<Duration>,
}

impl TimeoutPolicy {
    /// A policy with every timeout disabled.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            session: None,
            idle: None,
            packet: None,
        }
    }

    /// Set the session timeout.
    #[must_use]
    pub fn session(mut self, limit: impl Into<Option<Duration>>) -> Self {
        self.session = enabled(limit.into());
        self
    }

    /// Set the idle timeout.
    #[must_use]
    pub fn idle(mut self, limit: impl Into<Option<Duration>>) -> Self {
        self.idle = enabled(limit.into());
        self
    }

    /// Set the packet timeout.
    #[must_use]
    pub fn packet(mut self, limit: impl Into<Option<Duration>>) -> Self {
        self.packet = enabled(limit.into());
        self
    }

    /// Deadline for a session starting at `now`.
    #[must_use]
    pub fn session_deadline(&self, now: Instant) -> SessionDeadline {
        SessionDeadline {
            limit: self.session,
            at: self.session.map(|d| now + d),
        }
    }

    /// Deadline tracker for a packet read starting at `now`.
    #[must_use]
    pub(crate) fn packet_deadline(&self, now: Instant, session: SessionDeadline) -> PacketDeadline {
        PacketDeadline {
            packet: self.packet,
            at: self.idle.map(|d| now + d),
            idle: true,
            session: session.at,
        }
    }
}

fn enabled(limit: Option<Duration>) -> Option<Duration> { limit.filter(|d| !d.is_zero()) }

/// Absolute deadline of a session.
#[derive(Clone, Copy, Debug, Default)]
pub struct SessionDeadline {
    limit: Option<Duration>,
    at: Option<Instant>,
}

impl SessionDeadline {
    /// A session without a deadline.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            limit: None,
            at: None,
        }
    }

    /// Returns `true` once `now` has reached the deadline.
    #[must_use]
    pub fn expired(&self, now: Instant) -> bool { self.at.is_some_and(|at| now >= at) }

    /// The configured session limit, if any.
    #[must_use]
    pub fn limit(&self) -> Option<Duration> { self.limit }

    pub(crate) fn at(&self) -> Option<Instant> { self.at }
}

/// Deadline state for a single packet read.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PacketDeadline {
    packet: Option<Duration>,
    at: Option<Instant>,
    idle: bool,
    session: Option<Instant>,
}

impl PacketDeadline {
    /// The first byte of the packet arrived; switch to the packet timeout.
    ///
    /// Without a packet timeout the idle deadline stays armed.
    pub(crate) fn first_byte(&mut self, now: Instant) {
        if self.idle {
            self.idle = false;
            if let Some(limit) = self.packet {
                self.at = Some(now + limit);
            }
        }
    }

    /// Earliest of the read deadline and the session deadline.
    pub(crate) fn current(&self) -> Option<Instant> {
        match (self.at, self.session) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Whether the session deadline, rather than the read deadline, fired.
    pub(crate) fn session_expired(&self, now: Instant) -> bool {
        self.session.is_some_and(|at| now >= at)
    }
}
