//! Per-session byte counters and the active-session RAII guard.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Global gauge tracking sessions currently bound to a worker.
static ACTIVE_SESSIONS: AtomicU64 = AtomicU64::new(0);

/// RAII guard incrementing [`ACTIVE_SESSIONS`] on creation and
/// decrementing it on drop.
pub(crate) struct ActiveSession;

impl ActiveSession {
    pub(crate) fn new() -> Self {
        ACTIVE_SESSIONS.fetch_add(1, Ordering::Relaxed);
        crate::metrics::inc_sessions();
        Self
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        ACTIVE_SESSIONS.fetch_sub(1, Ordering::Relaxed);
        crate::metrics::dec_sessions();
    }
}

/// Return the current number of active sessions.
#[must_use]
pub fn active_session_count() -> u64 { ACTIVE_SESSIONS.load(Ordering::Relaxed) }

/// Live counters of one connection, shared with [`SessionInfo`] handles.
///
/// [`SessionInfo`]: super::SessionInfo
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    read: AtomicU64,
    written: AtomicU64,
    available: AtomicUsize,
}

impl SessionCounters {
    pub(crate) fn add_read(&self, n: u64) { self.read.fetch_add(n, Ordering::Relaxed); }

    pub(crate) fn add_written(&self, n: u64) { self.written.fetch_add(n, Ordering::Relaxed); }

    pub(crate) fn set_available(&self, n: usize) { self.available.store(n, Ordering::Relaxed); }

    pub(crate) fn read(&self) -> u64 { self.read.load(Ordering::Relaxed) }

    pub(crate) fn written(&self) -> u64 { self.written.load(Ordering::Relaxed) }

    pub(crate) fn available(&self) -> usize { self.available.load(Ordering::Relaxed) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let counters = SessionCounters::default();
        counters.add_read(3);
        counters.add_read(2);
        counters.add_written(7);
        counters.set_available(4);
        counters.set_available(1);
        assert_eq!(counters.read(), 5);
        assert_eq!(counters.written(), 7);
        assert_eq!(counters.available(), 1);
    }
}
