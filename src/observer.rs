//! Raw-packet observers.
//!
//! Observers see every framed packet before the handler does. They are keyed
//! by [`ListenerId`] so they can be removed while the server runs. A failing
//! observer ends the session it was called for.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;

use crate::{connection::SessionInfo, error::BoxError, packet::Packet};

/// Identifier returned when an observer is registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ListenerId({})", self.0)
    }
}

/// Callback notified of every packet read by any session.
pub trait PacketObserver: Send + Sync {
    /// Inspect `packet` read from the session described by `info`.
    ///
    /// # Errors
    ///
    /// Returning an error ends the session with
    /// [`SessionError::Observer`](crate::SessionError::Observer).
    fn packet_received(&self, info: &SessionInfo, packet: &Packet) -> Result<(), BoxError>;
}

impl<F> PacketObserver for F
where
    F: Fn(&SessionInfo, &Packet) -> Result<(), BoxError> + Send + Sync,
{
    fn packet_received(&self, info: &SessionInfo, packet: &Packet) -> Result<(), BoxError> {
        self(info, packet)
    }
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    observers: DashMap<ListenerId, Arc<dyn PacketObserver>>,
}

/// Concurrent set of observers shared by the server and its sessions.
///
/// Cloning yields another handle to the same set.
#[derive(Clone, Default)]
pub struct PacketObservers(Arc<Registry>);

impl PacketObservers {
    /// Register `observer`, returning an id for later removal.
    pub fn add<O>(&self, observer: O) -> ListenerId
    where
        O: PacketObserver + 'static,
    {
        let id = ListenerId(self.0.next_id.fetch_add(1, Ordering::Relaxed));
        self.0.observers.insert(id, Arc::new(observer));
        id
    }

    /// Remove the observer registered as `id`. Returns whether it existed.
    pub fn remove(&self, id: ListenerId) -> bool { self.0.observers.remove(&id).is_some() }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize { self.0.observers.len() }

    /// Whether no observer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.observers.is_empty() }

    /// Notify every observer in registration order, stopping at the first
    /// failure.
    ///
    /// Observers are snapshotted first so one may add or remove observers
    /// without deadlocking.
    pub(crate) fn notify(&self, info: &SessionInfo, packet: &Packet) -> Result<(), BoxError> {
        if self.0.observers.is_empty() {
            return Ok(());
        }
        let mut snapshot: Vec<(ListenerId, Arc<dyn PacketObserver>)> = self
            .0
            .observers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        snapshot.sort_unstable_by_key(|(id, _)| *id);
        snapshot
            .iter()
            .try_for_each(|(_, observer)| observer.packet_received(info, packet))
    }
}

impl std::fmt::Debug for PacketObservers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketObservers")
            .field("len", &self.len())
            .finish()
    }
}
