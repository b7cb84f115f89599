//! Registry of reusable session workers.
//!
//! Each worker owns a [`WorkerSlot`]. The listener hands a connection to the
//! first idle slot under the slot's own lock, then wakes the worker; when no
//! slot is idle a new one is created already holding the connection and the
//! caller spawns a worker for it. Slots are never removed before shutdown.

use std::sync::{
    Arc,
    Mutex,
    MutexGuard,
    PoisonError,
    atomic::{AtomicBool, Ordering},
};

use log::debug;
use tokio::{select, sync::Notify};
use tokio_util::sync::CancellationToken;

use crate::connection::Connection;

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
enum SlotState {
    /// Waiting for a connection.
    Idle,
    /// A connection was handed over but the worker has not picked it up.
    Pending(Connection),
    /// Running a session.
    Busy,
    /// The worker exited.
    Terminated,
}

/// Hand-off point between the listener and one session worker.
#[derive(Debug)]
pub(crate) struct WorkerSlot {
    id: usize,
    state: Mutex<SlotState>,
    wake: Notify,
}

impl WorkerSlot {
    fn with_state(id: usize, state: SlotState) -> Self {
        Self {
            id,
            state: Mutex::new(state),
            wake: Notify::new(),
        }
    }

    pub(crate) fn id(&self) -> usize { self.id }

    /// Give `conn` to this worker if it is idle; otherwise hand it back.
    fn try_bind(&self, conn: Connection) -> Result<(), Connection> {
        let mut state = lock(&self.state);
        if !matches!(*state, SlotState::Idle) {
            return Err(conn);
        }
        *state = SlotState::Pending(conn);
        drop(state);
        self.wake.notify_one();
        Ok(())
    }

    fn is_idle(&self) -> bool { matches!(*lock(&self.state), SlotState::Idle) }

    fn take_pending(&self) -> Option<Connection> {
        let mut state = lock(&self.state);
        match std::mem::replace(&mut *state, SlotState::Busy) {
            SlotState::Pending(conn) => Some(conn),
            previous => {
                *state = previous;
                None
            }
        }
    }

    /// Wait for the next connection, or `None` once `shutdown` fires.
    ///
    /// A connection handed over concurrently with shutdown is still
    /// returned so its session can report the abort to the handler.
    pub(crate) async fn next_connection(&self, shutdown: &CancellationToken) -> Option<Connection> {
        loop {
            if let Some(conn) = self.take_pending() {
                return Some(conn);
            }
            select! {
                biased;

                () = shutdown.cancelled() => return self.take_pending(),
                () = self.wake.notified() => {}
            }
        }
    }

    /// Return the slot to the pool after a session. Returns `false` when the
    /// worker should exit instead.
    pub(crate) fn release(&self, shutdown: &CancellationToken) -> bool {
        let mut state = lock(&self.state);
        if shutdown.is_cancelled() {
            *state = SlotState::Terminated;
            false
        } else {
            *state = SlotState::Idle;
            true
        }
    }

    /// Mark the worker as gone. A connection still pending is dropped.
    pub(crate) fn terminate(&self) {
        let previous = std::mem::replace(&mut *lock(&self.state), SlotState::Terminated);
        if let SlotState::Pending(conn) = previous {
            debug!(
                "dropping connection handed to terminated worker: worker={}, peer={}",
                self.id,
                conn.peer_addr()
            );
        }
    }
}

/// Result of routing a connection to the pool.
#[derive(Debug)]
pub(crate) enum Dispatch {
    /// An idle worker took the connection.
    Reused(usize),
    /// A new slot holds the connection; spawn a worker for it.
    Spawn(Arc<WorkerSlot>),
    /// The pool is closed.
    Rejected(Connection),
}

/// Mutex-guarded list of every worker ever created.
#[derive(Debug, Default)]
pub(crate) struct WorkerPool {
    slots: Mutex<Vec<Arc<WorkerSlot>>>,
    closed: AtomicBool,
}

impl WorkerPool {
    /// Route `conn` to an idle worker, or create a slot for a new one.
    pub(crate) fn dispatch(&self, conn: Connection) -> Dispatch {
        if self.closed.load(Ordering::Acquire) {
            return Dispatch::Rejected(conn);
        }
        let mut slots = lock(&self.slots);
        let mut conn = conn;
        for slot in slots.iter() {
            match slot.try_bind(conn) {
                Ok(()) => return Dispatch::Reused(slot.id),
                Err(returned) => conn = returned,
            }
        }
        let slot = Arc::new(WorkerSlot::with_state(
            slots.len(),
            SlotState::Pending(conn),
        ));
        slots.push(Arc::clone(&slot));
        Dispatch::Spawn(slot)
    }

    /// Refuse further connections.
    pub(crate) fn close(&self) { self.closed.store(true, Ordering::Release); }

    /// Number of workers created so far.
    pub(crate) fn worker_count(&self) -> usize { lock(&self.slots).len() }

    /// Number of workers waiting for a connection.
    pub(crate) fn idle_count(&self) -> usize {
        lock(&self.slots).iter().filter(|slot| slot.is_idle()).count()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr};

    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn conn() -> Connection {
        Connection::datagram(&b"x"[..], SocketAddr::from((Ipv4Addr::LOCALHOST, 1234)), 9000)
    }

    fn spawned(dispatch: Dispatch) -> Arc<WorkerSlot> {
        match dispatch {
            Dispatch::Spawn(slot) => slot,
            other => panic!("expected a new slot, got {other:?}"),
        }
    }

    #[rstest]
    #[tokio::test]
    async fn idle_slot_is_reused(conn: Connection) {
        let pool = WorkerPool::default();
        let token = CancellationToken::new();
        let slot = spawned(pool.dispatch(conn));
        assert!(slot.next_connection(&token).await.is_some());
        assert_eq!(pool.idle_count(), 0);
        assert!(slot.release(&token));
        assert_eq!(pool.idle_count(), 1);

        let second = Connection::datagram(&b"y"[..], ([127, 0, 0, 1], 1).into(), 9000);
        assert!(matches!(pool.dispatch(second), Dispatch::Reused(0)));
        assert_eq!(pool.worker_count(), 1);
        assert!(slot.next_connection(&token).await.is_some());
    }

    #[rstest]
    fn busy_slots_force_growth(conn: Connection) {
        let pool = WorkerPool::default();
        let first = spawned(pool.dispatch(conn));
        let second = spawned(pool.dispatch(Connection::datagram(
            &b"z"[..],
            ([127, 0, 0, 1], 2).into(),
            9000,
        )));
        assert_ne!(first.id(), second.id());
        assert_eq!(pool.worker_count(), 2);
        assert_eq!(pool.idle_count(), 0);
    }

    #[rstest]
    fn closed_pool_rejects(conn: Connection) {
        let pool = WorkerPool::default();
        pool.close();
        assert!(matches!(pool.dispatch(conn), Dispatch::Rejected(_)));
        assert_eq!(pool.worker_count(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn shutdown_wakes_idle_worker(conn: Connection) {
        let pool = WorkerPool::default();
        let token = CancellationToken::new();
        let slot = spawned(pool.dispatch(conn));
        let _ = slot.next_connection(&token).await;
        assert!(slot.release(&token));

        let waiter = {
            let slot = Arc::clone(&slot);
            let token = token.clone();
            tokio::spawn(async move { slot.next_connection(&token).await.is_none() })
        };
        token.cancel();
        assert!(waiter.await.expect("join waiter"));
        assert!(!slot.release(&token));
        assert_eq!(pool.idle_count(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn handover_wakes_waiting_worker(conn: Connection) {
        let pool = Arc::new(WorkerPool::default());
        let token = CancellationToken::new();
        let slot = spawned(pool.dispatch(conn));
        let _ = slot.next_connection(&token).await;
        slot.release(&token);

        let waiter = {
            let slot = Arc::clone(&slot);
            let token = token.clone();
            tokio::spawn(async move { slot.next_connection(&token).await.map(|c| c.peer_addr()) })
        };
        tokio::task::yield_now().await;
        let next = Connection::datagram(&b"n"[..], ([127, 0, 0, 1], 77).into(), 9000);
        assert!(matches!(pool.dispatch(next), Dispatch::Reused(_)));
        let peer = waiter.await.expect("join waiter").expect("connection");
        assert_eq!(peer.port(), 77);
    }
}
