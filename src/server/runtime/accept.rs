//! Listener loops feeding connections into the worker pool.
//!
//! One loop runs per bound socket. The TCP loop turns each accepted stream
//! into a [`Connection`]; the UDP loop turns each received datagram into one.
//! Both route the connection through [`WorkerPool::dispatch`] and exit
//! cleanly once the shutdown token is cancelled.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::{
    net::{TcpListener, TcpStream, UdpSocket},
    select,
    time::{Duration, sleep},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::backoff::BackoffConfig;
use crate::{
    connection::Connection,
    server::{
        ServerError,
        pool::{Dispatch, WorkerPool},
        session::SessionContext,
        worker::spawn_worker,
    },
};

/// Abstraction for sources of incoming connections consumed by the accept loop.
///
/// Implementations must be cancellation-safe: dropping a pending `accept()`
/// future must not leak resources.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub(in crate::server) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

/// Shared state handed to each listener loop.
#[derive(Clone)]
pub(in crate::server) struct ListenerHandles {
    pub pool: Arc<WorkerPool>,
    pub ctx: Arc<SessionContext>,
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
    pub backoff: BackoffConfig,
}

impl ListenerHandles {
    /// Give `conn` to an idle worker, or start a new worker for it.
    fn dispatch(&self, conn: Connection) {
        match self.pool.dispatch(conn) {
            Dispatch::Reused(worker) => {
                debug!("connection handed to idle worker: worker={worker}");
            }
            Dispatch::Spawn(slot) => spawn_worker(
                slot,
                Arc::clone(&self.ctx),
                self.shutdown.clone(),
                &self.tracker,
            ),
            Dispatch::Rejected(conn) => {
                debug!(
                    "connection rejected during shutdown: peer={}",
                    conn.peer_addr()
                );
            }
        }
    }

    /// Log a failed accept, wait `delay`, and return the next delay.
    async fn back_off(
        &self,
        err: ServerError,
        local_addr: Option<SocketAddr>,
        delay: Duration,
    ) -> Duration {
        warn!("{err}: local_addr={local_addr:?}, retry_in={delay:?}");
        sleep(delay).await;
        self.backoff.next_delay(delay)
    }
}

/// Accept TCP connections from `listener` until shutdown.
///
/// Failures to accept trigger an exponential back-off governed by the
/// configured [`BackoffConfig`]. The loop terminates when the shutdown token
/// is cancelled, which closes the listening socket once the last reference
/// is dropped.
pub(in crate::server) async fn accept_loop<L>(listener: Arc<L>, mut handles: ListenerHandles)
where
    L: AcceptListener + 'static,
{
    handles.backoff = handles.backoff.normalized();
    debug_assert!(
        handles.backoff.initial_delay <= handles.backoff.max_delay,
        "BackoffConfig invariant violated: initial_delay > max_delay"
    );
    let port = listener.local_addr().map(|a| a.port()).unwrap_or_default();
    let mut delay = handles.backoff.initial_delay;
    while let Some(next_delay) = accept_iteration(&listener, &handles, delay).await {
        delay = next_delay;
    }
    info!("shutdown TCP server on port {port}");
}

async fn accept_iteration<L>(
    listener: &Arc<L>,
    handles: &ListenerHandles,
    delay: Duration,
) -> Option<Duration>
where
    L: AcceptListener + 'static,
{
    select! {
        biased;

        () = handles.shutdown.cancelled() => None,
        res = listener.accept() => Some(match res {
            Ok((stream, peer)) => {
                let local_port = listener.local_addr().map(|a| a.port()).unwrap_or_default();
                let _ = stream.set_nodelay(true);
                handles.dispatch(Connection::from_stream(stream, peer, local_port));
                handles.backoff.initial_delay
            }
            Err(e) => {
                let local_addr = listener.local_addr().ok();
                handles.back_off(ServerError::Accept(e), local_addr, delay).await
            }
        }),
    }
}

/// Receive datagrams from `socket` until shutdown.
///
/// Each datagram, truncated to `max_len` bytes, becomes one connection.
pub(in crate::server) async fn datagram_loop(
    socket: Arc<UdpSocket>,
    max_len: usize,
    handles: ListenerHandles,
) {
    let port = socket.local_addr().map(|a| a.port()).unwrap_or_default();
    let mut buf = vec![0_u8; max_len.max(1)];
    let mut delay = handles.backoff.initial_delay;
    loop {
        select! {
            biased;

            () = handles.shutdown.cancelled() => break,
            res = socket.recv_from(&mut buf) => match res {
                Ok((n, peer)) => {
                    debug!("datagram received: peer={peer}, len={n}");
                    let payload = buf.get(..n).unwrap_or_default().to_vec();
                    handles.dispatch(Connection::datagram(payload, peer, port));
                    delay = handles.backoff.initial_delay;
                }
                Err(e) => {
                    let local_addr = socket.local_addr().ok();
                    delay = handles.back_off(ServerError::Accept(e), local_addr, delay).await;
                }
            },
        }
    }
    info!("shutdown UDP server on port {port}");
}
