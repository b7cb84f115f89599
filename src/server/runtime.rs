//! Runtime control for [`SessionServer`].

mod accept;
mod backoff;

use std::{future::Future, net::SocketAddr, sync::Arc};

#[cfg(test)]
pub(super) use accept::MockAcceptListener;
use accept::{ListenerHandles, accept_loop, datagram_loop};
pub use backoff::BackoffConfig;
use log::{info, warn};
use tokio::{select, signal};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Bound, ServerError, SessionServer, pool::WorkerPool, session::SessionContext};
use crate::observer::{ListenerId, PacketObserver, PacketObservers};

impl SessionServer<Bound> {
    /// Start the listener loops and return a handle to the running server.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if a bound socket cannot report its local
    /// address.
    pub fn start(self) -> Result<RunningServer, ServerError> {
        let SessionServer {
            framing,
            handler,
            observers,
            remote_port,
            backoff_config,
            ready_tx,
            #[cfg(feature = "tls")]
            tls,
            state: Bound { tcp, udp },
        } = self;
        let tcp_addr = tcp
            .as_ref()
            .map(|l| l.local_addr())
            .transpose()
            .map_err(ServerError::Bind)?;
        let udp_addr = udp
            .as_ref()
            .map(|s| s.local_addr())
            .transpose()
            .map_err(ServerError::Bind)?;

        let max_len = framing.max_packet_length();
        let handles = ListenerHandles {
            pool: Arc::new(WorkerPool::default()),
            ctx: Arc::new(SessionContext {
                framing,
                handler,
                observers: observers.clone(),
                remote_port,
                #[cfg(feature = "tls")]
                tls,
            }),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            backoff: backoff_config,
        };

        if let Some(listener) = tcp {
            info!("starting TCP server: addr={tcp_addr:?}");
            handles
                .tracker
                .spawn(accept_loop(listener, handles.clone()));
        }
        if let Some(socket) = udp {
            info!("starting UDP server: addr={udp_addr:?}");
            handles
                .tracker
                .spawn(datagram_loop(socket, max_len, handles.clone()));
        }

        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("Failed to send readiness signal: receiver dropped");
        }

        Ok(RunningServer {
            pool: handles.pool,
            observers,
            shutdown: handles.shutdown,
            tracker: handles.tracker,
            tcp_addr,
            udp_addr,
        })
    }

    /// Run the server until Ctrl+C is received.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sessionframe::server::SessionServer;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), sessionframe::server::ServerError> {
    /// let server = SessionServer::new().bind(([127, 0, 0, 1], 8080).into())?;
    /// server.run().await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// Attempting to run a server without binding fails to compile:
    ///
    /// ```compile_fail
    /// use sessionframe::server::SessionServer;
    ///
    /// async fn try_run() {
    ///     SessionServer::new()
    ///         .run()
    ///         .await
    ///         .expect("unbound servers do not expose run()");
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// See [`start`](Self::start). Accept failures are retried with
    /// exponential back-off and do not surface as errors.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Run the server until the `shutdown` future resolves, then shut down
    /// every session.
    ///
    /// # Examples
    ///
    /// ```
    /// use sessionframe::server::SessionServer;
    /// use tokio::sync::oneshot;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), sessionframe::server::ServerError> {
    /// let server = SessionServer::new().bind(([127, 0, 0, 1], 0).into())?;
    ///
    /// let (tx, rx) = oneshot::channel::<()>();
    /// let handle = tokio::spawn(async move {
    ///     server
    ///         .run_with_shutdown(async {
    ///             let _ = rx.await;
    ///         })
    ///         .await
    /// });
    ///
    /// let _ = tx.send(());
    /// handle
    ///     .await
    ///     .expect("join server task")
    ///     .expect("server run failed");
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// See [`start`](Self::start).
    pub async fn run_with_shutdown<S>(self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let running = self.start()?;
        select! {
            () = shutdown => {},
            () = running.tracker.wait() => {},
        }
        running.shutdown().await;
        Ok(())
    }
}

/// Handle to a started server.
///
/// Dropping the handle does not stop the server; call
/// [`shutdown`](Self::shutdown).
#[derive(Debug)]
pub struct RunningServer {
    pool: Arc<WorkerPool>,
    observers: PacketObservers,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    tcp_addr: Option<SocketAddr>,
    udp_addr: Option<SocketAddr>,
}

impl RunningServer {
    /// Stop the listener loops, close every session and wait until every
    /// worker has exited.
    ///
    /// Blocked reads fail with a transport error, so each active session
    /// still reports to its handler's `session_terminated`. Calling this
    /// again is harmless.
    pub async fn shutdown(&self) {
        self.pool.close();
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!(
            "server stopped: workers={}, port={:?}",
            self.pool.worker_count(),
            self.local_port()
        );
    }

    /// Whether [`shutdown`](Self::shutdown) has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool { self.shutdown.is_cancelled() }

    /// Address of the TCP listener, if one is bound.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> { self.tcp_addr }

    /// Address of the UDP socket, if one is bound.
    #[must_use]
    pub fn udp_local_addr(&self) -> Option<SocketAddr> { self.udp_addr }

    /// Listening port, preferring the TCP listener.
    #[must_use]
    pub fn local_port(&self) -> Option<u16> {
        self.tcp_addr.or(self.udp_addr).map(|addr| addr.port())
    }

    /// Number of session workers created so far.
    #[must_use]
    pub fn worker_count(&self) -> usize { self.pool.worker_count() }

    /// Number of session workers waiting for a connection.
    #[must_use]
    pub fn idle_worker_count(&self) -> usize { self.pool.idle_count() }

    /// Register a raw-packet observer on the running server.
    pub fn add_listener<O>(&self, observer: O) -> ListenerId
    where
        O: PacketObserver + 'static,
    {
        self.observers.add(observer)
    }

    /// Remove an observer registered on this server.
    pub fn remove_listener(&self, id: ListenerId) -> bool { self.observers.remove(id) }
}
