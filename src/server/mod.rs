//! Tokio-based socket server driving pooled session workers.
//!
//! `SessionServer` accepts TCP connections and UDP datagrams, hands each one
//! to an idle session worker (creating a worker when none is idle), and lets
//! the worker frame packets and drive the configured [`PacketHandler`].
//!
//! [`PacketHandler`]: crate::handler::PacketHandler

use std::sync::Arc;

use tokio::{
    net::{TcpListener, UdpSocket},
    sync::oneshot,
};

use crate::{config::FramingConfig, handler::HandlerBinding, observer::PacketObservers};

/// Socket server whose sessions are framed by a [`FramingConfig`].
///
/// The server carries a typestate `S` indicating whether it is [`Unbound`]
/// (no socket yet) or [`Bound`] to a TCP listener, a UDP socket, or both.
/// New servers start `Unbound` and must call one of the binding methods in
/// [`binding`] before [`start`](SessionServer::start) or
/// [`run`](SessionServer::run) become available.
pub struct SessionServer<S = Unbound>
where
    S: ServerState,
{
    pub(crate) framing: FramingConfig,
    pub(crate) handler: Option<HandlerBinding>,
    pub(crate) observers: PacketObservers,
    /// Port UDP responses go to when the handler does not pick one.
    pub(crate) remote_port: Option<u16>,
    pub(crate) backoff_config: BackoffConfig,
    /// Channel used to notify when the server is ready.
    ///
    /// A `oneshot::Sender` can transmit only one readiness notification, so a
    /// new sender must be provided each time the server is started.
    pub(crate) ready_tx: Option<oneshot::Sender<()>>,
    #[cfg(feature = "tls")]
    pub(crate) tls: Option<tokio_rustls::TlsAcceptor>,
    /// Typestate tracking whether the server has been bound to a socket.
    pub(crate) state: S,
}

/// Marker indicating the server has not yet bound a socket.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Marker indicating the server owns at least one bound socket.
#[derive(Debug, Clone, Default)]
pub struct Bound {
    pub(crate) tcp: Option<Arc<TcpListener>>,
    pub(crate) udp: Option<Arc<UdpSocket>>,
}

/// Trait implemented by [`Unbound`] and [`Bound`] to model binding typestate.
pub trait ServerState: sealed::Sealed {}

mod sealed {
    //! Prevent external implementations of [`ServerState`].

    pub trait Sealed {
        /// Sockets bound so far.
        fn into_bound(self) -> super::Bound;
    }

    impl Sealed for super::Unbound {
        fn into_bound(self) -> super::Bound { super::Bound::default() }
    }

    impl Sealed for super::Bound {
        fn into_bound(self) -> super::Bound { self }
    }
}

impl ServerState for Unbound {}
impl ServerState for Bound {}

mod config;
pub use config::binding;
pub mod error;
mod pool;
mod runtime;
mod session;
mod worker;

pub use error::ServerError;
/// Re-exported configuration type for accept back-off behaviour.
pub use runtime::BackoffConfig;
pub use runtime::RunningServer;

#[cfg(test)]
pub(crate) mod test_util;
