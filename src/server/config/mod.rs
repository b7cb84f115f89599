//! Configuration utilities for [`SessionServer`].

use tokio::sync::oneshot;

use super::{ServerState, SessionServer, Unbound, runtime::BackoffConfig};
use crate::{
    config::FramingConfig,
    handler::{HandlerBinding, PacketHandler},
    observer::{ListenerId, PacketObserver, PacketObservers},
};

pub mod binding;

impl SessionServer<Unbound> {
    /// Create a server with the default text framing and no handler.
    ///
    /// No socket is bound; call [`bind`](Self::bind) or
    /// [`bind_udp`](Self::bind_udp) before running the server.
    #[must_use]
    pub fn new() -> Self { Self::with_framing(FramingConfig::default()) }

    /// Create a server using `framing` for every session.
    #[must_use]
    pub fn with_framing(framing: FramingConfig) -> Self {
        Self {
            framing,
            handler: None,
            observers: PacketObservers::default(),
            remote_port: None,
            backoff_config: BackoffConfig::default(),
            ready_tx: None,
            #[cfg(feature = "tls")]
            tls: None,
            state: Unbound,
        }
    }
}

impl Default for SessionServer<Unbound> {
    fn default() -> Self { Self::new() }
}

impl<S> SessionServer<S>
where
    S: ServerState,
{
    /// Replace the framing configuration.
    #[must_use]
    pub fn framing(mut self, framing: FramingConfig) -> Self {
        self.framing = framing;
        self
    }

    /// Share one `handler` instance between all sessions.
    ///
    /// Replaces any handler or factory set earlier.
    #[must_use]
    pub fn packet_handler<H>(self, handler: H) -> Self
    where
        H: PacketHandler + 'static,
    {
        self.handler_binding(HandlerBinding::shared(handler))
    }

    /// Build a fresh handler for every session with `factory`.
    ///
    /// Replaces any handler or factory set earlier.
    #[must_use]
    pub fn packet_handler_factory<F, H>(self, factory: F) -> Self
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: PacketHandler + 'static,
    {
        self.handler_binding(HandlerBinding::factory(factory))
    }

    /// Install an already constructed [`HandlerBinding`].
    #[must_use]
    pub fn handler_binding(mut self, binding: HandlerBinding) -> Self {
        self.handler = Some(binding);
        self
    }

    /// Default UDP port responses are sent to when the handler does not
    /// choose one. Zero restores the peer's source port.
    #[must_use]
    pub fn remote_port(mut self, port: u16) -> Self {
        self.remote_port = (port != 0).then_some(port);
        self
    }

    /// Override the accept-loop back-off.
    #[must_use]
    pub fn accept_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff_config = backoff.normalized();
        self
    }

    /// Configure a channel used to signal when the server is ready to accept
    /// connections.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// Perform a TLS handshake with `acceptor` at the start of every TCP
    /// session.
    #[cfg(feature = "tls")]
    #[must_use]
    pub fn with_tls(mut self, acceptor: tokio_rustls::TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    /// Register a raw-packet observer.
    pub fn add_listener<O>(&self, observer: O) -> ListenerId
    where
        O: PacketObserver + 'static,
    {
        self.observers.add(observer)
    }

    /// Remove an observer registered with [`add_listener`](Self::add_listener).
    pub fn remove_listener(&self, id: ListenerId) -> bool { self.observers.remove(id) }

    /// Framing applied to sessions.
    #[must_use]
    pub fn framing_config(&self) -> &FramingConfig { &self.framing }

    /// Whether a handler or handler factory is installed.
    #[must_use]
    pub fn has_handler(&self) -> bool { self.handler.is_some() }
}
