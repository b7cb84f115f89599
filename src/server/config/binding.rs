//! Socket binding for [`SessionServer`].
//!
//! Binding moves the server into the [`Bound`] state. TCP and UDP sockets are
//! bound independently, so a server may serve either transport or both.

use std::{
    net::{SocketAddr, TcpListener as StdTcpListener, UdpSocket as StdUdpSocket},
    sync::Arc,
};

use tokio::net::{TcpListener, UdpSocket};

use crate::server::{
    Bound,
    ServerError,
    ServerState,
    SessionServer,
    Unbound,
    sealed::Sealed,
};

impl<S> SessionServer<S>
where
    S: ServerState,
{
    fn rebind(self, update: impl FnOnce(&mut Bound)) -> SessionServer<Bound> {
        let SessionServer {
            framing,
            handler,
            observers,
            remote_port,
            backoff_config,
            ready_tx,
            #[cfg(feature = "tls")]
            tls,
            state,
        } = self;
        let mut state = state.into_bound();
        update(&mut state);
        SessionServer {
            framing,
            handler,
            observers,
            remote_port,
            backoff_config,
            ready_tx,
            #[cfg(feature = "tls")]
            tls,
            state,
        }
    }

    /// Bind a TCP listener to `addr`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::net::{Ipv4Addr, SocketAddr};
    ///
    /// use sessionframe::server::SessionServer;
    ///
    /// let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
    /// # let rt = tokio::runtime::Runtime::new().unwrap();
    /// # let _guard = rt.enter();
    /// let server = SessionServer::new().bind(addr).expect("bind failed");
    /// assert!(server.local_addr().is_some());
    /// ```
    ///
    /// # Errors
    /// Returns [`ServerError::Bind`] if binding or configuring the listener
    /// fails.
    pub fn bind(self, addr: SocketAddr) -> Result<SessionServer<Bound>, ServerError> {
        let std_listener = StdTcpListener::bind(addr).map_err(ServerError::Bind)?;
        self.bind_existing_listener(std_listener)
    }

    /// Serve TCP on an existing `StdTcpListener`.
    ///
    /// # Errors
    /// Returns [`ServerError::Bind`] if configuring the listener fails.
    pub fn bind_existing_listener(
        self,
        std_listener: StdTcpListener,
    ) -> Result<SessionServer<Bound>, ServerError> {
        std_listener
            .set_nonblocking(true)
            .map_err(ServerError::Bind)?;
        let listener = TcpListener::from_std(std_listener).map_err(ServerError::Bind)?;
        Ok(self.rebind(|state| state.tcp = Some(Arc::new(listener))))
    }

    /// Bind a UDP socket to `addr`.
    ///
    /// # Errors
    /// Returns [`ServerError::Bind`] if binding or configuring the socket
    /// fails.
    pub fn bind_udp(self, addr: SocketAddr) -> Result<SessionServer<Bound>, ServerError> {
        let std_socket = StdUdpSocket::bind(addr).map_err(ServerError::Bind)?;
        self.bind_existing_socket(std_socket)
    }

    /// Serve UDP on an existing `StdUdpSocket`.
    ///
    /// # Errors
    /// Returns [`ServerError::Bind`] if configuring the socket fails.
    pub fn bind_existing_socket(
        self,
        std_socket: StdUdpSocket,
    ) -> Result<SessionServer<Bound>, ServerError> {
        std_socket
            .set_nonblocking(true)
            .map_err(ServerError::Bind)?;
        let socket = UdpSocket::from_std(std_socket).map_err(ServerError::Bind)?;
        Ok(self.rebind(|state| state.udp = Some(Arc::new(socket))))
    }
}

impl SessionServer<Unbound> {
    /// Return `None` as the server is not bound.
    ///
    /// # Examples
    ///
    /// ```
    /// use sessionframe::server::SessionServer;
    ///
    /// assert!(SessionServer::new().local_addr().is_none());
    /// ```
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> { None }
}

impl SessionServer<Bound> {
    /// Address of the TCP listener, or `None` when only UDP is bound.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.state.tcp.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Address of the UDP socket, or `None` when only TCP is bound.
    #[must_use]
    pub fn udp_local_addr(&self) -> Option<SocketAddr> {
        self.state.udp.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Listening port, preferring the TCP listener.
    #[must_use]
    pub fn local_port(&self) -> Option<u16> {
        self.local_addr()
            .or_else(|| self.udp_local_addr())
            .map(|addr| addr.port())
    }
}
