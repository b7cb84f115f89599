//! Read-only view of a live session handed to packet handlers.

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use super::{Transport, counter::SessionCounters};

/// Metadata of the session a handler is serving.
///
/// Cloning is cheap. The byte counters and available-byte count are live:
/// they reflect the connection at the time of the call, not at the time the
/// handle was created. Holding a `SessionInfo` does not keep the worker or
/// the connection alive.
#[derive(Clone, Debug)]
pub struct SessionInfo {
    pub(super) transport: Transport,
    pub(super) tls: bool,
    pub(super) peer: SocketAddr,
    pub(super) local_port: u16,
    pub(super) counters: Arc<SessionCounters>,
}

impl SessionInfo {
    /// Port the server is listening on.
    #[must_use]
    pub fn local_port(&self) -> u16 { self.local_port }

    /// Transport carrying the session.
    #[must_use]
    pub fn transport(&self) -> Transport { self.transport }

    /// Whether the session is a TCP connection.
    #[must_use]
    pub fn is_tcp(&self) -> bool { self.transport == Transport::Tcp }

    /// Whether the session is a UDP datagram.
    #[must_use]
    pub fn is_udp(&self) -> bool { self.transport == Transport::Udp }

    /// Whether the TCP stream is TLS-wrapped.
    #[must_use]
    pub fn is_tls(&self) -> bool { self.tls }

    /// Bytes received but not yet consumed by the frame reader.
    #[must_use]
    pub fn available_bytes(&self) -> usize { self.counters.available() }

    /// Bytes read during this session.
    #[must_use]
    pub fn read_byte_count(&self) -> u64 { self.counters.read() }

    /// Bytes written during this session.
    #[must_use]
    pub fn write_byte_count(&self) -> u64 { self.counters.written() }

    /// Address of the peer.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr { self.peer }

    /// IP address of the peer.
    #[must_use]
    pub fn inet_addr(&self) -> IpAddr { self.peer.ip() }
}
