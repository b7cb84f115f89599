//! Test helpers shared across server modules.

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use rstest::fixture;

use super::{Bound, SessionServer};
use crate::{
    error::{BoxError, SessionError},
    handler::PacketHandler,
    packet::Packet,
};

/// Replies to each line with the line reversed and records how sessions end.
#[derive(Clone, Default)]
pub struct ReverseHandler {
    pub terminated: Arc<Mutex<Vec<Option<String>>>>,
}

impl PacketHandler for ReverseHandler {
    fn handle_packet(&mut self, packet: &Packet) -> Result<Option<Bytes>, BoxError> {
        let mut reply: Vec<u8> = packet.iter().rev().copied().collect();
        reply.push(b'\n');
        Ok(Some(Bytes::from(reply)))
    }

    fn session_terminated(&mut self, error: Option<&SessionError>, _read: u64, _written: u64) {
        self.terminated
            .lock()
            .expect("lock")
            .push(error.map(ToString::to_string));
    }
}

#[fixture]
pub fn handler() -> ReverseHandler { ReverseHandler::default() }

#[fixture]
/// Returns a bound [`TcpListener`] on a free port for use in tests.
///
/// Keeping the listener bound prevents race conditions where another
/// process could claim the port between discovery and use.
///
/// [`TcpListener`]: StdTcpListener
pub fn free_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("Failed to bind free port listener")
}

/// Extract the bound address from a listener.
#[must_use]
pub fn listener_addr(listener: &StdTcpListener) -> SocketAddr {
    listener
        .local_addr()
        .expect("failed to get listener address")
}

pub fn bind_server(handler: ReverseHandler, listener: StdTcpListener) -> SessionServer<Bound> {
    SessionServer::new()
        .packet_handler_factory(move || handler.clone())
        .bind_existing_listener(listener)
        .expect("Failed to bind")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_addr_matches_local_addr() {
        let listener = free_listener();
        assert_eq!(
            listener_addr(&listener),
            listener.local_addr().expect("failed to get address")
        );
        assert_eq!(listener_addr(&listener).ip(), std::net::IpAddr::from(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn reverse_handler_appends_newline() {
        let mut handler = ReverseHandler::default();
        let reply = handler
            .handle_packet(&Packet::from(&b"abc"[..]))
            .expect("handle");
        assert_eq!(reply, Some(Bytes::from_static(b"cba\n")));
    }
}
