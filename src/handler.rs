//! The pluggable packet handler contract.
//!
//! A [`PacketHandler`] interprets framed packets for one session at a time.
//! The server resolves a handler for every session from its
//! [`HandlerBinding`]: either one shared instance serialised behind a mutex,
//! or a fresh instance built by a factory.

use std::{
    fmt,
    net::IpAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;

use crate::{
    connection::SessionInfo,
    error::{BoxError, SessionError},
    frame::{LengthProbe, PacketLength},
    packet::Packet,
};

/// Application callbacks driven by a session worker.
///
/// Only [`handle_packet`](Self::handle_packet) is required. Calls arrive in
/// this order for every session: `set_session_info(Some(_))`,
/// `session_started`, `initial_packet` (TCP only), then per packet
/// `actual_packet_length` (binary framing), `handle_packet`,
/// `response_port` and `terminate_session`; finally `final_packet`,
/// `session_terminated` and `set_session_info(None)`.
pub trait PacketHandler: Send {
    /// Receive a live metadata handle for the session, or `None` once it ends.
    fn set_session_info(&mut self, info: Option<SessionInfo>) { let _ = info; }

    /// Called once the session is bound, before anything is read.
    fn session_started(&mut self, peer: IpAddr, is_tcp: bool, is_text: bool) {
        let _ = (peer, is_tcp, is_text);
    }

    /// Greeting written to TCP peers before the first read.
    fn initial_packet(&mut self) -> Option<Bytes> { None }

    /// Declare the length of a binary packet from its first bytes.
    ///
    /// The default ends the packet at the minimum packet length.
    fn actual_packet_length(&mut self, packet: &[u8]) -> PacketLength {
        PacketLength::Fixed(packet.len())
    }

    /// Process one packet and optionally return a response.
    ///
    /// # Errors
    ///
    /// An error ends the session with [`SessionError::Handler`].
    fn handle_packet(&mut self, packet: &Packet) -> Result<Option<Bytes>, BoxError>;

    /// Checked after every packet; `true` ends the session.
    fn terminate_session(&mut self) -> bool { false }

    /// Last bytes sent to the peer as the session ends.
    fn final_packet(&mut self, had_error: bool) -> Option<Bytes> {
        let _ = had_error;
        None
    }

    /// Always called once at the end of a session.
    fn session_terminated(&mut self, error: Option<&SessionError>, read: u64, written: u64) {
        let _ = (error, read, written);
    }

    /// UDP port responses are sent to, overriding the server default.
    fn response_port(&self) -> Option<u16> { None }
}

type HandlerFactory = dyn Fn() -> Box<dyn PacketHandler> + Send + Sync;

/// How the server obtains a handler for each session.
#[derive(Clone)]
pub enum HandlerBinding {
    /// One instance used by every session. Calls are serialised; the handler
    /// owns any cross-session state consistency.
    Shared(Arc<Mutex<dyn PacketHandler>>),
    /// A fresh instance per session.
    Factory(Arc<HandlerFactory>),
}

impl HandlerBinding {
    /// Share `handler` across all sessions.
    pub fn shared<H>(handler: H) -> Self
    where
        H: PacketHandler + 'static,
    {
        Self::Shared(Arc::new(Mutex::new(handler)))
    }

    /// Build a new handler for every session with `factory`.
    pub fn factory<F, H>(factory: F) -> Self
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: PacketHandler + 'static,
    {
        Self::Factory(Arc::new(move || Box::new(factory()) as Box<dyn PacketHandler>))
    }

    pub(crate) fn resolve(&self) -> SessionHandler {
        match self {
            Self::Shared(handler) => SessionHandler::Shared(Arc::clone(handler)),
            Self::Factory(factory) => SessionHandler::Owned(factory()),
        }
    }
}

impl fmt::Debug for HandlerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Shared(_) => "HandlerBinding::Shared",
            Self::Factory(_) => "HandlerBinding::Factory",
        })
    }
}

/// Handler resolved for a single session.
pub(crate) enum SessionHandler {
    Owned(Box<dyn PacketHandler>),
    Shared(Arc<Mutex<dyn PacketHandler>>),
}

impl SessionHandler {
    /// Run `f` with exclusive access to the handler.
    ///
    /// A shared handler poisoned by a panic in another session stays usable.
    pub(crate) fn with<R>(&mut self, f: impl FnOnce(&mut dyn PacketHandler) -> R) -> R {
        match self {
            Self::Owned(handler) => f(handler.as_mut()),
            Self::Shared(handler) => {
                let mut guard: MutexGuard<'_, dyn PacketHandler> =
                    handler.lock().unwrap_or_else(PoisonError::into_inner);
                f(&mut *guard)
            }
        }
    }
}

impl LengthProbe for SessionHandler {
    fn actual_length(&mut self, packet: &[u8]) -> PacketLength {
        self.with(|h| h.actual_packet_length(packet))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rstest::rstest;

    use super::*;

    struct Counting {
        seen: usize,
    }

    impl PacketHandler for Counting {
        fn handle_packet(&mut self, packet: &Packet) -> Result<Option<Bytes>, BoxError> {
            self.seen += 1;
            Ok(Some(Bytes::from(format!("{}:{}", self.seen, packet.len()))))
        }
    }

    fn handle(handler: &mut SessionHandler, bytes: &'static [u8]) -> Option<Bytes> {
        handler
            .with(|h| h.handle_packet(&Packet::from(bytes)))
            .expect("handle packet")
    }

    #[test]
    fn shared_binding_reuses_instance() {
        let binding = HandlerBinding::shared(Counting { seen: 0 });
        let mut first = binding.resolve();
        let mut second = binding.resolve();
        assert_eq!(handle(&mut first, b"ab"), Some(Bytes::from_static(b"1:2")));
        assert_eq!(handle(&mut second, b"abc"), Some(Bytes::from_static(b"2:3")));
    }

    #[test]
    fn factory_binding_builds_per_session() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let binding = HandlerBinding::factory(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Counting { seen: 0 }
        });
        let mut first = binding.resolve();
        let mut second = binding.resolve();
        assert_eq!(handle(&mut first, b"x"), Some(Bytes::from_static(b"1:1")));
        assert_eq!(handle(&mut second, b"x"), Some(Bytes::from_static(b"1:1")));
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[rstest]
    #[case(b"", 0)]
    #[case(b"abcd", 4)]
    fn default_length_ends_at_minimum(#[case] prefix: &[u8], #[case] expected: usize) {
        let mut handler = HandlerBinding::shared(Counting { seen: 0 }).resolve();
        assert_eq!(handler.actual_length(prefix), PacketLength::Fixed(expected));
    }

    #[test]
    fn poisoned_shared_handler_stays_usable() {
        let binding = HandlerBinding::shared(Counting { seen: 0 });
        let HandlerBinding::Shared(inner) = &binding else {
            unreachable!("shared binding");
        };
        let poisoner = Arc::clone(inner);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().expect("lock");
            panic!("poison");
        })
        .join();
        let mut handler = binding.resolve();
        assert_eq!(handle(&mut handler, b"ok"), Some(Bytes::from_static(b"1:2")));
    }
}
