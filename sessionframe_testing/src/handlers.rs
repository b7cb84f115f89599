//! Scriptable packet handlers that journal every callback.

use std::{
    net::IpAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;
use sessionframe::{BoxError, Packet, PacketHandler, PacketLength, SessionError};

/// How a [`RecordingHandler`] answers each packet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Reply {
    /// Send the packet back unchanged.
    #[default]
    Echo,
    /// Send the packet back with its bytes reversed.
    Reverse,
    /// Send nothing.
    Silent,
}

/// How one session ended, as seen by `session_terminated`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Termination {
    pub error: Option<String>,
    pub read: u64,
    pub written: u64,
}

/// Everything a [`RecordingHandler`] observed, shared across its clones.
#[derive(Debug, Default)]
pub struct Journal {
    pub started: Vec<(IpAddr, bool, bool)>,
    pub packets: Vec<Bytes>,
    /// Buffered lengths seen by `actual_packet_length`.
    pub length_probes: Vec<usize>,
    pub final_packets: Vec<bool>,
    pub terminated: Vec<Termination>,
    pub info_cleared: usize,
}

/// Handler whose clones share one [`Journal`].
///
/// Replies can be newline-terminated for line based peers, and specific
/// packets can be made to fail, panic, or end the session.
#[derive(Clone, Debug, Default)]
pub struct RecordingHandler {
    journal: Arc<Mutex<Journal>>,
    reply: Reply,
    newline: bool,
    greeting: Option<Bytes>,
    farewell: Option<Bytes>,
    fail_on: Option<Bytes>,
    panic_on: Option<Bytes>,
    quit_on: Option<Bytes>,
    response_port: Option<u16>,
    packet_length: Option<PacketLength>,
    quit: bool,
}

impl RecordingHandler {
    /// Echo handler with an empty journal.
    #[must_use]
    pub fn new(reply: Reply) -> Self {
        Self {
            reply,
            ..Self::default()
        }
    }

    /// Append `\n` to every reply.
    #[must_use]
    pub fn newline(mut self) -> Self {
        self.newline = true;
        self
    }

    /// Greet TCP peers with `bytes`.
    #[must_use]
    pub fn greeting(mut self, bytes: &'static [u8]) -> Self {
        self.greeting = Some(Bytes::from_static(bytes));
        self
    }

    /// Send `bytes` as the final packet of every session.
    #[must_use]
    pub fn farewell(mut self, bytes: &'static [u8]) -> Self {
        self.farewell = Some(Bytes::from_static(bytes));
        self
    }

    /// Return an error when `packet` arrives.
    #[must_use]
    pub fn fail_on(mut self, packet: &'static [u8]) -> Self {
        self.fail_on = Some(Bytes::from_static(packet));
        self
    }

    /// Panic when `packet` arrives.
    #[must_use]
    pub fn panic_on(mut self, packet: &'static [u8]) -> Self {
        self.panic_on = Some(Bytes::from_static(packet));
        self
    }

    /// End the session after replying to `packet`.
    #[must_use]
    pub fn quit_on(mut self, packet: &'static [u8]) -> Self {
        self.quit_on = Some(Bytes::from_static(packet));
        self
    }

    /// Send UDP responses to `port`.
    #[must_use]
    pub fn response_port(mut self, port: u16) -> Self {
        self.response_port = Some(port);
        self
    }

    /// Declare every binary packet with `length`.
    #[must_use]
    pub fn packet_length(mut self, length: PacketLength) -> Self {
        self.packet_length = Some(length);
        self
    }

    /// Lock the shared journal.
    pub fn journal(&self) -> MutexGuard<'_, Journal> {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Terminations recorded so far.
    #[must_use]
    pub fn terminations(&self) -> Vec<Termination> { self.journal().terminated.clone() }
}

impl PacketHandler for RecordingHandler {
    fn set_session_info(&mut self, info: Option<sessionframe::SessionInfo>) {
        if info.is_none() {
            self.journal().info_cleared += 1;
        }
    }

    fn session_started(&mut self, peer: IpAddr, is_tcp: bool, is_text: bool) {
        self.quit = false;
        self.journal().started.push((peer, is_tcp, is_text));
    }

    fn initial_packet(&mut self) -> Option<Bytes> { self.greeting.clone() }

    fn actual_packet_length(&mut self, packet: &[u8]) -> PacketLength {
        self.journal().length_probes.push(packet.len());
        self.packet_length.unwrap_or(PacketLength::Fixed(packet.len()))
    }

    fn handle_packet(&mut self, packet: &Packet) -> Result<Option<Bytes>, BoxError> {
        self.journal().packets.push(packet.as_bytes().clone());
        let bytes: &[u8] = packet;
        if self.panic_on.as_deref() == Some(bytes) {
            panic!("handler asked to panic");
        }
        if self.fail_on.as_deref() == Some(bytes) {
            return Err(format!("rejected packet {}", packet.to_text()).into());
        }
        self.quit = self.quit_on.as_deref() == Some(bytes);

        let mut reply = match self.reply {
            Reply::Echo => bytes.to_vec(),
            Reply::Reverse => bytes.iter().rev().copied().collect(),
            Reply::Silent => return Ok(None),
        };
        if self.newline {
            reply.push(b'\n');
        }
        Ok(Some(Bytes::from(reply)))
    }

    fn terminate_session(&mut self) -> bool { self.quit }

    fn final_packet(&mut self, had_error: bool) -> Option<Bytes> {
        self.journal().final_packets.push(had_error);
        self.farewell.clone()
    }

    fn session_terminated(&mut self, error: Option<&SessionError>, read: u64, written: u64) {
        self.journal().terminated.push(Termination {
            error: error.map(ToString::to_string),
            read,
            written,
        });
    }

    fn response_port(&self) -> Option<u16> { self.response_port }
}
