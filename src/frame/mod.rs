//! Framing of raw connection bytes into packets.
//!
//! [`FrameReader`] produces one [`Packet`] per call, either as a text line
//! (see [`text`]) or as a binary packet whose length the handler declares
//! once a minimum prefix has been read (see [`binary`]). Every byte read is
//! bounded by the idle/packet deadline and by the session deadline.

mod binary;
mod text;

use bytes::Bytes;
use log::{error, warn};
use tokio::time::Instant;

use crate::{
    config::FramingConfig,
    connection::{Connection, ReadFailure},
    error::{Result, SessionError},
    packet::{Packet, hex},
    timeout::{PacketDeadline, SessionDeadline},
};

/// Length of a binary packet as declared by the handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketLength {
    /// The packet is exactly this many bytes, capped at the maximum packet
    /// length. Zero means "not known yet": the handler is asked again after
    /// the next byte.
    Fixed(usize),
    /// The rest of the packet is a text line ending at a line terminator.
    LineTerminated,
    /// Read until the maximum packet length or the end of the stream.
    ReadToEnd,
}

/// Computes the actual length of a binary packet from its first bytes.
pub trait LengthProbe {
    /// Inspect the bytes read so far and declare the packet length.
    fn actual_length(&mut self, packet: &[u8]) -> PacketLength;
}

impl<F> LengthProbe for F
where
    F: FnMut(&[u8]) -> PacketLength,
{
    fn actual_length(&mut self, packet: &[u8]) -> PacketLength { self(packet) }
}

/// Result of one frame read that did not end the session.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A complete packet.
    Packet(Packet),
    /// A read timed out and the partial packet was dropped; the session
    /// continues.
    Discarded,
    /// The datagram was fully consumed before any byte of a new packet.
    Exhausted,
}

/// Reads packets from a connection according to a [`FramingConfig`].
#[derive(Clone, Copy, Debug)]
pub struct FrameReader<'a> {
    config: &'a FramingConfig,
    session: SessionDeadline,
}

impl<'a> FrameReader<'a> {
    /// Create a reader bounded by the `session` deadline.
    #[must_use]
    pub fn new(config: &'a FramingConfig, session: SessionDeadline) -> Self {
        Self { config, session }
    }

    /// Read the next packet from `conn`.
    ///
    /// `probe` is consulted by binary framing once the minimum packet length
    /// is reached; without one, binary packets run to the maximum length or
    /// the end of the datagram.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SessionTimeout`] once the session deadline
    /// passes, [`SessionError::ReadTimeout`] when terminate-on-timeout is
    /// set, [`SessionError::EndOfStream`] when a TCP peer closes, and
    /// [`SessionError::Transport`] for socket failures.
    pub async fn read_packet<P>(
        &self,
        conn: &mut Connection,
        probe: Option<&mut P>,
    ) -> Result<FrameOutcome>
    where
        P: LengthProbe + ?Sized,
    {
        let deadline = self
            .config
            .timeout_policy()
            .packet_deadline(Instant::now(), self.session);
        let mut frame = PartialFrame {
            buf: Vec::with_capacity(self.config.max_packet_length().min(256)),
            deadline,
        };
        let read = if self.config.is_text() {
            self.read_line(conn, &mut frame).await
        } else {
            self.read_binary(conn, &mut frame, probe).await
        };
        match read {
            Ok(()) => Ok(FrameOutcome::Packet(Packet::from(frame.buf))),
            Err(failure) => self.recover(failure, conn, frame),
        }
    }

    /// Turn a failed byte read into an outcome or a session error.
    fn recover(
        &self,
        failure: ReadFailure,
        conn: &Connection,
        frame: PartialFrame,
    ) -> Result<FrameOutcome> {
        let position = frame.buf.len();
        match failure {
            ReadFailure::TimedOut if frame.deadline.session_expired(Instant::now()) => Err(
                SessionError::SessionTimeout(self.session.limit().unwrap_or_default()),
            ),
            ReadFailure::TimedOut => {
                if position > 0 {
                    warn!(
                        "read timeout: peer={}, partial={}",
                        conn.peer_addr(),
                        self.render(&frame.buf)
                    );
                }
                crate::metrics::inc_timeouts();
                if self.config.terminates_on_timeout() {
                    Err(SessionError::ReadTimeout {
                        position,
                        partial: Bytes::from(frame.buf),
                    })
                } else {
                    Ok(FrameOutcome::Discarded)
                }
            }
            ReadFailure::EndOfStream => {
                if position > 0 {
                    warn!(
                        "end of stream: peer={}, partial={}",
                        conn.peer_addr(),
                        self.render(&frame.buf)
                    );
                }
                if conn.is_tcp() {
                    Err(SessionError::EndOfStream {
                        position,
                        partial: Bytes::from(frame.buf),
                    })
                } else if position > 0 {
                    Ok(FrameOutcome::Packet(Packet::from(frame.buf)))
                } else {
                    Ok(FrameOutcome::Exhausted)
                }
            }
            ReadFailure::Io(e) => {
                error!("read error: peer={}, error={e}", conn.peer_addr());
                Err(SessionError::Transport(e))
            }
        }
    }

    fn render(&self, bytes: &[u8]) -> String {
        if self.config.is_text() {
            String::from_utf8_lossy(bytes).into_owned()
        } else {
            hex(bytes)
        }
    }
}

/// Bytes of the packet being assembled plus its deadline.
struct PartialFrame {
    buf: Vec<u8>,
    deadline: PacketDeadline,
}

impl PartialFrame {
    async fn next_byte(&mut self, conn: &mut Connection) -> std::result::Result<u8, ReadFailure> {
        let byte = conn.read_byte(self.deadline.current()).await?;
        self.deadline.first_byte(Instant::now());
        Ok(byte)
    }
}
