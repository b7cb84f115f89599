//! Uniform wrapper over a TCP stream or a single UDP datagram.
//!
//! A [`Connection`] is owned by exactly one session worker. Stream
//! connections persist until closed; datagram connections wrap one received
//! payload which is consumed once. Reads are byte-at-a-time over an internal
//! buffer, bounded by an optional deadline and interrupted when the server
//! closes the connection during shutdown.

mod counter;
mod info;

use std::{
    fmt,
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use bytes::{Buf, Bytes, BytesMut};
use log::debug;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpStream, UdpSocket},
    select,
    time::{Instant, timeout, timeout_at},
};
use tokio_util::sync::CancellationToken;

pub use counter::active_session_count;
pub(crate) use counter::{ActiveSession, SessionCounters};
pub use info::SessionInfo;

/// Bytes requested from the socket per refill of the read buffer.
const READ_CHUNK: usize = 512;

/// Transport carrying a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transport {
    /// A TCP (or TLS-over-TCP) stream.
    Tcp,
    /// A single UDP datagram.
    Udp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        })
    }
}

/// Byte stream usable as the body of a stream connection.
pub trait SessionIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> SessionIo for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Why a single byte could not be read.
#[derive(Debug)]
pub(crate) enum ReadFailure {
    TimedOut,
    EndOfStream,
    Io(io::Error),
}

enum Source {
    Stream { io: Box<dyn SessionIo>, buf: BytesMut },
    Datagram(Bytes),
    Closed,
}

/// A client connection bound to a session worker.
pub struct Connection {
    source: Source,
    transport: Transport,
    tls: bool,
    peer: SocketAddr,
    local_port: u16,
    counters: Arc<SessionCounters>,
    abort: CancellationToken,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("transport", &self.transport)
            .field("tls", &self.tls)
            .field("peer", &self.peer)
            .field("local_port", &self.local_port)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wrap an accepted TCP stream.
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] if the peer address cannot be read.
    pub fn tcp(stream: TcpStream, local_port: u16) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        Ok(Self::from_stream(stream, peer, local_port))
    }

    /// Wrap any byte stream as a TCP-style connection.
    pub fn from_stream<S>(io: S, peer: SocketAddr, local_port: u16) -> Self
    where
        S: SessionIo + 'static,
    {
        Self {
            source: Source::Stream {
                io: Box::new(io),
                buf: BytesMut::with_capacity(READ_CHUNK),
            },
            transport: Transport::Tcp,
            tls: false,
            peer,
            local_port,
            counters: Arc::default(),
            abort: CancellationToken::new(),
        }
    }

    /// Wrap one received datagram payload.
    pub fn datagram(payload: impl Into<Bytes>, peer: SocketAddr, local_port: u16) -> Self {
        let payload = payload.into();
        let counters = Arc::new(SessionCounters::default());
        counters.set_available(payload.len());
        Self {
            source: Source::Datagram(payload),
            transport: Transport::Udp,
            tls: false,
            peer,
            local_port,
            counters,
            abort: CancellationToken::new(),
        }
    }

    /// Tie blocking reads and writes to `token`; cancelling it behaves like
    /// closing the socket from another task.
    pub(crate) fn set_abort(&mut self, token: CancellationToken) { self.abort = token; }

    /// Transport of this connection.
    #[must_use]
    pub fn transport(&self) -> Transport { self.transport }

    /// Whether this is a TCP connection.
    #[must_use]
    pub fn is_tcp(&self) -> bool { self.transport == Transport::Tcp }

    /// Whether this is a UDP datagram.
    #[must_use]
    pub fn is_udp(&self) -> bool { self.transport == Transport::Udp }

    /// Whether the stream was upgraded to TLS.
    #[must_use]
    pub fn is_tls(&self) -> bool { self.tls }

    /// Address of the peer.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr { self.peer }

    /// Port the server received this connection on.
    #[must_use]
    pub fn local_port(&self) -> u16 { self.local_port }

    /// Bytes received but not yet consumed.
    #[must_use]
    pub fn available(&self) -> usize {
        match &self.source {
            Source::Stream { buf, .. } => buf.len(),
            Source::Datagram(payload) => payload.len(),
            Source::Closed => 0,
        }
    }

    /// Bytes consumed so far.
    #[must_use]
    pub fn bytes_read(&self) -> u64 { self.counters.read() }

    /// Bytes written so far, including datagram replies.
    #[must_use]
    pub fn bytes_written(&self) -> u64 { self.counters.written() }

    /// Whether [`close`](Self::close) already ran.
    #[must_use]
    pub fn is_closed(&self) -> bool { matches!(self.source, Source::Closed) }

    /// Live metadata handle for packet handlers.
    #[must_use]
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            transport: self.transport,
            tls: self.tls,
            peer: self.peer,
            local_port: self.local_port,
            counters: Arc::clone(&self.counters),
        }
    }

    /// Read one byte, waiting at most until `deadline`.
    ///
    /// An already expired deadline fails even when bytes are buffered.
    pub(crate) async fn read_byte(&mut self, deadline: Option<Instant>) -> Result<u8, ReadFailure> {
        if deadline.is_some_and(|at| Instant::now() >= at) {
            return Err(ReadFailure::TimedOut);
        }
        let Self {
            source,
            counters,
            abort,
            ..
        } = self;
        let byte = match source {
            Source::Datagram(payload) => {
                if !payload.has_remaining() {
                    return Err(ReadFailure::EndOfStream);
                }
                let byte = payload.get_u8();
                counters.set_available(payload.len());
                byte
            }
            Source::Stream { io, buf } => {
                if buf.is_empty() {
                    fill(io.as_mut(), buf, abort, deadline).await?;
                }
                let byte = buf.get_u8();
                counters.set_available(buf.len());
                byte
            }
            Source::Closed => return Err(ReadFailure::Io(closed_error())),
        };
        counters.add_read(1);
        Ok(byte)
    }

    /// Write `data` to the stream and flush it.
    ///
    /// # Errors
    ///
    /// Fails for datagram connections, closed connections, aborted sessions
    /// and socket errors.
    pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let Self {
            source,
            counters,
            abort,
            ..
        } = self;
        match source {
            Source::Stream { io, .. } => {
                let write = async {
                    io.write_all(data).await?;
                    io.flush().await
                };
                select! {
                    biased;

                    () = abort.cancelled() => return Err(aborted_error()),
                    res = write => res?,
                }
                counters.add_written(data.len() as u64);
                Ok(())
            }
            Source::Datagram(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "datagram sessions reply with a new datagram",
            )),
            Source::Closed => Err(closed_error()),
        }
    }

    /// Send `data` to the peer: written to the stream for TCP, or as a new
    /// unicast datagram to the peer's address on `udp_port` for UDP.
    ///
    /// # Errors
    ///
    /// Propagates socket errors from the write or the datagram send.
    pub async fn transmit(&mut self, data: &[u8], udp_port: u16) -> io::Result<()> {
        match self.transport {
            Transport::Tcp => self.write_all(data).await,
            Transport::Udp => {
                let target = SocketAddr::new(self.peer.ip(), udp_port);
                debug!(
                    "sending datagram: target={target}, data={}",
                    crate::packet::hex(data)
                );
                send_datagram(target, data).await?;
                self.counters.add_written(data.len() as u64);
                Ok(())
            }
        }
    }

    /// Perform a TLS handshake over the stream before any byte is read.
    ///
    /// # Errors
    ///
    /// Fails if the connection is not a fresh stream or the handshake fails.
    #[cfg(feature = "tls")]
    pub async fn accept_tls(&mut self, acceptor: &tokio_rustls::TlsAcceptor) -> io::Result<()> {
        match std::mem::replace(&mut self.source, Source::Closed) {
            Source::Stream { io, buf } if buf.is_empty() => {
                let stream = select! {
                    biased;

                    () = self.abort.cancelled() => return Err(aborted_error()),
                    res = acceptor.accept(io) => res?,
                };
                self.source = Source::Stream {
                    io: Box::new(stream),
                    buf,
                };
                self.tls = true;
                Ok(())
            }
            other => {
                self.source = other;
                Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "TLS requires a fresh TCP stream",
                ))
            }
        }
    }

    /// Flush, shut down the write half and linger for the peer to finish
    /// before releasing the socket.
    ///
    /// Lingering drains inbound bytes until the peer closes or `linger`
    /// elapses. Aborted connections are released at once. Closing twice is a
    /// no-op.
    pub async fn close(&mut self, linger: Duration) {
        let Source::Stream { mut io, .. } = std::mem::replace(&mut self.source, Source::Closed)
        else {
            return;
        };
        if self.abort.is_cancelled() {
            return;
        }
        if let Err(e) = io.flush().await {
            debug!("flush on close failed: peer={}, error={e}", self.peer);
        }
        if let Err(e) = io.shutdown().await {
            debug!("shutdown on close failed: peer={}, error={e}", self.peer);
            return;
        }
        if linger.is_zero() {
            return;
        }
        select! {
            () = self.abort.cancelled() => {}
            _ = timeout(linger, drain(io.as_mut())) => {}
        }
    }
}

async fn fill(
    io: &mut dyn SessionIo,
    buf: &mut BytesMut,
    abort: &CancellationToken,
    deadline: Option<Instant>,
) -> Result<(), ReadFailure> {
    buf.reserve(READ_CHUNK);
    let read = async {
        let result = match deadline {
            Some(at) => match timeout_at(at, io.read_buf(buf)).await {
                Ok(result) => result,
                Err(_) => return Err(ReadFailure::TimedOut),
            },
            None => io.read_buf(buf).await,
        };
        result.map_err(ReadFailure::Io)
    };
    let n = select! {
        biased;

        () = abort.cancelled() => return Err(ReadFailure::Io(aborted_error())),
        res = read => res?,
    };
    if n == 0 {
        Err(ReadFailure::EndOfStream)
    } else {
        Ok(())
    }
}

async fn drain(io: &mut dyn SessionIo) {
    let mut scratch = [0_u8; 256];
    while let Ok(n) = io.read(&mut scratch).await {
        if n == 0 {
            break;
        }
    }
}

/// Send `data` as one datagram to `target` from a fresh ephemeral socket.
///
/// Delivery is best-effort; nothing is retried.
///
/// # Errors
///
/// Returns an [`io::Error`] if binding the ephemeral socket or sending fails.
pub async fn send_datagram(target: SocketAddr, data: &[u8]) -> io::Result<()> {
    let bind: SocketAddr = if target.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(bind).await?;
    socket.send_to(data, target).await?;
    Ok(())
}

fn closed_error() -> io::Error { io::Error::new(io::ErrorKind::NotConnected, "connection closed") }

fn aborted_error() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "connection closed by server")
}
