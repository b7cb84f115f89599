//! Drive a [`FrameReader`] over in-memory connections.
//!
//! ```rust
//! use sessionframe::FramingConfig;
//! use sessionframe_testing::frame_stream;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let framed = frame_stream(&FramingConfig::text(), b"ab\ncd\n", None).await;
//! assert_eq!(framed.packets.len(), 2);
//! assert!(framed.end.is_some_and(|e| e.is_end_of_stream()));
//! # }
//! ```

use std::net::{Ipv4Addr, SocketAddr};

use sessionframe::{
    Connection,
    FrameOutcome,
    FrameReader,
    FramingConfig,
    LengthProbe,
    Packet,
    SessionError,
};
use tokio::{
    io::{AsyncWriteExt, duplex},
    time::Instant,
};

/// Packets framed from one input and how framing stopped.
#[derive(Debug)]
pub struct Framed {
    /// Packets in arrival order.
    pub packets: Vec<Packet>,
    /// Error that ended framing; `None` when a datagram was consumed.
    pub end: Option<SessionError>,
    /// Reads that timed out and were discarded.
    pub discarded: usize,
}

fn peer() -> SocketAddr { SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 40_000) }

/// Frame `input` sent over a stream that the peer closes afterwards.
///
/// # Panics
///
/// Panics if the in-memory pipe rejects the input.
pub async fn frame_stream(
    config: &FramingConfig,
    input: &[u8],
    probe: Option<&mut dyn LengthProbe>,
) -> Framed {
    let (mut client, server) = duplex(input.len().max(64));
    client.write_all(input).await.expect("write input");
    drop(client);
    frame_all(config, Connection::from_stream(server, peer(), 0), probe).await
}

/// Frame one datagram carrying `input`.
pub async fn frame_datagram(
    config: &FramingConfig,
    input: &'static [u8],
    probe: Option<&mut dyn LengthProbe>,
) -> Framed {
    frame_all(config, Connection::datagram(input, peer(), 0), probe).await
}

async fn frame_all(
    config: &FramingConfig,
    mut conn: Connection,
    mut probe: Option<&mut dyn LengthProbe>,
) -> Framed {
    let reader = FrameReader::new(config, config.timeout_policy().session_deadline(Instant::now()));
    let mut framed = Framed {
        packets: Vec::new(),
        end: None,
        discarded: 0,
    };
    loop {
        match reader.read_packet(&mut conn, probe.as_deref_mut()).await {
            Ok(FrameOutcome::Packet(packet)) => framed.packets.push(packet),
            Ok(FrameOutcome::Discarded) => framed.discarded += 1,
            Ok(FrameOutcome::Exhausted) => return framed,
            Err(e) => {
                framed.end = Some(e);
                return framed;
            }
        }
    }
}
