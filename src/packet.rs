//! The framed unit handed to packet handlers.

use std::{fmt, ops::Deref};

use bytes::Bytes;

/// One complete application packet.
///
/// Packets are immutable and cheap to clone; the frame reader produces them
/// and each is consumed once by the session's handler.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Packet(Bytes);

impl Packet {
    /// Wrap `bytes` as a packet.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self { Self(bytes.into()) }

    /// Borrow the packet bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &Bytes { &self.0 }

    /// Unwrap into the underlying buffer.
    #[must_use]
    pub fn into_bytes(self) -> Bytes { self.0 }

    /// Lossy UTF-8 rendering used in log output.
    #[must_use]
    pub fn to_text(&self) -> String { String::from_utf8_lossy(&self.0).into_owned() }
}

impl Deref for Packet {
    type Target = [u8];

    fn deref(&self) -> &Self::Target { &self.0 }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] { &self.0 }
}

impl From<Bytes> for Packet {
    fn from(value: Bytes) -> Self { Self(value) }
}

impl From<Vec<u8>> for Packet {
    fn from(value: Vec<u8>) -> Self { Self(Bytes::from(value)) }
}

impl From<&'static [u8]> for Packet {
    fn from(value: &'static [u8]) -> Self { Self(Bytes::from_static(value)) }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Packet").field(&hex(&self.0)).finish()
    }
}

/// Hex rendering of `bytes` for diagnostics.
#[must_use]
pub fn hex(bytes: &[u8]) -> String {
    use fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02X}");
        out
    })
}
