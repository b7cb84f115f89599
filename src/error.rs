//! Canonical error and result types for session processing.
//!
//! Every way a session can end abnormally is a [`SessionError`] variant. The
//! frame reader and the session worker return these as values; nothing
//! unwinds through the call stack.

use std::{io, time::Duration};

use bytes::Bytes;
use thiserror::Error;

/// Boxed error returned by packet handlers and observers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Reasons a session ended before the handler or peer finished it cleanly.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The whole-session deadline passed.
    #[error("session timeout after {0:?}")]
    SessionTimeout(Duration),
    /// The idle or packet deadline passed while waiting for a byte.
    ///
    /// `partial` holds whatever the frame reader had buffered.
    #[error("read timeout [@ {position}]")]
    ReadTimeout { position: usize, partial: Bytes },
    /// The peer closed its side of the stream, or a datagram ran dry.
    #[error("end of stream [@ {position}]")]
    EndOfStream { position: usize, partial: Bytes },
    /// The underlying socket failed or was closed during shutdown.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    /// The packet handler refused a packet.
    #[error("packet handler failed: {0}")]
    Handler(#[source] BoxError),
    /// A raw-packet observer failed, which ends the session.
    #[error("packet observer failed: {0}")]
    Observer(#[source] BoxError),
}

impl SessionError {
    /// Returns `true` for the idle/packet read timeout.
    #[must_use]
    pub fn is_read_timeout(&self) -> bool { matches!(self, Self::ReadTimeout { .. }) }

    /// Returns `true` when the peer ended the stream.
    #[must_use]
    pub fn is_end_of_stream(&self) -> bool { matches!(self, Self::EndOfStream { .. }) }

    /// Bytes buffered by the frame reader when the error was raised.
    #[must_use]
    pub fn partial(&self) -> Option<&Bytes> {
        match self {
            Self::ReadTimeout { partial, .. } | Self::EndOfStream { partial, .. } => Some(partial),
            _ => None,
        }
    }

    /// Returns `true` when the server closed the connection during shutdown.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Transport(e) if e.kind() == io::ErrorKind::ConnectionAborted)
    }
}

/// Result alias used by session-level operations.
pub type Result<T> = std::result::Result<T, SessionError>;
