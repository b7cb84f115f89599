//! Errors raised by [`SessionServer`](super::SessionServer) operations.

use std::io;

use thiserror::Error;

/// Errors that may occur while binding or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or configuring a socket failed.
    #[error("bind error: {0}")]
    Bind(#[source] io::Error),
    /// Accepting a connection or receiving a datagram failed.
    #[error("accept error: {0}")]
    Accept(#[source] io::Error),
}

impl ServerError {
    /// The underlying I/O error.
    #[must_use]
    pub fn io_error(&self) -> &io::Error {
        match self {
            Self::Bind(e) | Self::Accept(e) => e,
        }
    }
}
