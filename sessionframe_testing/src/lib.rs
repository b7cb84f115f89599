//! Test support for `sessionframe` servers.
//!
//! Provides scriptable packet handlers that journal every callback, frame
//! readers driven over in-memory connections, log capture, and small socket
//! helpers for integration tests.
//!
//! ```rust
//! use sessionframe::{Packet, PacketHandler};
//! use sessionframe_testing::{RecordingHandler, Reply};
//!
//! let mut handler = RecordingHandler::new(Reply::Reverse).newline();
//! let reply = handler
//!     .handle_packet(&Packet::from(&b"abc"[..]))
//!     .expect("reply");
//! assert_eq!(reply.as_deref(), Some(&b"cba\n"[..]));
//! assert_eq!(handler.journal().packets.len(), 1);
//! ```

pub mod drive;
pub mod handlers;
pub mod integration_helpers;
pub mod logging;

pub use drive::{Framed, frame_datagram, frame_stream};
pub use handlers::{Journal, RecordingHandler, Reply, Termination};
pub use integration_helpers::{TestResult, unused_listener, unused_socket, wait_for};
pub use logging::{LoggerHandle, logger};
