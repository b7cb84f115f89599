#![doc(html_root_url = "https://docs.rs/sessionframe/latest")]
//! Public API for the `sessionframe` library.
//!
//! This crate provides a protocol-agnostic socket server: it accepts TCP
//! connections and UDP datagrams, frames the inbound bytes into text lines or
//! handler-sized binary packets, and hands each packet to a pluggable
//! [`PacketHandler`] whose responses are written back to the peer. Session
//! workers are pooled and reused across connections.

pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handler;
pub mod metrics;
pub mod observer;
pub mod packet;
pub mod panic;
pub mod server;
pub mod timeout;

pub use config::{FramingConfig, Prompt};
pub use connection::{Connection, SessionInfo, Transport, send_datagram};
pub use error::{BoxError, Result, SessionError};
pub use frame::{FrameOutcome, FrameReader, LengthProbe, PacketLength};
pub use handler::{HandlerBinding, PacketHandler};
pub use observer::{ListenerId, PacketObserver, PacketObservers};
pub use packet::Packet;
pub use server::{RunningServer, ServerError, SessionServer};
pub use timeout::{SessionDeadline, TimeoutPolicy};
