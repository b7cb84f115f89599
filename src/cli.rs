//! Command line interface for the `sessionframe` echo server.
//!
//! Also compiled by the build script to render the man page, so it depends on
//! nothing but `clap`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::Parser;

/// Command line arguments for the `sessionframe` binary.
#[derive(Debug, Parser)]
#[command(
    name = "sessionframe",
    version,
    about = "Echo server built on the sessionframe session workers"
)]
pub struct Cli {
    /// Address to listen on.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Port to listen on.
    #[arg(short, long, default_value_t = 31000)]
    pub port: u16,

    /// Also accept UDP datagrams on the same port.
    #[arg(long)]
    pub udp: bool,

    /// Frame packets as raw binary instead of text lines.
    #[arg(long)]
    pub binary: bool,

    /// Maximum packet length in bytes.
    #[arg(long)]
    pub max_packet_length: Option<usize>,

    /// Seconds to wait for the first byte of a packet (0 disables).
    #[arg(long, default_value_t = 0)]
    pub idle_timeout: u64,

    /// Seconds allowed to finish a packet once it started (0 disables).
    #[arg(long, default_value_t = 0)]
    pub packet_timeout: u64,

    /// Seconds a whole session may last (0 disables).
    #[arg(long, default_value_t = 0)]
    pub session_timeout: u64,

    /// Keep the session open after a read timeout.
    #[arg(long)]
    pub keep_on_timeout: bool,

    /// Seconds to linger for the peer before closing.
    #[arg(long, default_value_t = 4)]
    pub linger: u64,

    /// Prompt written before every packet on TCP.
    #[arg(long, conflicts_with = "auto_prompt")]
    pub prompt: Option<String>,

    /// Write numbered prompts (`1> `, `2> `, ...).
    #[arg(long)]
    pub auto_prompt: bool,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Address the listeners bind to.
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr { SocketAddr::new(self.host, self.port) }
}
