//! Echo server demonstrating `sessionframe` usage.
//!
//! Every packet received is written back to the peer until Ctrl+C.

mod cli;

use std::{process::ExitCode, time::Duration};

use bytes::{BufMut, Bytes, BytesMut};
use clap::Parser;
use log::{error, info};
use sessionframe::{
    BoxError,
    FramingConfig,
    Packet,
    PacketHandler,
    TimeoutPolicy,
    server::{ServerError, SessionServer},
};

/// Writes each packet back, newline-terminated in text mode.
struct Echo {
    text: bool,
}

impl PacketHandler for Echo {
    fn session_started(&mut self, peer: std::net::IpAddr, is_tcp: bool, is_text: bool) {
        self.text = is_text;
        info!("echo session: peer={peer}, tcp={is_tcp}");
    }

    fn handle_packet(&mut self, packet: &Packet) -> Result<Option<Bytes>, BoxError> {
        let mut reply = BytesMut::with_capacity(packet.len() + 1);
        reply.put_slice(packet);
        if self.text {
            reply.put_u8(b'\n');
        }
        Ok(Some(reply.freeze()))
    }
}

fn framing(cli: &cli::Cli) -> FramingConfig {
    let secs = Duration::from_secs;
    let mut framing = if cli.binary {
        FramingConfig::binary()
    } else {
        FramingConfig::text()
    }
    .timeouts(
        TimeoutPolicy::none()
            .idle(secs(cli.idle_timeout))
            .packet(secs(cli.packet_timeout))
            .session(secs(cli.session_timeout)),
    )
    .terminate_on_timeout(!cli.keep_on_timeout)
    .linger(secs(cli.linger))
    .auto_prompt(cli.auto_prompt);
    if let Some(max) = cli.max_packet_length {
        framing = framing.with_max_packet_length(max);
    }
    if let Some(prompt) = &cli.prompt {
        framing = framing.prompt(prompt.clone());
    }
    framing
}

#[cfg(feature = "metrics")]
fn install_metrics(cli: &cli::Cli) -> Result<(), BoxError> {
    if let Some(addr) = cli.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!("serving metrics: addr={addr}");
    }
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(cli: &cli::Cli) -> Result<(), BoxError> {
    if cli.metrics_addr.is_some() {
        return Err("built without the `metrics` feature".into());
    }
    Ok(())
}

async fn serve(cli: cli::Cli) -> Result<(), ServerError> {
    let addr = cli.listen_addr();
    let mut server = SessionServer::with_framing(framing(&cli))
        .packet_handler_factory(|| Echo { text: true })
        .bind(addr)?;
    if cli.udp {
        server = server.bind_udp(addr)?;
    }
    info!("echo server listening: addr={addr}, udp={}", cli.udp);
    server.run().await
}

#[tokio::main]
async fn main() -> ExitCode {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    if let Err(e) = install_metrics(&cli) {
        error!("metrics exporter failed: error={e}");
        return ExitCode::FAILURE;
    }
    match serve(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("server failed: error={e}");
            ExitCode::FAILURE
        }
    }
}
