//! One session: a bound connection driven through the packet loop.
//!
//! A session resolves its handler, greets TCP peers, then repeatedly prompts,
//! frames a packet, notifies observers and lets the handler respond until the
//! handler, the peer or a timeout ends it. Every session, however it ends
//! (a handler panic included), sends the handler's final packet, reports to
//! `session_terminated` and closes its connection.

use std::{any::Any, panic::AssertUnwindSafe};

use bytes::Bytes;
use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio::time::Instant;

use crate::{
    config::FramingConfig,
    connection::{ActiveSession, Connection},
    error::{Result, SessionError},
    frame::{FrameOutcome, FrameReader},
    handler::{HandlerBinding, SessionHandler},
    metrics::{self, Direction},
    observer::PacketObservers,
    packet::hex,
};

/// Settings shared read-only by every worker of one server.
pub(crate) struct SessionContext {
    pub framing: FramingConfig,
    pub handler: Option<HandlerBinding>,
    pub observers: PacketObservers,
    pub remote_port: Option<u16>,
    #[cfg(feature = "tls")]
    pub tls: Option<tokio_rustls::TlsAcceptor>,
}

/// Run a complete session over `conn` on behalf of worker `worker`.
pub(crate) async fn run_session(conn: Connection, ctx: &SessionContext, worker: usize) {
    let _active = ActiveSession::new();
    let mut session = Session {
        conn,
        ctx,
        handler: None,
        worker,
    };
    info!(
        "session started: worker={worker}, transport={}, peer={}, port={}",
        session.conn.transport(),
        session.conn.peer_addr(),
        session.conn.local_port()
    );
    let outcome = AssertUnwindSafe(session.drive()).catch_unwind().await;
    let result = outcome.unwrap_or_else(|panic| Err(session.panicked(panic)));
    session.finish(result).await;
}

struct Session<'a> {
    conn: Connection,
    ctx: &'a SessionContext,
    handler: Option<SessionHandler>,
    worker: usize,
}

impl Session<'_> {
    async fn drive(&mut self) -> Result<()> {
        self.open().await?;
        self.packet_loop().await
    }

    /// Turn a panic raised by the handler into a handler error so the
    /// session still finishes normally.
    fn panicked(&self, panic: Box<dyn Any + Send>) -> SessionError {
        let message = crate::panic::log_session_panic(panic, self.worker, self.conn.peer_addr());
        SessionError::Handler(format!("handler panicked: {message}").into())
    }

    /// Prepare the connection and handler, and greet TCP peers.
    async fn open(&mut self) -> Result<()> {
        #[cfg(feature = "tls")]
        if let Some(acceptor) = &self.ctx.tls
            && self.conn.is_tcp()
        {
            self.conn.accept_tls(acceptor).await?;
        }

        self.handler = self.ctx.handler.as_ref().map(HandlerBinding::resolve);
        let info = self.conn.info();
        let peer = self.conn.peer_addr().ip();
        let is_tcp = self.conn.is_tcp();
        let is_text = self.ctx.framing.is_text();
        let Some(handler) = self.handler.as_mut() else {
            return Ok(());
        };
        let greeting = handler.with(|h| {
            h.set_session_info(Some(info));
            h.session_started(peer, is_tcp, is_text);
            if is_tcp { h.initial_packet() } else { None }
        });
        if let Some(greeting) = greeting.filter(|b| !b.is_empty()) {
            self.conn.write_all(&greeting).await?;
        }
        Ok(())
    }

    async fn packet_loop(&mut self) -> Result<()> {
        let ctx = self.ctx;
        let framing = &ctx.framing;
        let session = framing.timeout_policy().session_deadline(Instant::now());
        let reader = FrameReader::new(framing, session);
        let mut index = 0;
        loop {
            if session.expired(Instant::now()) {
                return Err(SessionError::SessionTimeout(session.limit().unwrap_or_default()));
            }
            if self.conn.is_tcp()
                && let Some(prompt) = framing.prompt_for(index)
            {
                self.conn.write_all(&prompt).await?;
            }

            let packet = match reader.read_packet(&mut self.conn, self.handler.as_mut()).await? {
                FrameOutcome::Packet(packet) => packet,
                FrameOutcome::Discarded => continue,
                FrameOutcome::Exhausted => return Ok(()),
            };
            index += 1;
            metrics::inc_packets(Direction::Inbound);
            debug!(
                "packet received: worker={}, peer={}, len={}",
                self.worker,
                self.conn.peer_addr(),
                packet.len()
            );

            ctx.observers
                .notify(&self.conn.info(), &packet)
                .map_err(SessionError::Observer)?;

            if let Some(handler) = self.handler.as_mut() {
                let response = handler
                    .with(|h| h.handle_packet(&packet))
                    .map_err(SessionError::Handler)?;
                if let Some(response) = response.filter(|b| !b.is_empty()) {
                    self.transmit(&response).await?;
                    metrics::inc_packets(Direction::Outbound);
                }
                if self
                    .handler
                    .as_mut()
                    .is_some_and(|h| h.with(|h| h.terminate_session()))
                {
                    return Ok(());
                }
            }

            if self.conn.is_udp() {
                let remaining = self.conn.available();
                if remaining == 0 {
                    return Ok(());
                }
                debug!(
                    "datagram bytes remaining: peer={}, remaining={remaining}",
                    self.conn.peer_addr()
                );
            }
        }
    }

    /// Send `data` to the peer. UDP replies go to the handler's response
    /// port, then the server's remote port, then the peer's own port; a zero
    /// port falls through to the next choice.
    async fn transmit(&mut self, data: &Bytes) -> Result<()> {
        if self.conn.is_tcp() {
            self.conn.write_all(data).await?;
            return Ok(());
        }
        let port = self
            .handler
            .as_mut()
            .and_then(|h| h.with(|h| h.response_port()))
            .filter(|port| *port != 0)
            .or(self.ctx.remote_port)
            .unwrap_or_else(|| self.conn.peer_addr().port());
        if port == 0 {
            warn!(
                "unable to send datagram: unknown port, peer={}, data={}",
                self.conn.peer_addr(),
                hex(data)
            );
            return Ok(());
        }
        self.conn.transmit(data, port).await?;
        Ok(())
    }

    async fn finish(mut self, result: Result<()>) {
        if let Err(e) = &result {
            self.log_termination(e);
            metrics::inc_errors();
        }
        let had_error = result.is_err();
        let last = self
            .handler
            .as_mut()
            .and_then(|h| h.with(|h| h.final_packet(had_error)));
        if let Some(last) = last.filter(|b| !b.is_empty())
            && let Err(e) = self.transmit(&last).await
        {
            warn!(
                "final packet not sent: peer={}, error={e}",
                self.conn.peer_addr()
            );
        }
        let (read, written) = (self.conn.bytes_read(), self.conn.bytes_written());
        if let Some(handler) = self.handler.as_mut() {
            handler.with(|h| {
                h.session_terminated(result.as_ref().err(), read, written);
                h.set_session_info(None);
            });
        }
        self.conn.close(self.ctx.framing.linger_duration()).await;
        info!(
            "session ended: worker={}, peer={}, read={read}, written={written}",
            self.worker,
            self.conn.peer_addr()
        );
    }

    fn log_termination(&self, err: &SessionError) {
        let peer = self.conn.peer_addr();
        match err {
            SessionError::SessionTimeout(_) | SessionError::ReadTimeout { .. } => {
                warn!("session timed out: peer={peer}, error={err}");
            }
            SessionError::EndOfStream { .. } => info!("peer closed stream: peer={peer}, error={err}"),
            SessionError::Transport(_) if err.is_aborted() => {
                info!("connection closed: peer={peer}");
            }
            SessionError::Transport(_) | SessionError::Handler(_) | SessionError::Observer(_) => {
                error!("session failed: peer={peer}, error={err}");
            }
        }
    }
}
