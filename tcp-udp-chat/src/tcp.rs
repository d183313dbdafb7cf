//! TCP transport: line-oriented responder and sender.
//!
//! Every message is one newline-terminated line and every reply is one line.
//! The responder accepts connections until stopped; each connection is served
//! on its own task so a slow client cannot stall the accept loop.
//!
//! Loss is simulated on the client path before the unit reaches the socket:
//! the outbound flight is rolled tick by tick, and a lost unit is resent once
//! after the retransmit delay.  The resend is never dropped, so every send
//! eventually delivers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::error::TransportError;
use crate::events::EventBus;
use crate::packet::{Direction, PacketDescriptor, PacketKind, Protocol, TransmissionUnit};
use crate::simulator::LossPolicy;
use crate::transport::{resolve, wildcard_for, MessageHandler, ReplyHandle, Responder, Transport};
use crate::wire::Reply;

pub struct TcpTransport {
    loss: LossPolicy,
    events: EventBus,
    retransmit_delay: Duration,
    responder: Option<Responder>,
}

impl TcpTransport {
    pub fn new(loss: LossPolicy, events: EventBus, retransmit_delay: Duration) -> Self {
        Self {
            loss,
            events,
            retransmit_delay,
            responder: None,
        }
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Tcp
    }

    async fn start_responder(
        &mut self,
        host: &str,
        port: u16,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<SocketAddr, TransportError> {
        self.stop_responder().await;

        let family = resolve(host, port).await?;
        let listener = TcpListener::bind(wildcard_for(family, port))
            .await
            .map_err(|source| TransportError::Bind { port, source })?;
        let local_addr = listener.local_addr()?;
        log::info!("[tcp] responder listening on {local_addr}");

        let events = self.events.clone();
        self.responder = Some(Responder::spawn(local_addr, events.clone(), move |cancel| {
            serve(listener, handler, cancel, events)
        }));
        Ok(local_addr)
    }

    fn send(&self, host: &str, port: u16, payload: &str) -> ReplyHandle {
        let unit = TransmissionUnit::outbound(payload);
        let host = host.to_owned();
        let loss = self.loss.clone();
        let events = self.events.clone();
        let delay = self.retransmit_delay;
        ReplyHandle::spawn(async move { exchange(host, port, unit, loss, events, delay).await })
    }

    async fn stop_responder(&mut self) {
        if let Some(responder) = self.responder.take() {
            log::info!("[tcp] stopping responder on {}", responder.local_addr);
            responder.stop().await;
        }
    }

    fn set_simulate_loss(&self, enabled: bool) {
        self.loss.set_enabled(enabled);
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.responder.as_ref().map(|r| r.local_addr)
    }
}

// ---------------------------------------------------------------------------
// Responder
// ---------------------------------------------------------------------------

async fn serve(
    listener: TcpListener,
    handler: Arc<dyn MessageHandler>,
    mut cancel: broadcast::Receiver<()>,
    events: EventBus,
) {
    // Dropped on exit, which aborts any connection still being served.
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    log::debug!("[tcp] accepted {peer}");
                    let handler = Arc::clone(&handler);
                    let events = events.clone();
                    connections.spawn(async move {
                        if let Err(e) = serve_connection(stream, handler, &events).await {
                            events.failure(format!("TCP connection from {peer} failed: {e}"));
                        }
                    });
                }
                Err(e) => {
                    events.failure(format!("TCP accept failed: {e}"));
                    break;
                }
            },
            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = finished {
                    log::warn!("[tcp] connection task ended abnormally: {e}");
                    if e.is_panic() {
                        events.failure("TCP message handler panicked");
                    }
                }
            }
            _ = cancel.recv() => break,
        }
    }
    log::debug!("[tcp] responder on {:?} stopped", listener.local_addr().ok());
}

async fn serve_connection(
    stream: TcpStream,
    handler: Arc<dyn MessageHandler>,
    events: &EventBus,
) -> Result<(), TransportError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        events.log(format!("Server Received: {line}"));
        let mut reply = handler.handle_message(&line);
        reply.push('\n');
        writer.write_all(reply.as_bytes()).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

async fn exchange(
    host: String,
    port: u16,
    mut unit: TransmissionUnit,
    loss: LossPolicy,
    events: EventBus,
    retransmit_delay: Duration,
) -> Result<Reply, TransportError> {
    if loss.tcp_flight_lost(false) {
        unit.mark_lost();
        events.packet(PacketDescriptor::new(
            Protocol::Tcp,
            PacketKind::Lost,
            Direction::ClientToServer,
        ));
        events.log("Network: TCP Packet Lost! Retransmitting...");
        log::debug!("[tcp] unit lost; retransmitting in {retransmit_delay:?}");

        tokio::time::sleep(retransmit_delay).await;
        unit.mark_retransmitted();
        events.log("Client: Retransmitting Packet...");
    }

    events.packet(PacketDescriptor::new(
        Protocol::Tcp,
        PacketKind::Data,
        unit.direction,
    ));
    let target = resolve(&host, port).await?;
    let reply = deliver(target, &unit.payload).await?;
    events.packet(PacketDescriptor::new(
        Protocol::Tcp,
        PacketKind::Response,
        Direction::ServerToClient,
    ));
    events.packet(PacketDescriptor::idle(Protocol::Tcp));
    events.unit(unit);
    Ok(Reply::Message(reply))
}

/// Write one line to `addr` and read one line back.
async fn deliver(addr: SocketAddr, payload: &str) -> Result<String, TransportError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| TransportError::Connect {
            addr: addr.to_string(),
            source,
        })?;
    let (reader, mut writer) = stream.into_split();

    let mut line = String::with_capacity(payload.len() + 1);
    line.push_str(payload);
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;

    let mut lines = BufReader::new(reader).lines();
    let reply = lines.next_line().await?.ok_or(TransportError::NoReply)?;
    // Closing our half ends the server's read loop for this connection.
    writer.shutdown().await?;
    Ok(reply)
}
