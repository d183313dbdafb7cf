//! UDP transport with server-side gap detection.
//!
//! Each datagram is self-contained.  The only state is on the server: a
//! [`SequenceTracker`] holding the next expected sequence number.  The tracker
//! is owned by the responder task, which handles one datagram at a time, so no
//! locking is needed and no update can be lost.
//!
//! | Arrival            | Reply                 | Tracker      |
//! |--------------------|-----------------------|--------------|
//! | `seq == expected`  | handler output        | `expected+1` |
//! | `seq > expected`   | `NACK:<expected>`     | unchanged    |
//! | `seq < expected`   | handler output        | unchanged    |
//! | no / bad `SEQ:`    | handler output        | unchanged    |
//! | dropped by policy  | none (sender times out)| unchanged   |
//!
//! Nothing is retried.  A datagram dropped by the loss simulator looks exactly
//! like a dead server to the sender.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::error::TransportError;
use crate::events::EventBus;
use crate::packet::{Direction, PacketDescriptor, PacketKind, Protocol, TransmissionUnit};
use crate::simulator::{FlightPosition, LossPolicy};
use crate::socket::Socket;
use crate::transport::{resolve, wildcard_for, MessageHandler, ReplyHandle, Responder, Transport};
use crate::wire::{encode_nack, encode_sequenced, Datagram, Reply};

// ---------------------------------------------------------------------------
// SequenceTracker
// ---------------------------------------------------------------------------

/// How the tracker classified an arriving sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The expected number; the tracker advanced.
    InOrder,
    /// Ahead of the expected number; carries the number still missing.
    Gap { expected: u64 },
    /// Behind the expected number (duplicate or late arrival).
    Late,
}

/// Server-owned expected-sequence counter.  Never decreases.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    expected: u64,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expected(&self) -> u64 {
        self.expected
    }

    pub fn admit(&mut self, seq: u64) -> Admission {
        if seq == self.expected {
            self.expected += 1;
            Admission::InOrder
        } else if seq > self.expected {
            Admission::Gap {
                expected: self.expected,
            }
        } else {
            Admission::Late
        }
    }

    /// Compute the reply for one raw datagram, invoking `handler` unless the
    /// datagram opens a gap.
    pub fn respond(&mut self, raw: &str, handler: &dyn MessageHandler) -> String {
        let datagram = Datagram::decode(raw);
        match datagram.seq.map(|seq| self.admit(seq)) {
            Some(Admission::Gap { expected }) => encode_nack(expected),
            Some(Admission::InOrder | Admission::Late) | None => {
                handler.handle_message(datagram.payload)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// UdpTransport
// ---------------------------------------------------------------------------

pub struct UdpTransport {
    loss: LossPolicy,
    events: EventBus,
    reply_timeout: Duration,
    /// Mirror of the responder's tracker, written only by the responder task.
    expected: Arc<AtomicU64>,
    responder: Option<Responder>,
}

impl UdpTransport {
    pub fn new(loss: LossPolicy, events: EventBus, reply_timeout: Duration) -> Self {
        Self {
            loss,
            events,
            reply_timeout,
            expected: Arc::new(AtomicU64::new(0)),
            responder: None,
        }
    }

    /// The responder's next expected sequence number.
    pub fn expected_sequence(&self) -> u64 {
        self.expected.load(Ordering::Acquire)
    }
}

#[async_trait::async_trait]
impl Transport for UdpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Udp
    }

    async fn start_responder(
        &mut self,
        host: &str,
        port: u16,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<SocketAddr, TransportError> {
        self.stop_responder().await;

        let family = resolve(host, port).await?;
        let socket = Socket::bind(wildcard_for(family, port)).await?;
        let local_addr = socket.local_addr;
        self.expected.store(0, Ordering::Release);
        log::info!("[udp] responder listening on {local_addr}");

        let loss = self.loss.clone();
        let events = self.events.clone();
        let expected = Arc::clone(&self.expected);
        self.responder = Some(Responder::spawn(local_addr, self.events.clone(), move |cancel| {
            serve(socket, handler, loss, events, expected, cancel)
        }));
        Ok(local_addr)
    }

    fn send(&self, host: &str, port: u16, payload: &str) -> ReplyHandle {
        let host = host.to_owned();
        let unit = TransmissionUnit::outbound(payload);
        let events = self.events.clone();
        let timeout = self.reply_timeout;
        ReplyHandle::spawn(exchange(host, port, unit, events, timeout))
    }

    async fn stop_responder(&mut self) {
        if let Some(responder) = self.responder.take() {
            log::info!("[udp] stopping responder on {}", responder.local_addr);
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

async fn serve(
    socket: Socket,
    handler: Arc<dyn MessageHandler>,
    loss: LossPolicy,
    events: EventBus,
    expected: Arc<AtomicU64>,
    mut cancel: broadcast::Receiver<()>,
) {
    let mut tracker = SequenceTracker::new();

    loop {
        let (raw, from) = tokio::select! {
            received = socket.recv_from() => match received {
                Ok(pair) => pair,
                Err(e) => {
                    events.failure(format!("UDP receive failed: {e}"));
                    break;
                }
            },
            _ = cancel.recv() => break,
        };

        if loss.should_drop(Protocol::Udp, FlightPosition::outbound(1.0)) {
            events.packet(PacketDescriptor::new(
                Protocol::Udp,
                PacketKind::Lost,
                Direction::ClientToServer,
            ));
            events.log("Network: UDP Packet Lost! (No Retransmission)");
            continue;
        }

        events.log(format!("Server Received: {raw}"));
        let reply = tracker.respond(&raw, handler.as_ref());
        expected.store(tracker.expected(), Ordering::Release);
        log::debug!(
            "[udp] ← {} bytes from {from}; expected now {}",
            raw.len(),
            tracker.expected()
        );

        if let Err(e) = socket.send_to(&reply, from).await {
            events.failure(format!("UDP reply to {from} failed: {e}"));
            break;
        }
    }
    log::debug!("[udp] responder on {} stopped", socket.local_addr);
}

async fn exchange(
    host: String,
    port: u16,
    unit: TransmissionUnit,
    events: EventBus,
    reply_timeout: Duration,
) -> Result<Reply, TransportError> {
    let target = resolve(&host, port).await?;

    let socket = Socket::ephemeral_for(target).await?;
    events.packet(PacketDescriptor::new(
        Protocol::Udp,
        PacketKind::Data,
        unit.direction,
    ));
    socket.send_to(&unit.payload, target).await?;
    events.unit(unit);

    let reply = match tokio::time::timeout(reply_timeout, socket.recv_from()).await {
        Ok(received) => {
            let (raw, _) = received?;
            events.packet(PacketDescriptor::new(
                Protocol::Udp,
                PacketKind::Response,
                Direction::ServerToClient,
            ));
            Reply::parse(&raw)
        }
        Err(_elapsed) => {
            log::debug!("[udp] no reply from {target} within {reply_timeout:?}");
            Reply::Timeout
        }
    };
    if let Reply::Nack(missing) = reply {
        events.log(format!("Network: Server sent NACK for SEQ {missing}"));
    }
    events.packet(PacketDescriptor::idle(Protocol::Udp));
    Ok(reply)
}

// ---------------------------------------------------------------------------
// UdpSession
// ---------------------------------------------------------------------------

/// Client side of the UDP chat: attaches a monotonically increasing sequence
/// number to every message.
pub struct UdpSession {
    transport: UdpTransport,
    next_seq: u64,
}

impl UdpSession {
    pub fn new(transport: UdpTransport) -> Self {
        Self {
            transport,
            next_seq: 0,
        }
    }

    /// Sequence number the next [`send_message`](Self::send_message) will use.
    pub fn next_sequence(&self) -> u64 {
        self.next_seq
    }

    /// Send `payload` with the next sequence number.
    pub fn send_message(&mut self, host: &str, port: u16, payload: &str) -> ReplyHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.send_with_seq(host, port, seq, payload)
    }

    /// Send `payload` with an explicit sequence number, leaving the counter
    /// alone.
    pub fn send_with_seq(&self, host: &str, port: u16, seq: u64, payload: &str) -> ReplyHandle {
        self.transport.send(host, port, &encode_sequenced(seq, payload))
    }

    pub fn reset_sequence(&mut self) {
        self.next_seq = 0;
    }

    pub fn transport(&self) -> &UdpTransport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut UdpTransport {
        &mut self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot(msg: &str) -> String {
        format!("Bot: I received '{msg}'")
    }

    #[test]
    fn in_order_arrivals_advance_tracker() {
        let mut tracker = SequenceTracker::new();
        for seq in 0..=4 {
            assert_eq!(tracker.admit(seq), Admission::InOrder);
        }
        assert_eq!(tracker.expected(), 5);
    }

    #[test]
    fn gap_is_reported_until_filled() {
        let mut tracker = SequenceTracker::new();
        tracker.admit(0);
        assert_eq!(tracker.admit(2), Admission::Gap { expected: 1 });
        assert_eq!(tracker.admit(3), Admission::Gap { expected: 1 });
        assert_eq!(tracker.expected(), 1);
        assert_eq!(tracker.admit(1), Admission::InOrder);
        assert_eq!(tracker.expected(), 2);
    }

    #[test]
    fn late_arrival_does_not_move_tracker() {
        let mut tracker = SequenceTracker::new();
        tracker.admit(0);
        tracker.admit(1);
        assert_eq!(tracker.admit(0), Admission::Late);
        assert_eq!(tracker.expected(), 2);
    }

    #[test]
    fn respond_nacks_gap_without_calling_handler() {
        let mut tracker = SequenceTracker::new();
        let panicking = |_: &str| -> String { panic!("handler must not run on a gap") };
        assert_eq!(tracker.respond("SEQ:3|x", &panicking), "NACK:0");
    }

    #[test]
    fn respond_forwards_payload_without_prefix() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.respond("SEQ:0|hi", &bot), "Bot: I received 'hi'");
        assert_eq!(tracker.respond("SEQ:0|again", &bot), "Bot: I received 'again'");
        assert_eq!(tracker.expected(), 1);
    }

    #[test]
    fn malformed_prefix_is_forwarded_whole() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(
            tracker.respond("SEQ:x|hi", &bot),
            "Bot: I received 'SEQ:x|hi'"
        );
        assert_eq!(tracker.respond("plain", &bot), "Bot: I received 'plain'");
        assert_eq!(tracker.expected(), 0);
    }
}
