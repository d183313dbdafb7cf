//! Per-connection lifecycle manager for the simulated TCP session.
//!
//! A [`TcpConnection`] owns the FSM state and the [`TcpTransport`] used for
//! application messages.  Its responsibilities are:
//! - Driving the handshake and teardown through [`crate::state`].
//! - Emitting exactly one packet descriptor and one narration line per
//!   transition.
//! - Refusing application messages outside `Established`.
//!
//! Every operation that is illegal in the current state is a no-op and
//! reports `false` (or `None`).  `&mut self` on every transition means only
//! one handshake or teardown can be in progress at a time.

use std::time::Duration;

use crate::events::EventBus;
use crate::packet::{Direction, PacketDescriptor, PacketKind, Protocol};
use crate::state::{ConnectionState, Event};
use crate::tcp::TcpTransport;
use crate::transport::{ReplyHandle, Transport};

pub struct TcpConnection {
    state: ConnectionState,
    transport: TcpTransport,
    events: EventBus,
    /// Simulated flight time of one handshake or teardown segment.
    hop_delay: Duration,
}

impl TcpConnection {
    /// Create a new connection in the [`ConnectionState::Closed`] state.
    pub fn new(transport: TcpTransport, events: EventBus, hop_delay: Duration) -> Self {
        Self {
            state: ConnectionState::Closed,
            transport,
            events,
            hop_delay,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_established(&self) -> bool {
        self.state == ConnectionState::Established
    }

    pub fn transport(&self) -> &TcpTransport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut TcpTransport {
        &mut self.transport
    }

    // -----------------------------------------------------------------------
    // Single transitions
    // -----------------------------------------------------------------------

    /// Client sends SYN.  Only legal from `Closed`.
    pub fn initiate_connect(&mut self) -> bool {
        self.apply(Event::Connect)
    }

    /// SYN reached the server, which answers with SYN-ACK.
    pub fn on_syn_arrival(&mut self) -> bool {
        self.apply(Event::SynArrived)
    }

    /// SYN-ACK reached the client, which answers with ACK.
    pub fn on_syn_ack_arrival(&mut self) -> bool {
        self.apply(Event::SynAckArrived)
    }

    /// An ACK reached its peer: completes the handshake, prompts the server
    /// FIN, or closes the connection, depending on the state.
    pub fn on_ack_arrival(&mut self) -> bool {
        self.apply(Event::AckArrived)
    }

    /// Client sends FIN.  Only legal from `Established`.
    pub fn initiate_teardown(&mut self) -> bool {
        self.apply(Event::Teardown)
    }

    /// A FIN reached its peer, which acknowledges it.
    pub fn on_fin_arrival(&mut self) -> bool {
        self.apply(Event::FinArrived)
    }

    // -----------------------------------------------------------------------
    // Full sequences
    // -----------------------------------------------------------------------

    /// Run the three-way handshake to `Established`.
    ///
    /// Returns `false` without doing anything unless the connection is
    /// `Closed`.
    pub async fn connect(&mut self) -> bool {
        if !self.initiate_connect() {
            return false;
        }
        self.complete_flights().await;
        true
    }

    /// Run the four-way teardown back to `Closed`.
    ///
    /// Returns `false` without doing anything unless the connection is
    /// `Established`.
    pub async fn disconnect(&mut self) -> bool {
        if !self.initiate_teardown() {
            return false;
        }
        self.complete_flights().await;
        true
    }

    /// Let every in-flight segment arrive until the FSM settles.
    async fn complete_flights(&mut self) {
        while let Some(arrival) = self.state.arrival() {
            if !self.hop_delay.is_zero() {
                tokio::time::sleep(self.hop_delay).await;
            }
            self.apply(arrival);
        }
    }

    // -----------------------------------------------------------------------
    // Data
    // -----------------------------------------------------------------------

    /// Send one application message to `host:port`.
    ///
    /// `None` unless the connection is `Established`.
    pub fn send_application_message(
        &self,
        host: &str,
        port: u16,
        payload: &str,
    ) -> Option<ReplyHandle> {
        if !self.is_established() {
            log::debug!("[conn] dropping send in {}", self.state);
            return None;
        }
        Some(self.transport.send(host, port, payload))
    }

    /// Forget any connection progress, e.g. on protocol switch.
    pub fn reset(&mut self) {
        self.state = ConnectionState::Closed;
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn apply(&mut self, event: Event) -> bool {
        let Some(next) = self.state.on(event) else {
            log::debug!("[conn] ignoring {event:?} in {}", self.state);
            return false;
        };
        log::debug!(
            "[conn] {} → {} on {event:?} (step {})",
            self.state,
            next,
            next.step()
        );
        self.state = next;
        self.events.log(narration(next));
        self.events.packet(descriptor_for(next));
        true
    }
}

/// The descriptor shown on entering `state`.
fn descriptor_for(state: ConnectionState) -> PacketDescriptor {
    match state.in_flight() {
        Some((kind, direction)) => PacketDescriptor::new(Protocol::Tcp, kind, direction),
        None if state == ConnectionState::Closed => {
            PacketDescriptor::new(Protocol::Tcp, PacketKind::Closed, Direction::ClientToServer)
        }
        None => PacketDescriptor::idle(Protocol::Tcp),
    }
}

fn narration(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::SynSent => "Client: Initiating 3-Way Handshake (SYN)...",
        ConnectionState::SynAckSent => "Server: Received SYN. Sending SYN-ACK...",
        ConnectionState::AckSent => "Client: Received SYN-ACK. Sending ACK...",
        ConnectionState::Established => "Server: Received ACK. Connection Established.",
        ConnectionState::FinSent => "Client: Initiating Teardown (FIN)...",
        ConnectionState::FinAckSent => "Server: Received FIN. Sending ACK...",
        ConnectionState::ServerFinSent => "Client: Received ACK. Server sending FIN...",
        ConnectionState::FinalAckSent => "Client: Received FIN. Sending ACK...",
        ConnectionState::Closed => "Server: Received ACK. Connection Closed.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EngineEvent;
    use crate::simulator::LossPolicy;

    fn connection() -> (TcpConnection, EventBus) {
        let events = EventBus::new();
        let transport = TcpTransport::new(LossPolicy::new(false), events.clone(), Duration::ZERO);
        (
            TcpConnection::new(transport, events.clone(), Duration::ZERO),
            events,
        )
    }

    fn packet_labels(rx: &mut tokio::sync::broadcast::Receiver<EngineEvent>) -> Vec<&'static str> {
        let mut labels = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let EngineEvent::Packet(d) = event {
                labels.push(d.label());
            }
        }
        labels
    }

    #[test]
    fn manual_handshake_emits_one_descriptor_per_step() {
        let (mut conn, events) = connection();
        let mut rx = events.subscribe();

        assert!(conn.initiate_connect());
        assert!(conn.on_syn_arrival());
        assert!(conn.on_syn_ack_arrival());
        assert!(conn.on_ack_arrival());

        assert!(conn.is_established());
        assert_eq!(packet_labels(&mut rx), vec!["SYN", "SYN-ACK", "ACK", "Idle"]);
    }

    #[test]
    fn out_of_order_arrivals_are_ignored() {
        let (mut conn, _events) = connection();
        assert!(!conn.on_ack_arrival());
        assert!(!conn.on_fin_arrival());
        assert!(conn.initiate_connect());
        assert!(!conn.on_syn_ack_arrival());
        assert!(!conn.initiate_connect());
        assert_eq!(conn.state(), ConnectionState::SynSent);
    }

    #[test]
    fn teardown_before_established_is_noop() {
        let (mut conn, events) = connection();
        let mut rx = events.subscribe();
        assert!(!conn.initiate_teardown());
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(packet_labels(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn full_teardown_ends_closed() {
        let (mut conn, events) = connection();
        assert!(conn.connect().await);
        let mut rx = events.subscribe();
        assert!(conn.disconnect().await);
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(
            packet_labels(&mut rx),
            vec!["FIN", "ACK", "FIN", "ACK", "Closed"]
        );
    }

    #[test]
    fn send_refused_unless_established() {
        let (conn, _events) = connection();
        assert!(conn.send_application_message("127.0.0.1", 1, "hi").is_none());
    }
}
