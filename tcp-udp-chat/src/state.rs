//! Connection finite-state machine (FSM) types.
//!
//! The simulated TCP connection walks a fixed path through the handshake and
//! the teardown.  Every state except `Closed` and `Established` has exactly
//! one segment in flight; the state names which one.
//!
//! ```text
//!  Closed ──Connect──▶ SynSent ──SYN arrives──▶ SynAckSent
//!    ▲                                              │ SYN-ACK arrives
//!    │                                              ▼
//!    │                 Established ◀──ACK arrives── AckSent
//!    │                      │ Teardown
//!    │                      ▼
//!    │                   FinSent ──FIN arrives──▶ FinAckSent
//!    │                                              │ ACK arrives
//!    │ ACK arrives                                  ▼
//!  FinalAckSent ◀────────FIN arrives──────── ServerFinSent
//! ```
//!
//! Transitions are a pure function of `(state, event)`.  Any pair not listed
//! above is ignored, which is how out-of-order calls from the front end become
//! no-ops instead of corrupting the connection.

use crate::packet::{Direction, PacketKind};

/// All possible states of the connection FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection exists; initial and final state.
    #[default]
    Closed,
    /// Client SYN is travelling to the server.
    SynSent,
    /// Server SYN-ACK is travelling to the client.
    SynAckSent,
    /// Client ACK completing the handshake is travelling to the server.
    AckSent,
    /// Handshake complete; application messages may be exchanged.
    Established,
    /// Client FIN is travelling to the server.
    FinSent,
    /// Server ACK of the client FIN is travelling to the client.
    FinAckSent,
    /// Server FIN is travelling to the client.
    ServerFinSent,
    /// Client ACK of the server FIN is travelling to the server.
    FinalAckSent,
}

/// Inputs that can move the FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Local request to open the connection.
    Connect,
    /// Local request to close the connection.
    Teardown,
    /// The in-flight SYN reached the server.
    SynArrived,
    /// The in-flight SYN-ACK reached the client.
    SynAckArrived,
    /// An in-flight ACK reached its peer.
    AckArrived,
    /// An in-flight FIN reached its peer.
    FinArrived,
}

impl ConnectionState {
    /// Apply `event`, returning the next state or `None` if the event is not
    /// legal here.
    pub fn on(self, event: Event) -> Option<Self> {
        use ConnectionState::*;
        use Event::*;

        match (self, event) {
            (Closed, Connect) => Some(SynSent),
            (SynSent, SynArrived) => Some(SynAckSent),
            (SynAckSent, SynAckArrived) => Some(AckSent),
            (AckSent, AckArrived) => Some(Established),
            (Established, Teardown) => Some(FinSent),
            (FinSent, FinArrived) => Some(FinAckSent),
            (FinAckSent, AckArrived) => Some(ServerFinSent),
            (ServerFinSent, FinArrived) => Some(FinalAckSent),
            (FinalAckSent, AckArrived) => Some(Closed),
            (
                Closed | SynSent | SynAckSent | AckSent | Established | FinSent | FinAckSent
                | ServerFinSent | FinalAckSent,
                Connect | Teardown | SynArrived | SynAckArrived | AckArrived | FinArrived,
            ) => None,
        }
    }

    /// Step number used by the visualizer (0 = idle, 1..=3 handshake,
    /// 4 = established, 5..=8 teardown).
    pub fn step(self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::SynSent => 1,
            Self::SynAckSent => 2,
            Self::AckSent => 3,
            Self::Established => 4,
            Self::FinSent => 5,
            Self::FinAckSent => 6,
            Self::ServerFinSent => 7,
            Self::FinalAckSent => 8,
        }
    }

    /// The segment in flight while in this state, with its direction.
    ///
    /// `Closed` and `Established` have nothing in flight.
    pub fn in_flight(self) -> Option<(PacketKind, Direction)> {
        match self {
            Self::Closed | Self::Established => None,
            Self::SynSent => Some((PacketKind::Syn, Direction::ClientToServer)),
            Self::SynAckSent => Some((PacketKind::SynAck, Direction::ServerToClient)),
            Self::AckSent => Some((PacketKind::HandshakeAck, Direction::ClientToServer)),
            Self::FinSent => Some((PacketKind::ClientFin, Direction::ClientToServer)),
            Self::FinAckSent => Some((PacketKind::FinAck, Direction::ServerToClient)),
            Self::ServerFinSent => Some((PacketKind::ServerFin, Direction::ServerToClient)),
            Self::FinalAckSent => Some((PacketKind::FinalAck, Direction::ClientToServer)),
        }
    }

    /// The arrival event that completes the flight of the in-flight segment.
    pub fn arrival(self) -> Option<Event> {
        match self {
            Self::Closed | Self::Established => None,
            Self::SynSent => Some(Event::SynArrived),
            Self::SynAckSent => Some(Event::SynAckArrived),
            Self::AckSent | Self::FinAckSent | Self::FinalAckSent => Some(Event::AckArrived),
            Self::FinSent | Self::ServerFinSent => Some(Event::FinArrived),
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_EVENTS: [Event; 6] = [
        Event::Connect,
        Event::Teardown,
        Event::SynArrived,
        Event::SynAckArrived,
        Event::AckArrived,
        Event::FinArrived,
    ];

    /// Follow arrivals from `state` until the flight chain ends.
    fn settle(mut state: ConnectionState, steps: &mut Vec<u8>) -> ConnectionState {
        while let Some(event) = state.arrival() {
            state = state.on(event).unwrap();
            steps.push(state.step());
        }
        state
    }

    #[test]
    fn handshake_walks_steps_one_to_four() {
        let mut state = ConnectionState::Closed.on(Event::Connect).unwrap();
        let mut steps = vec![state.step()];
        state = settle(state, &mut steps);
        assert_eq!(steps, vec![1, 2, 3, 4]);
        assert_eq!(state, ConnectionState::Established);
    }

    #[test]
    fn teardown_walks_steps_five_to_zero() {
        let mut state = ConnectionState::Established.on(Event::Teardown).unwrap();
        let mut steps = vec![state.step()];
        state = settle(state, &mut steps);
        assert_eq!(steps, vec![5, 6, 7, 8, 0]);
        assert_eq!(state, ConnectionState::Closed);
    }

    #[test]
    fn teardown_is_ignored_before_established() {
        for state in [
            ConnectionState::Closed,
            ConnectionState::SynSent,
            ConnectionState::SynAckSent,
            ConnectionState::AckSent,
        ] {
            assert_eq!(state.on(Event::Teardown), None, "teardown from {state}");
        }
    }

    #[test]
    fn connect_only_from_closed() {
        assert_eq!(
            ConnectionState::Closed.on(Event::Connect),
            Some(ConnectionState::SynSent)
        );
        assert_eq!(ConnectionState::Established.on(Event::Connect), None);
        assert_eq!(ConnectionState::FinSent.on(Event::Connect), None);
    }

    #[test]
    fn every_state_has_at_most_one_legal_event() {
        // A single legal event per state means no two sequences can overlap.
        let states = [
            ConnectionState::Closed,
            ConnectionState::SynSent,
            ConnectionState::SynAckSent,
            ConnectionState::AckSent,
            ConnectionState::Established,
            ConnectionState::FinSent,
            ConnectionState::FinAckSent,
            ConnectionState::ServerFinSent,
            ConnectionState::FinalAckSent,
        ];
        for state in states {
            let legal = ALL_EVENTS.iter().filter(|e| state.on(**e).is_some()).count();
            assert_eq!(legal, 1, "{state} accepts {legal} events");
        }
    }

    #[test]
    fn only_transitional_states_have_segments_in_flight() {
        assert_eq!(ConnectionState::Closed.in_flight(), None);
        assert_eq!(ConnectionState::Established.in_flight(), None);
        assert_eq!(
            ConnectionState::SynAckSent.in_flight(),
            Some((PacketKind::SynAck, Direction::ServerToClient))
        );
    }
}
