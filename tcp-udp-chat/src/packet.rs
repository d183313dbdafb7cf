//! Packet descriptors and transmission units.
//!
//! Nothing here travels on the wire.  A [`PacketDescriptor`] is the header
//! summary shown to whoever renders the exchange: one descriptor per state
//! transition or per unit, never one per animation frame.  The sequence and
//! acknowledgement numbers are synthetic teaching values and the ports are the
//! symbolic labels [`SERVER_PORT`] and [`CLIENT_PORT`], not real socket ports.
//!
//! | Kind         | Dir | SEQ  | ACK  | Flags    |
//! |--------------|-----|------|------|----------|
//! | SYN          | C→S | 100  | 0    | SYN      |
//! | SYN-ACK      | S→C | 300  | 101  | SYN, ACK |
//! | ACK          | C→S | 101  | 301  | ACK      |
//! | FIN          | C→S | 500  | 0    | FIN      |
//! | ACK          | S→C | 700  | 501  | ACK      |
//! | FIN          | S→C | 701  | 501  | FIN      |
//! | ACK          | C→S | 502  | 702  | ACK      |
//! | Data         | C→S | 1000 | 500  | PSH, ACK |
//! | Response     | S→C | 500  | 1050 | PSH, ACK |

use std::fmt;

/// Symbolic server port shown in descriptors.
pub const SERVER_PORT: u16 = 12345;
/// Symbolic client port shown in descriptors.
pub const CLIENT_PORT: u16 = 54321;

/// Transport protocol being demonstrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("TCP"),
            Protocol::Udp => f.write_str("UDP"),
        }
    }
}

/// Which way a unit is travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

impl Direction {
    /// `(source, destination)` port labels for this direction.
    pub fn ports(self) -> (u16, u16) {
        match self {
            Direction::ClientToServer => (CLIENT_PORT, SERVER_PORT),
            Direction::ServerToClient => (SERVER_PORT, CLIENT_PORT),
        }
    }
}

/// Every kind of descriptor the engine produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Syn,
    SynAck,
    /// Third leg of the handshake.
    HandshakeAck,
    /// Client FIN opening the teardown.
    ClientFin,
    /// Server ACK of the client FIN.
    FinAck,
    ServerFin,
    /// Client ACK of the server FIN.
    FinalAck,
    Data,
    Response,
    Idle,
    Closed,
    /// The unit was dropped by the loss simulator.
    Lost,
}

impl PacketKind {
    /// Type label as displayed.
    pub fn label(self) -> &'static str {
        match self {
            PacketKind::Syn => "SYN",
            PacketKind::SynAck => "SYN-ACK",
            PacketKind::HandshakeAck | PacketKind::FinAck | PacketKind::FinalAck => "ACK",
            PacketKind::ClientFin | PacketKind::ServerFin => "FIN",
            PacketKind::Data => "Data",
            PacketKind::Response => "Response",
            PacketKind::Idle => "Idle",
            PacketKind::Closed => "Closed",
            PacketKind::Lost => "LOST",
        }
    }

    /// Synthetic `(seq, ack, flags)` shown for this kind.
    fn numbers(self) -> (&'static str, &'static str, &'static str) {
        match self {
            PacketKind::Syn => ("100", "0", "SYN"),
            PacketKind::SynAck => ("300", "101", "SYN, ACK"),
            PacketKind::HandshakeAck => ("101", "301", "ACK"),
            PacketKind::ClientFin => ("500", "0", "FIN"),
            PacketKind::FinAck => ("700", "501", "ACK"),
            PacketKind::ServerFin => ("701", "501", "FIN"),
            PacketKind::FinalAck => ("502", "702", "ACK"),
            PacketKind::Data => ("1000", "500", "PSH, ACK"),
            PacketKind::Response => ("500", "1050", "PSH, ACK"),
            PacketKind::Idle | PacketKind::Closed => ("-", "-", "-"),
            PacketKind::Lost => ("N/A", "N/A", "None"),
        }
    }
}

/// Header summary for one transition or unit, surfaced to the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketDescriptor {
    pub protocol: Protocol,
    pub kind: PacketKind,
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: &'static str,
    pub ack: &'static str,
    pub flags: &'static str,
}

impl PacketDescriptor {
    /// Build the descriptor for `kind` travelling in `direction`.
    pub fn new(protocol: Protocol, kind: PacketKind, direction: Direction) -> Self {
        let (src_port, dst_port) = direction.ports();
        let (seq, ack, flags) = kind.numbers();
        Self {
            protocol,
            kind,
            src_port,
            dst_port,
            seq,
            ack,
            flags,
        }
    }

    /// Descriptor for a state with nothing in flight.
    pub fn idle(protocol: Protocol) -> Self {
        Self::new(protocol, PacketKind::Idle, Direction::ClientToServer)
    }

    pub fn label(&self) -> &'static str {
        self.kind.label()
    }
}

fn port_name(port: u16) -> &'static str {
    if port == SERVER_PORT {
        "Server"
    } else {
        "Client"
    }
}

impl fmt::Display for PacketDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Protocol: {}", self.protocol)?;
        writeln!(f, "Type: {}", self.label())?;
        writeln!(f, "Source Port: {} ({})", self.src_port, port_name(self.src_port))?;
        writeln!(f, "Dest Port: {} ({})", self.dst_port, port_name(self.dst_port))?;
        writeln!(f, "SEQ: {}", self.seq)?;
        writeln!(f, "ACK: {}", self.ack)?;
        write!(f, "Flags: {}", self.flags)
    }
}

/// One logical application message in flight for a single send/response
/// cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmissionUnit {
    pub payload: String,
    pub direction: Direction,
    /// The loss simulator dropped this unit at least once.
    pub lost: bool,
    /// The unit was resent after a loss.
    pub retransmitted: bool,
}

impl TransmissionUnit {
    pub fn outbound(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            direction: Direction::ClientToServer,
            lost: false,
            retransmitted: false,
        }
    }

    /// Record a drop; the next send of this unit is the retransmission.
    pub fn mark_lost(&mut self) {
        self.lost = true;
    }

    pub fn mark_retransmitted(&mut self) {
        self.retransmitted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_to_client_swaps_ports() {
        let d = PacketDescriptor::new(Protocol::Tcp, PacketKind::SynAck, Direction::ServerToClient);
        assert_eq!(d.src_port, SERVER_PORT);
        assert_eq!(d.dst_port, CLIENT_PORT);
        assert_eq!((d.seq, d.ack, d.flags), ("300", "101", "SYN, ACK"));
    }

    #[test]
    fn every_ack_kind_shares_the_label() {
        for kind in [PacketKind::HandshakeAck, PacketKind::FinAck, PacketKind::FinalAck] {
            assert_eq!(kind.label(), "ACK");
        }
    }

    #[test]
    fn display_renders_inspection_block() {
        let d = PacketDescriptor::new(Protocol::Udp, PacketKind::Data, Direction::ClientToServer);
        let text = d.to_string();
        assert!(text.starts_with("Protocol: UDP\nType: Data\n"));
        assert!(text.contains("Source Port: 54321 (Client)"));
        assert!(text.contains("Dest Port: 12345 (Server)"));
        assert!(text.ends_with("Flags: PSH, ACK"));
    }

    #[test]
    fn unit_starts_clean() {
        let mut unit = TransmissionUnit::outbound("hi");
        assert!(!unit.lost && !unit.retransmitted);
        unit.mark_lost();
        unit.mark_retransmitted();
        assert!(unit.lost && unit.retransmitted);
        assert_eq!(unit.payload, "hi");
    }
}
