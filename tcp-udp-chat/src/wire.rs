//! Text wire encodings.
//!
//! UDP datagrams that carry a sequence number are `SEQ:<n>|<payload>`; a
//! server reply signalling a gap is `NACK:<n>`.  TCP messages are plain text,
//! one per line.  Pure data transformation, no I/O.

use std::fmt;

/// Prefix of a sequenced datagram.
pub const SEQ_PREFIX: &str = "SEQ:";
/// Prefix of a negative acknowledgement.
pub const NACK_PREFIX: &str = "NACK:";
/// Separator between the sequence number and the payload.
const SEQ_SEPARATOR: char = '|';
/// Rendered form of [`Reply::Timeout`].
pub const TIMEOUT_MESSAGE: &str = "Error: Server timeout";

/// Encode `payload` with sequence number `seq`.
pub fn encode_sequenced(seq: u64, payload: &str) -> String {
    format!("{SEQ_PREFIX}{seq}{SEQ_SEPARATOR}{payload}")
}

/// Encode a gap notification naming the next expected sequence number.
pub fn encode_nack(expected: u64) -> String {
    format!("{NACK_PREFIX}{expected}")
}

/// A received datagram, split into its optional sequence number and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram<'a> {
    pub seq: Option<u64>,
    pub payload: &'a str,
}

impl<'a> Datagram<'a> {
    /// Split `raw` into sequence number and payload.
    ///
    /// A missing separator or a non-numeric sequence number leaves the whole
    /// text as an unsequenced payload.
    pub fn decode(raw: &'a str) -> Self {
        let unsequenced = Datagram {
            seq: None,
            payload: raw,
        };

        let Some(rest) = raw.strip_prefix(SEQ_PREFIX) else {
            return unsequenced;
        };
        let Some((number, payload)) = rest.split_once(SEQ_SEPARATOR) else {
            return unsequenced;
        };
        match number.parse::<u64>() {
            Ok(seq) => Datagram {
                seq: Some(seq),
                payload,
            },
            Err(_) => unsequenced,
        }
    }
}

/// What a sender learns about one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// An ordinary reply produced by the server's message handler.
    Message(String),
    /// The server detected a gap; carries the sequence number it still needs.
    Nack(u64),
    /// No reply arrived within the timeout.
    Timeout,
}

impl Reply {
    /// Classify a raw reply line.  A `NACK:` whose number does not parse is
    /// kept as an ordinary message.
    pub fn parse(raw: &str) -> Self {
        raw.strip_prefix(NACK_PREFIX)
            .and_then(|n| n.trim().parse::<u64>().ok())
            .map(Reply::Nack)
            .unwrap_or_else(|| Reply::Message(raw.to_owned()))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Message(text) => f.write_str(text),
            Reply::Nack(expected) => write!(f, "{NACK_PREFIX}{expected}"),
            Reply::Timeout => f.write_str(TIMEOUT_MESSAGE),
        }
    }
}
