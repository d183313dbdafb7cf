//! Engine configuration.
//!
//! The defaults are the fixed constants of the demonstration.  The binary
//! overrides them from command-line flags; tests shrink the delays.

use std::time::Duration;

use crate::packet::SERVER_PORT;

/// Tunable timing and addressing for a [`crate::engine::ChatEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Host the client side sends to.  Responders bind the wildcard address
    /// of the family this host resolves to.
    pub host: String,
    /// Port the responder listens on and the client sends to.
    pub port: u16,
    /// How long a UDP sender waits for a reply before yielding a timeout.
    pub reply_timeout: Duration,
    /// Pause between a simulated TCP loss and its retransmission.
    pub retransmit_delay: Duration,
    /// Simulated flight time of one handshake or teardown segment.
    pub hop_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: SERVER_PORT,
            reply_timeout: Duration::from_secs(5),
            retransmit_delay: Duration::from_millis(500),
            hop_delay: Duration::from_millis(150),
        }
    }
}

impl EngineConfig {
    /// Configuration with no simulated delays, for tests and scripted runs.
    pub fn instant(port: u16) -> Self {
        Self {
            port,
            retransmit_delay: Duration::ZERO,
            hop_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_demo_constants() {
        let c = EngineConfig::default();
        assert_eq!(c.port, 12345);
        assert_eq!(c.reply_timeout, Duration::from_secs(5));
        assert_eq!(c.retransmit_delay, Duration::from_millis(500));
    }

    #[test]
    fn instant_keeps_reply_timeout() {
        let c = EngineConfig::instant(0);
        assert_eq!(c.port, 0);
        assert_eq!(c.hop_delay, Duration::ZERO);
        assert_eq!(c.reply_timeout, Duration::from_secs(5));
    }
}
