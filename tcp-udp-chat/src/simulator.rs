//! Packet-loss simulator shared by both transports.
//!
//! The policy holds one piece of mutable state, the enabled flag, which the
//! front end toggles while responders and senders read it.  Clones share the
//! flag and the RNG, so a single [`LossPolicy`] handed to both transports is
//! the whole configuration.
//!
//! | Protocol | Rule                                                       |
//! |----------|------------------------------------------------------------|
//! | TCP      | 2% per flight tick, second half of the outbound leg only,  |
//! |          | never on a retransmission.                                 |
//! | UDP      | 50% per datagram, regardless of position; no retry.        |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::packet::Protocol;

/// Chance that a TCP unit is lost on any single tick of its outbound flight.
pub const TCP_DROP_PER_TICK: f64 = 0.02;
/// Chance that the UDP responder drops a received datagram.
pub const UDP_DROP: f64 = 0.5;
/// Number of ticks in one outbound flight.
pub const FLIGHT_TICKS: u32 = 60;

/// Which leg of a round trip a unit is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    Outbound,
    Return,
}

/// Where a unit is in its flight when the policy is consulted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightPosition {
    pub leg: Leg,
    /// Fraction of the leg covered, `0.0..=1.0`.
    pub progress: f64,
    pub retransmission: bool,
}

impl FlightPosition {
    pub fn outbound(progress: f64) -> Self {
        Self {
            leg: Leg::Outbound,
            progress,
            retransmission: false,
        }
    }

    pub fn returning(progress: f64) -> Self {
        Self {
            leg: Leg::Return,
            progress,
            retransmission: false,
        }
    }

    fn droppable_for_tcp(&self) -> bool {
        self.leg == Leg::Outbound && self.progress > 0.5 && !self.retransmission
    }
}

/// Probabilistic loss decision, shared by both transports.
#[derive(Debug, Clone)]
pub struct LossPolicy {
    enabled: Arc<AtomicBool>,
    rng: Arc<Mutex<StdRng>>,
}

impl Default for LossPolicy {
    fn default() -> Self {
        Self::new(false)
    }
}

impl LossPolicy {
    pub fn new(enabled: bool) -> Self {
        Self::with_rng(enabled, StdRng::from_os_rng())
    }

    /// A policy whose drop decisions are reproducible for a given seed.
    pub fn seeded(enabled: bool, seed: u64) -> Self {
        Self::with_rng(enabled, StdRng::seed_from_u64(seed))
    }

    fn with_rng(enabled: bool, rng: StdRng) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Decide whether the unit at `position` is lost.
    pub fn should_drop(&self, protocol: Protocol, position: FlightPosition) -> bool {
        if !self.is_enabled() {
            return false;
        }
        match protocol {
            Protocol::Tcp if position.droppable_for_tcp() => self.roll(TCP_DROP_PER_TICK),
            Protocol::Tcp => false,
            Protocol::Udp => self.roll(UDP_DROP),
        }
    }

    /// Roll every tick of one TCP outbound flight; `true` if any tick drops
    /// the unit.
    pub fn tcp_flight_lost(&self, retransmission: bool) -> bool {
        (1..=FLIGHT_TICKS).any(|tick| {
            let position = FlightPosition {
                leg: Leg::Outbound,
                progress: f64::from(tick) / f64::from(FLIGHT_TICKS),
                retransmission,
            };
            self.should_drop(Protocol::Tcp, position)
        })
    }

    fn roll(&self, probability: f64) -> bool {
        // A poisoned RNG is still a usable RNG.
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.random_bool(probability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_policy_never_drops() {
        let policy = LossPolicy::seeded(false, 1);
        for _ in 0..1_000 {
            assert!(!policy.should_drop(Protocol::Udp, FlightPosition::outbound(0.9)));
            assert!(!policy.tcp_flight_lost(false));
        }
    }

    #[test]
    fn tcp_never_drops_first_half_or_return_leg() {
        let policy = LossPolicy::seeded(true, 2);
        for _ in 0..1_000 {
            assert!(!policy.should_drop(Protocol::Tcp, FlightPosition::outbound(0.5)));
            assert!(!policy.should_drop(Protocol::Tcp, FlightPosition::returning(0.9)));
        }
    }

    #[test]
    fn tcp_never_drops_retransmissions() {
        let policy = LossPolicy::seeded(true, 3);
        for _ in 0..200 {
            assert!(!policy.tcp_flight_lost(true));
        }
    }

    #[test]
    fn udp_drops_about_half() {
        let policy = LossPolicy::seeded(true, 4);
        let drops = (0..2_000)
            .filter(|_| policy.should_drop(Protocol::Udp, FlightPosition::returning(0.0)))
            .count();
        assert!((800..1_200).contains(&drops), "dropped {drops} of 2000");
    }

    #[test]
    fn tcp_flights_are_lost_sometimes_but_not_always() {
        // 30 droppable ticks at 2% each loses roughly 45% of flights.
        let policy = LossPolicy::seeded(true, 5);
        let lost = (0..1_000).filter(|_| policy.tcp_flight_lost(false)).count();
        assert!((250..650).contains(&lost), "lost {lost} of 1000");
    }

    #[test]
    fn clones_share_the_flag() {
        let policy = LossPolicy::new(false);
        let other = policy.clone();
        other.set_enabled(true);
        assert!(policy.is_enabled());
    }
}
