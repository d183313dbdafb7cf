//! Observable engine events.
//!
//! The renderer subscribes to an [`EventBus`] and sees every packet
//! descriptor, every narration line ("Server: Received SYN...") and every
//! responder failure.  Sends never block on subscribers: with nobody
//! listening events are discarded, and a slow subscriber lags rather than
//! stalling the engine.

use tokio::sync::broadcast;

use crate::packet::{PacketDescriptor, TransmissionUnit};

/// Buffered events per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A state transition or unit, as the renderer should display it.
    Packet(PacketDescriptor),
    /// A narration line for the server/network log.
    Log(String),
    /// A transmission unit finished its send cycle.
    Unit(TransmissionUnit),
    /// A responder or sender task failed on I/O.
    Failure(String),
}

/// Cloneable fan-out of [`EngineEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn packet(&self, descriptor: PacketDescriptor) {
        log::trace!("[event] {} {}", descriptor.protocol, descriptor.label());
        self.emit(EngineEvent::Packet(descriptor));
    }

    pub fn log(&self, line: impl Into<String>) {
        let line = line.into();
        log::debug!("[event] {line}");
        self.emit(EngineEvent::Log(line));
    }

    pub fn unit(&self, unit: TransmissionUnit) {
        self.emit(EngineEvent::Unit(unit));
    }

    pub fn failure(&self, message: impl Into<String>) {
        let message = message.into();
        log::error!("[event] {message}");
        self.emit(EngineEvent::Failure(message));
    }

    fn emit(&self, event: EngineEvent) {
        // Err only means nobody is subscribed.
        let _ = self.tx.send(event);
    }
}
