//! `tcp-udp-chat`: a simulated chat exchange contrasting TCP and UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────────────────────────────────────┐
//!  │                 ChatEngine                   │
//!  │   (protocol switch, loss toggle, events)     │
//!  └──────┬───────────────────────────┬───────────┘
//!         │                           │
//!  ┌──────▼────────┐           ┌──────▼────────┐
//!  │ TcpConnection │           │  UdpSession   │
//!  │ (FSM, gating) │           │ (client seq)  │
//!  └──────┬────────┘           └──────┬────────┘
//!         │       Transport trait     │
//!  ┌──────▼────────┐           ┌──────▼────────┐
//!  │ TcpTransport  │           │ UdpTransport  │
//!  │ lines + retry │           │ SEQ / NACK    │
//!  └──────┬────────┘           └──────┬────────┘
//!         └──────────┬────────────────┘
//!              ┌─────▼──────┐
//!              │ LossPolicy │
//!              └────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]      packet descriptors and transmission units
//! - [`wire`]        `SEQ:` / `NACK:` text encodings and [`wire::Reply`]
//! - [`state`]       TCP finite-state-machine types
//! - [`simulator`]   shared packet-loss policy
//! - [`events`]      observable stream of descriptors and log lines
//! - [`config`]      timing and addressing
//! - [`error`]       transport error type
//! - [`transport`]   the per-protocol contract and reply handles
//! - [`socket`]      async UDP socket abstraction
//! - [`tcp`]         TCP responder and sender
//! - [`connection`]  TCP handshake / teardown driver
//! - [`udp`]         UDP responder with gap detection, client sequencing
//! - [`engine`]      protocol-switching facade

pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod events;
pub mod packet;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod tcp;
pub mod transport;
pub mod udp;
pub mod wire;

pub use config::EngineConfig;
pub use engine::ChatEngine;
pub use error::TransportError;
pub use events::{EngineEvent, EventBus};
pub use packet::{PacketDescriptor, PacketKind, Protocol};
pub use simulator::LossPolicy;
pub use state::ConnectionState;
pub use transport::{MessageHandler, ReplyHandle, Transport};
pub use wire::Reply;
