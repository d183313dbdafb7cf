//! Protocol-switching facade used by the front end.
//!
//! [`ChatEngine`] holds one active session at a time.  Switching protocols
//! always stops the old responder (and waits for its socket to close) before
//! the new one binds, so responders never leak across switches.
//!
//! ```ignore
//! let mut engine = ChatEngine::new(EngineConfig::default(), LossPolicy::new(false));
//! engine.switch_protocol(Protocol::Tcp, Arc::new(|m: &str| format!("Bot: I received '{m}'"))).await?;
//! engine.connect().await;
//! let reply = engine.send("hello").unwrap().recv().await?;
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::EngineConfig;
use crate::connection::TcpConnection;
use crate::error::TransportError;
use crate::events::{EngineEvent, EventBus};
use crate::packet::{PacketDescriptor, Protocol};
use crate::simulator::LossPolicy;
use crate::state::ConnectionState;
use crate::tcp::TcpTransport;
use crate::transport::{MessageHandler, ReplyHandle, Transport};
use crate::udp::{UdpSession, UdpTransport};

enum Session {
    Tcp(TcpConnection),
    Udp(UdpSession),
}

impl Session {
    fn transport(&self) -> &dyn Transport {
        match self {
            Session::Tcp(conn) => conn.transport(),
            Session::Udp(session) => session.transport(),
        }
    }

    fn transport_mut(&mut self) -> &mut dyn Transport {
        match self {
            Session::Tcp(conn) => conn.transport_mut(),
            Session::Udp(session) => session.transport_mut(),
        }
    }
}

pub struct ChatEngine {
    config: EngineConfig,
    loss: LossPolicy,
    events: EventBus,
    session: Option<Session>,
    /// Port the active responder actually bound (differs from the configured
    /// port when that is 0).
    target_port: u16,
}

impl ChatEngine {
    pub fn new(config: EngineConfig, loss: LossPolicy) -> Self {
        let target_port = config.port;
        Self {
            config,
            loss,
            events: EventBus::new(),
            session: None,
            target_port,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn protocol(&self) -> Option<Protocol> {
        self.session.as_ref().map(|s| s.transport().protocol())
    }

    /// TCP connection state, `None` when no TCP session is active.
    pub fn connection_state(&self) -> Option<ConnectionState> {
        match &self.session {
            Some(Session::Tcp(conn)) => Some(conn.state()),
            _ => None,
        }
    }

    /// Whether [`send`](Self::send) would accept a message right now.
    pub fn can_send(&self) -> bool {
        match &self.session {
            Some(Session::Tcp(conn)) => conn.is_established(),
            Some(Session::Udp(_)) => true,
            None => false,
        }
    }

    /// Address of the active responder.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.session.as_ref().and_then(|s| s.transport().local_addr())
    }

    /// The UDP responder's next expected sequence number.
    pub fn expected_sequence(&self) -> Option<u64> {
        match &self.session {
            Some(Session::Udp(session)) => Some(session.transport().expected_sequence()),
            _ => None,
        }
    }

    /// Stop the current session and start a responder for `protocol`.
    pub async fn switch_protocol(
        &mut self,
        protocol: Protocol,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<SocketAddr, TransportError> {
        self.stop().await;
        log::info!("[engine] switching to {protocol}");
        self.events.log(format!("Switching to {protocol}..."));

        let mut session = match protocol {
            Protocol::Tcp => {
                let transport = TcpTransport::new(
                    self.loss.clone(),
                    self.events.clone(),
                    self.config.retransmit_delay,
                );
                Session::Tcp(TcpConnection::new(
                    transport,
                    self.events.clone(),
                    self.config.hop_delay,
                ))
            }
            Protocol::Udp => {
                let transport = UdpTransport::new(
                    self.loss.clone(),
                    self.events.clone(),
                    self.config.reply_timeout,
                );
                Session::Udp(UdpSession::new(transport))
            }
        };
        self.events.packet(PacketDescriptor::idle(protocol));

        let addr = session
            .transport_mut()
            .start_responder(&self.config.host, self.config.port, handler)
            .await?;
        self.target_port = addr.port();
        self.session = Some(session);
        Ok(addr)
    }

    /// Run the TCP handshake.  `false` for UDP or when not `Closed`.
    pub async fn connect(&mut self) -> bool {
        match &mut self.session {
            Some(Session::Tcp(conn)) => conn.connect().await,
            _ => false,
        }
    }

    /// Run the TCP teardown.  `false` for UDP or when not `Established`.
    pub async fn disconnect(&mut self) -> bool {
        match &mut self.session {
            Some(Session::Tcp(conn)) => conn.disconnect().await,
            _ => false,
        }
    }

    /// Send one chat message.  `None` when no session accepts messages.
    pub fn send(&mut self, payload: &str) -> Option<ReplyHandle> {
        let host = self.config.host.as_str();
        let port = self.target_port;
        match &mut self.session {
            Some(Session::Tcp(conn)) => conn.send_application_message(host, port, payload),
            Some(Session::Udp(session)) => Some(session.send_message(host, port, payload)),
            None => None,
        }
    }

    pub fn set_simulate_loss(&self, enabled: bool) {
        log::info!("[engine] loss simulation {}", if enabled { "on" } else { "off" });
        self.loss.set_enabled(enabled);
    }

    pub fn simulate_loss(&self) -> bool {
        self.loss.is_enabled()
    }

    /// Stop the active responder and drop the session.  Idempotent.
    pub async fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Session::Tcp(conn) = &mut session {
                conn.reset();
            }
            session.transport_mut().stop_responder().await;
        }
    }
}
