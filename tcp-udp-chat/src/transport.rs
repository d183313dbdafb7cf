//! Uniform contract implemented once per protocol.
//!
//! A [`Transport`] can run one responder (the "server") and any number of
//! concurrent sends (the "client").  Each send runs on its own task and
//! resolves its [`ReplyHandle`] exactly once, so the caller never blocks on
//! network I/O.
//!
//! ```ignore
//! let mut transport = UdpTransport::new(loss, events, Duration::from_secs(5));
//! let addr = transport.start_responder("127.0.0.1", 0, Arc::new(|msg: &str| msg.to_uppercase())).await?;
//! let reply = transport.send("127.0.0.1", addr.port(), "SEQ:0|hi").recv().await?;
//! transport.stop_responder().await;
//! ```

use std::future::Future;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::lookup_host;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::error::TransportError;
use crate::events::EventBus;
use crate::packet::Protocol;
use crate::wire::Reply;

/// Server-side application logic: turns one received payload into a reply.
///
/// This is the only place chat "bot" behavior lives; transports stay
/// protocol-only.  Any `Fn(&str) -> String` closure qualifies.
pub trait MessageHandler: Send + Sync {
    fn handle_message(&self, payload: &str) -> String;
}

impl<F> MessageHandler for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn handle_message(&self, payload: &str) -> String {
        self(payload)
    }
}

/// Start/stop a responder and send messages over one protocol.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Bind `port` (0 picks an ephemeral port) on the wildcard address of
    /// `host`'s family and serve `handler` until stopped.  A running
    /// responder is stopped first.
    async fn start_responder(
        &mut self,
        host: &str,
        port: u16,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<SocketAddr, TransportError>;

    /// Send `payload` to `host:port` on a background task.
    fn send(&self, host: &str, port: u16, payload: &str) -> ReplyHandle;

    /// Stop the responder and wait until its socket is released.  Safe to
    /// call when nothing is running.
    async fn stop_responder(&mut self);

    fn set_simulate_loss(&self, enabled: bool);

    /// Address of the running responder, if any.
    fn local_addr(&self) -> Option<SocketAddr>;
}

/// First address `host:port` resolves to.  Senders and responders both use
/// it, so they always agree on the address family.
pub(crate) async fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransportError> {
    lookup_host((host, port))
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| TransportError::Resolve(format!("{host}:{port}")))
}

/// The unspecified address of `peer`'s family on `port`.
pub(crate) fn wildcard_for(peer: SocketAddr, port: u16) -> SocketAddr {
    if peer.is_ipv4() {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
    } else {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, port))
    }
}

/// The eventual result of one send.
#[derive(Debug)]
pub struct ReplyHandle {
    rx: oneshot::Receiver<Result<Reply, TransportError>>,
}

impl ReplyHandle {
    /// Run `exchange` on its own task and hand back its result.
    pub(crate) fn spawn<F>(exchange: F) -> Self
    where
        F: Future<Output = Result<Reply, TransportError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            // The caller may have dropped the handle; the result is then unused.
            let _ = tx.send(exchange.await);
        });
        Self { rx }
    }

    /// Wait for the reply.
    pub async fn recv(self) -> Result<Reply, TransportError> {
        self.rx.await.unwrap_or(Err(TransportError::Dropped))
    }

    /// Invoke `callback` with the result once it arrives, without waiting.
    pub fn on_reply<F>(self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<Reply, TransportError>) + Send + 'static,
    {
        tokio::spawn(async move { callback(self.recv().await) })
    }
}

/// A running responder task and the means to stop it.
#[derive(Debug)]
pub(crate) struct Responder {
    pub local_addr: SocketAddr,
    cancel: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl Responder {
    /// Spawn `serve`, which must return once the cancel receiver fires.
    ///
    /// If `serve` panics the responder is gone for good; that is reported on
    /// `events` as a failure.
    pub fn spawn<F, Fut>(local_addr: SocketAddr, events: EventBus, serve: F) -> Self
    where
        F: FnOnce(broadcast::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (cancel, cancel_rx) = broadcast::channel(1);
        let inner = tokio::spawn(serve(cancel_rx));
        let task = tokio::spawn(async move {
            if let Err(err) = inner.await {
                if err.is_panic() {
                    log::error!("[responder] {local_addr} panicked");
                    events.failure(format!("Responder on {local_addr} stopped: handler panicked"));
                }
            }
        });
        Self {
            local_addr,
            cancel,
            task,
        }
    }

    /// Signal the task and wait for it, so the socket is closed on return.
    pub async fn stop(self) {
        if self.cancel.send(()).is_err() {
            // Receiver gone: the task already exited on its own.
            log::debug!("[responder] {} already finished", self.local_addr);
        }
        if let Err(err) = self.task.await {
            log::warn!("[responder] {} ended abnormally: {err}", self.local_addr);
        }
    }
}
