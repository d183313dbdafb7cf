//! Integration tests for protocol switching through [`ChatEngine`].

use std::sync::Arc;
use std::time::Duration;

use tcp_udp_chat::{
    ChatEngine, ConnectionState, EngineConfig, EngineEvent, LossPolicy, MessageHandler,
    PacketKind, Protocol, Reply,
};

fn bot() -> Arc<dyn MessageHandler> {
    Arc::new(|msg: &str| format!("Bot: I received '{msg}'"))
}

/// Whether this host can bind the IPv6 loopback at all.
fn ipv6_loopback_available() -> bool {
    std::net::UdpSocket::bind("[::1]:0").is_ok()
}

/// A port that was free a moment ago, for tests that must rebind it.
fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn udp_is_send_ready_without_handshake() {
    let mut engine = ChatEngine::new(EngineConfig::instant(0), LossPolicy::new(false));
    engine.switch_protocol(Protocol::Udp, bot()).await.unwrap();

    assert!(engine.can_send());
    assert!(!engine.connect().await, "UDP has no handshake");
    assert_eq!(engine.connection_state(), None);

    let first = engine.send("hi").unwrap().recv().await.unwrap();
    assert_eq!(first, Reply::Message("Bot: I received 'hi'".into()));
    assert_eq!(engine.expected_sequence(), Some(1));
}

#[tokio::test]
async fn switching_rebinds_the_same_port() {
    let port = free_port();
    let mut engine = ChatEngine::new(EngineConfig::instant(port), LossPolicy::new(false));

    let tcp = engine.switch_protocol(Protocol::Tcp, bot()).await.unwrap();
    assert_eq!(tcp.port(), port);
    assert!(engine.connect().await);

    let udp = engine.switch_protocol(Protocol::Udp, bot()).await.unwrap();
    assert_eq!(udp.port(), port);
    assert_eq!(engine.protocol(), Some(Protocol::Udp));

    // Back to TCP: the earlier listener must be gone for this to bind.
    engine.switch_protocol(Protocol::Tcp, bot()).await.unwrap();
    assert_eq!(engine.connection_state(), Some(ConnectionState::Closed));
    assert!(engine.send("not yet").is_none());

    assert!(engine.connect().await);
    let reply = tokio::time::timeout(Duration::from_secs(5), engine.send("back").unwrap().recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply, Reply::Message("Bot: I received 'back'".into()));
    engine.stop().await;
}

#[tokio::test]
async fn switch_resets_udp_sequence() {
    let mut engine = ChatEngine::new(EngineConfig::instant(0), LossPolicy::new(false));
    engine.switch_protocol(Protocol::Udp, bot()).await.unwrap();
    engine.send("a").unwrap().recv().await.unwrap();
    engine.send("b").unwrap().recv().await.unwrap();
    assert_eq!(engine.expected_sequence(), Some(2));

    engine.switch_protocol(Protocol::Udp, bot()).await.unwrap();
    assert_eq!(engine.expected_sequence(), Some(0));
    // The fresh client starts at 0 again, so no NACK.
    let reply = engine.send("c").unwrap().recv().await.unwrap();
    assert_eq!(reply, Reply::Message("Bot: I received 'c'".into()));
}

#[tokio::test]
async fn switch_announces_idle_descriptor() {
    let mut engine = ChatEngine::new(EngineConfig::instant(0), LossPolicy::new(false));
    let mut rx = engine.subscribe();
    engine.switch_protocol(Protocol::Udp, bot()).await.unwrap();

    let mut saw_idle = false;
    while let Ok(event) = rx.try_recv() {
        if let EngineEvent::Packet(d) = event {
            saw_idle |= d.kind == PacketKind::Idle && d.protocol == Protocol::Udp;
        }
    }
    assert!(saw_idle);
}

#[tokio::test]
async fn bind_failure_is_reported() {
    let taken = std::net::UdpSocket::bind("0.0.0.0:0").unwrap();
    let port = taken.local_addr().unwrap().port();
    let mut engine = ChatEngine::new(EngineConfig::instant(port), LossPolicy::new(false));

    let result = engine.switch_protocol(Protocol::Udp, bot()).await;
    assert!(result.is_err(), "binding an occupied port must fail");
    assert_eq!(engine.protocol(), None);
    assert!(engine.send("nobody").is_none());
}

#[tokio::test]
async fn loss_toggle_is_shared() {
    let loss = LossPolicy::new(false);
    let engine = ChatEngine::new(EngineConfig::instant(0), loss.clone());
    engine.set_simulate_loss(true);
    assert!(loss.is_enabled());
    assert!(engine.simulate_loss());
    engine.set_simulate_loss(false);
    assert!(!loss.is_enabled());
}

#[tokio::test]
async fn ipv6_host_reaches_both_responders() {
    if !ipv6_loopback_available() {
        eprintln!("skipping: no IPv6 loopback");
        return;
    }
    let config = EngineConfig {
        host: "::1".into(),
        ..EngineConfig::instant(0)
    };
    let mut engine = ChatEngine::new(config, LossPolicy::new(false));

    let udp = engine.switch_protocol(Protocol::Udp, bot()).await.unwrap();
    assert!(udp.is_ipv6(), "bound {udp}");
    let reply = engine.send("hi").unwrap().recv().await.unwrap();
    assert_eq!(reply, Reply::Message("Bot: I received 'hi'".into()));

    let tcp = engine.switch_protocol(Protocol::Tcp, bot()).await.unwrap();
    assert!(tcp.is_ipv6(), "bound {tcp}");
    assert!(engine.connect().await);
    let reply = tokio::time::timeout(Duration::from_secs(5), engine.send("there").unwrap().recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply, Reply::Message("Bot: I received 'there'".into()));
    engine.stop().await;
}
