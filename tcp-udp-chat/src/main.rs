//! Entry point for `tcp-udp-chat`.
//!
//! A console stand-in for the visualizer: starts a responder with the chat
//! bot, reads lines from stdin and prints replies, packet descriptors and the
//! server log.  All protocol work is delegated to the library; `main.rs` owns
//! only process setup (logging, argument parsing, the input loop).
//!
//! Input lines are sent as chat messages, except for these commands:
//! `/connect`, `/disconnect`, `/tcp`, `/udp`, `/loss on|off`, `/quit`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};

use tcp_udp_chat::{
    ChatEngine, EngineConfig, EngineEvent, LossPolicy, MessageHandler, Protocol, Reply,
};

/// Simulated TCP vs UDP chat.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Protocol to start with.
    #[arg(short, long, value_enum, default_value_t = ProtocolArg::Tcp)]
    protocol: ProtocolArg,
    /// Host the client sends to.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// Responder port.
    #[arg(long, default_value_t = 12345)]
    port: u16,
    /// Start with packet-loss simulation enabled.
    #[arg(long)]
    loss: bool,
    /// UDP reply timeout in milliseconds.
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
    /// Delay before a lost TCP unit is retransmitted, in milliseconds.
    #[arg(long, default_value_t = 500)]
    retransmit_ms: u64,
    /// Flight time of one handshake or teardown segment, in milliseconds.
    #[arg(long, default_value_t = 150)]
    hop_ms: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProtocolArg {
    Tcp,
    Udp,
}

impl From<ProtocolArg> for Protocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Tcp => Protocol::Tcp,
            ProtocolArg::Udp => Protocol::Udp,
        }
    }
}

impl Cli {
    fn config(&self) -> EngineConfig {
        EngineConfig {
            host: self.host.clone(),
            port: self.port,
            reply_timeout: Duration::from_millis(self.timeout_ms),
            retransmit_delay: Duration::from_millis(self.retransmit_ms),
            hop_delay: Duration::from_millis(self.hop_ms),
        }
    }
}

fn bot() -> Arc<dyn MessageHandler> {
    Arc::new(|msg: &str| format!("Bot: I received '{msg}'"))
}

/// Switch the engine to `protocol`, reporting a failed bind instead of
/// propagating it.  Returns whether a responder is now running.
async fn switch_to(engine: &mut ChatEngine, protocol: Protocol) -> bool {
    match engine.switch_protocol(protocol, bot()).await {
        Ok(addr) => {
            println!("--- Switched to {protocol} (listening on {addr}) ---");
            true
        }
        Err(e) => {
            eprintln!("[error] {e}");
            false
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let mut engine = ChatEngine::new(cli.config(), LossPolicy::new(cli.loss));

    let mut events = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(EngineEvent::Packet(d)) => println!("--- packet ---\n{d}"),
                Ok(EngineEvent::Log(line)) => println!("[log] {line}"),
                Ok(EngineEvent::Failure(message)) => eprintln!("[error] {message}"),
                Ok(EngineEvent::Unit(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("display fell behind by {n} events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let addr = engine.switch_protocol(cli.protocol.into(), bot()).await?;
    log::info!("Responder listening on {addr}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {}
            "/quit" => break,
            "/connect" => {
                if !engine.connect().await {
                    println!("(connect ignored in current state)");
                }
            }
            "/disconnect" => {
                if !engine.disconnect().await {
                    println!("(disconnect ignored in current state)");
                }
            }
            "/tcp" | "/udp" => {
                let protocol = if line == "/tcp" { Protocol::Tcp } else { Protocol::Udp };
                switch_to(&mut engine, protocol).await;
            }
            "/loss on" => engine.set_simulate_loss(true),
            "/loss off" => engine.set_simulate_loss(false),
            message => {
                let Some(handle) = engine.send(message) else {
                    println!("(not connected; type /connect first)");
                    continue;
                };
                println!("Me: {message}");
                handle.on_reply(|result| match result {
                    Ok(Reply::Nack(missing)) => println!(
                        "Server Notification: I have not received message with Sequence Number {missing}"
                    ),
                    Ok(reply) => println!("{reply}"),
                    Err(e) => eprintln!("[error] {e}"),
                });
            }
        }
    }

    engine.stop().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failed_switch_leaves_the_loop_usable() {
        let taken = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let mut engine = ChatEngine::new(EngineConfig::instant(port), LossPolicy::new(false));

        assert!(!switch_to(&mut engine, Protocol::Udp).await);
        assert!(engine.send("nobody home").is_none());

        drop(taken);
        assert!(switch_to(&mut engine, Protocol::Udp).await);
        assert!(engine.send("hello").is_some());
        engine.stop().await;
    }
}
