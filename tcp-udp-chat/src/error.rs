//! Errors raised by transports.
//!
//! Only real I/O problems are errors.  Out-of-state calls are ignored,
//! timeouts are a [`crate::wire::Reply`] variant and simulated loss is a
//! normal outcome.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind responder on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("failed to reach {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("could not resolve {0}")]
    Resolve(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("server closed the connection without replying")]
    NoReply,
    #[error("sender task ended before delivering a reply")]
    Dropped,
}
