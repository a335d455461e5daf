//! Error types for the **bitc** network crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] bitc_core::Error),

    #[error("peer {addr} violated the protocol: {reason}")]
    ProtocolViolation { addr: String, reason: String },

    #[error("handshake with {addr} timed out")]
    HandshakeTimeout { addr: String },

    #[error("address book store corrupt: {0}")]
    AddrBookCorrupt(String),

    #[error("no candidate peer addresses available")]
    NoCandidates,

    #[error("SOCKS5 proxy dial failed: {0}")]
    Socks5(String),
}

pub type Result<T> = core::result::Result<T, Error>;
