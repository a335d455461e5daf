//! Peer connectivity for the **bitc** SPV client (§4.3, §4.5): address
//! book, per-peer state machine, peer-group orchestration, the
//! readiness reactor, the CPU worker pool, and the optional SOCKS5
//! outbound tunnel.
//!
//! This crate owns all sockets and threads. [`bitc_core`] owns the
//! chain index, wire codec, and crypto primitives it operates on.

pub mod addrbook;
pub mod connection;
pub mod error;
pub mod group;
pub mod locator;
pub mod peer;
pub mod pool;
pub mod reactor;
pub mod socks5;

pub use error::{Error, Result};
