//! Core types shared across the **bitc** SPV client: crypto primitives,
//! the Bitcoin p2p wire codec, the block-header chain engine, the
//! partial-Merkle-tree and Bloom-filter primitives, and the event
//! types delivered to the wallet/RPC/CLI collaborators.
//!
//! This crate has no I/O beyond the header store and config file; it
//! owns no sockets and no threads.

pub mod bloom;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod wire;

pub use error::{Error, Result};
