//! Minimal JSON-RPC surface for the **bitc** SPV client (§6, §6b):
//! `status_snapshot`, `submit_tx`, and event subscriptions for
//! `chain_events`/`wallet_events`/`peer_events`. This crate has no
//! knowledge of the chain index, peer group or wallet internals; it
//! talks only to a [`handle::NodeHandle`] the composition root provides.

pub mod api;
pub mod error;
pub mod handle;
pub mod server;
pub mod types;

pub use api::EventChannels;
pub use handle::NodeHandle;
pub use types::{ChainEventPayload, PeerEventPayload, StatusSnapshot, WalletEventPayload};
