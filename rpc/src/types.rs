//! Wire DTOs for the RPC surface (§6, §6b). These mirror
//! [`bitc_core::events`]'s event enums but stay serde-friendly and
//! independent of the core crate's internal representation.

use serde::{Deserialize, Serialize};

/// A consistent read of the node's state, taken on the reactor thread
/// (§6 "status_snapshot").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub best_height: u32,
    pub peer_count: usize,
    pub balance_sat: u64,
    pub sync_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ChainEventPayload {
    NewBestTip { hash: String, height: u32 },
    Reorg { disconnected: Vec<String>, connected: Vec<String> },
    Orphan { hash: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum WalletEventPayload {
    BalanceChanged { new_balance_sat: u64 },
    NewObservation { txid: String },
    ConfirmationDepthChanged { txid: String, depth: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PeerEventPayload {
    Connected { addr: String },
    Disconnected { addr: String },
    Banned { addr: String },
}

fn hex_hash(hash: &[u8; 32]) -> String {
    hex::encode(hash)
}

impl From<&bitc_core::events::ChainEvent> for ChainEventPayload {
    fn from(event: &bitc_core::events::ChainEvent) -> Self {
        use bitc_core::events::ChainEvent;
        match event {
            ChainEvent::NewBestTip { hash, height } => ChainEventPayload::NewBestTip { hash: hex_hash(hash), height: *height },
            ChainEvent::Reorg { disconnected, connected } => ChainEventPayload::Reorg {
                disconnected: disconnected.iter().map(hex_hash).collect(),
                connected: connected.iter().map(hex_hash).collect(),
            },
            ChainEvent::Orphan { hash } => ChainEventPayload::Orphan { hash: hex_hash(hash) },
        }
    }
}

impl From<&bitc_core::events::WalletEvent> for WalletEventPayload {
    fn from(event: &bitc_core::events::WalletEvent) -> Self {
        use bitc_core::events::WalletEvent;
        match event {
            WalletEvent::BalanceChanged { new_balance_sat } => WalletEventPayload::BalanceChanged { new_balance_sat: *new_balance_sat },
            WalletEvent::NewObservation { txid } => WalletEventPayload::NewObservation { txid: hex_hash(txid) },
            WalletEvent::ConfirmationDepthChanged { txid, depth } => {
                WalletEventPayload::ConfirmationDepthChanged { txid: hex_hash(txid), depth: *depth }
            }
        }
    }
}

impl From<&bitc_core::events::PeerEvent> for PeerEventPayload {
    fn from(event: &bitc_core::events::PeerEvent) -> Self {
        use bitc_core::events::PeerEvent;
        match event {
            PeerEvent::Connected { addr } => PeerEventPayload::Connected { addr: addr.clone() },
            PeerEvent::Disconnected { addr } => PeerEventPayload::Disconnected { addr: addr.clone() },
            PeerEvent::Banned { addr } => PeerEventPayload::Banned { addr: addr.clone() },
        }
    }
}
