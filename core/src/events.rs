//! Notification primitives delivered to collaborators outside the core:
//! the terminal UI, the RPC surface, and the CLI's one-shot `status`
//! command (§6, §9 "global state" design note — no singletons, every
//! consumer subscribes explicitly).

use crate::crypto::hash::Hash256;

/// Emitted by the chain index on tip advancement, reorg, and orphan
/// buffering (§4.1 step 7-8, §8 scenario 2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    /// The best-chain tip advanced without a reorg.
    NewBestTip { hash: Hash256, height: u32 },
    /// The best chain was replaced. `disconnected` and `connected` list
    /// the hashes leaving and entering the best chain, root-to-tip.
    Reorg { disconnected: Vec<Hash256>, connected: Vec<Hash256> },
    /// A header was buffered because its parent is unknown.
    Orphan { hash: Hash256 },
}

/// Emitted by the wallet on balance-affecting events (§4.4, §8 scenario 4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    BalanceChanged { new_balance_sat: u64 },
    NewObservation { txid: Hash256 },
    ConfirmationDepthChanged { txid: Hash256, depth: u32 },
}

/// Emitted by the peer group on connection lifecycle (§4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Connected { addr: String },
    Disconnected { addr: String },
    Banned { addr: String },
}

/// A minimal fan-out subscriber registry. The reactor thread is the only
/// caller of [`EventBus::publish`], so callbacks run synchronously and
/// in registration order; they must not block.
pub struct EventBus<T> {
    subscribers: Vec<Box<dyn Fn(&T) + Send>>,
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        EventBus { subscribers: Vec::new() }
    }
}

impl<T> EventBus<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F: Fn(&T) + Send + 'static>(&mut self, callback: F) {
        self.subscribers.push(Box::new(callback));
    }

    pub fn publish(&self, event: T) {
        for subscriber in &self.subscribers {
            subscriber(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn publish_invokes_every_subscriber() {
        let mut bus: EventBus<ChainEvent> = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c1 = calls.clone();
        let c2 = calls.clone();
        bus.subscribe(move |_event| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        bus.subscribe(move |_event| {
            c2.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(ChainEvent::NewBestTip { hash: [0u8; 32], height: 1 });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn bus_with_no_subscribers_does_not_panic() {
        let bus: EventBus<WalletEvent> = EventBus::new();
        bus.publish(WalletEvent::BalanceChanged { new_balance_sat: 100 });
    }
}
