//! UTXO tracking and balance accounting (§4.4 "Wallet observation" /
//! "UTXO"). The ledger only records what the peer group and chain index
//! hand it via [`crate::WalletEvent`]-shaped observations; it holds no
//! socket and does no scanning itself.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use bitc_core::crypto::hash::Hash256;

/// How long an unconfirmed transaction is kept in the pending pool
/// before it is assumed dropped from the mempool and evicted (§4.4).
pub const UNCONFIRMED_EVICTION: Duration = Duration::from_secs(72 * 60 * 60);

/// The dust threshold below which a change output is folded into the
/// transaction fee instead of being created (§4.4 step 2).
pub const DUST_THRESHOLD_SAT: u64 = 546;

/// One output the wallet can spend, keyed by `(txid, vout)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub txid: Hash256,
    pub vout: u32,
    pub script_pubkey: Vec<u8>,
    pub value_sat: u64,
    pub height: Option<u32>,
    pub spent_by: Option<Hash256>,
}

impl Utxo {
    pub fn is_confirmed(&self) -> bool {
        self.height.is_some()
    }

    pub fn is_spent(&self) -> bool {
        self.spent_by.is_some()
    }

    pub fn is_spendable(&self) -> bool {
        !self.is_spent()
    }
}

/// A transaction the wallet has observed but that has not yet been
/// confirmed in a block, along with when it was first seen.
struct PendingTx {
    first_seen: SystemTime,
}

/// Tracks the wallet's outputs and the set of unconfirmed transactions
/// currently being watched for confirmation or eviction.
#[derive(Default)]
pub struct Ledger {
    utxos: HashMap<(Hash256, u32), Utxo>,
    pending: HashMap<Hash256, PendingTx>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new output paid to an address the wallet controls.
    /// `height` is `None` for a still-unconfirmed transaction.
    pub fn observe_output(&mut self, txid: Hash256, vout: u32, script_pubkey: Vec<u8>, value_sat: u64, height: Option<u32>) {
        if height.is_none() {
            self.pending.entry(txid).or_insert_with(|| PendingTx { first_seen: SystemTime::now() });
        }
        self.utxos.insert((txid, vout), Utxo { txid, vout, script_pubkey, value_sat, height, spent_by: None });
    }

    /// Marks the output `(txid, vout)` as spent by `spender_txid`.
    pub fn mark_spent(&mut self, txid: Hash256, vout: u32, spender_txid: Hash256) {
        if let Some(utxo) = self.utxos.get_mut(&(txid, vout)) {
            utxo.spent_by = Some(spender_txid);
        }
    }

    /// Whether `(txid, vout)` is a UTXO this ledger already knows about,
    /// regardless of whether it has since been spent.
    pub fn owns_utxo(&self, txid: &Hash256, vout: u32) -> bool {
        self.utxos.contains_key(&(*txid, vout))
    }

    /// Confirms a previously-pending transaction at `height`, updating
    /// every UTXO it created and clearing it from the pending pool.
    pub fn confirm(&mut self, txid: Hash256, height: u32) {
        self.pending.remove(&txid);
        for utxo in self.utxos.values_mut().filter(|u| u.txid == txid) {
            utxo.height = Some(height);
        }
    }

    /// Drops pending transactions that have sat unconfirmed longer than
    /// [`UNCONFIRMED_EVICTION`], along with the UTXOs they created.
    pub fn evict_stale_pending(&mut self) {
        let now = SystemTime::now();
        let stale: Vec<Hash256> = self
            .pending
            .iter()
            .filter(|(_, pending)| now.duration_since(pending.first_seen).unwrap_or_default() > UNCONFIRMED_EVICTION)
            .map(|(txid, _)| *txid)
            .collect();
        for txid in stale {
            self.pending.remove(&txid);
            self.utxos.retain(|(utxo_txid, _), _| *utxo_txid != txid);
        }
    }

    /// Spendable outputs: not already spent. Unconfirmed outputs are
    /// included; callers that require confirmations should filter on
    /// [`Utxo::is_confirmed`] themselves.
    pub fn spendable_utxos(&self) -> Vec<&Utxo> {
        self.utxos.values().filter(|u| u.is_spendable()).collect()
    }

    /// Confirmed balance: the sum of spendable, confirmed outputs.
    pub fn confirmed_balance_sat(&self) -> u64 {
        self.utxos.values().filter(|u| u.is_spendable() && u.is_confirmed()).map(|u| u.value_sat).sum()
    }

    /// Unconfirmed balance: the sum of spendable, unconfirmed outputs.
    pub fn unconfirmed_balance_sat(&self) -> u64 {
        self.utxos.values().filter(|u| u.is_spendable() && !u.is_confirmed()).map(|u| u.value_sat).sum()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txid(byte: u8) -> Hash256 {
        [byte; 32]
    }

    #[test]
    fn observing_a_confirmed_output_counts_toward_confirmed_balance() {
        let mut ledger = Ledger::new();
        ledger.observe_output(txid(1), 0, vec![], 50_000, Some(100));
        assert_eq!(ledger.confirmed_balance_sat(), 50_000);
        assert_eq!(ledger.unconfirmed_balance_sat(), 0);
    }

    #[test]
    fn observing_an_unconfirmed_output_counts_separately_and_tracks_pending() {
        let mut ledger = Ledger::new();
        ledger.observe_output(txid(2), 0, vec![], 10_000, None);
        assert_eq!(ledger.unconfirmed_balance_sat(), 10_000);
        assert_eq!(ledger.confirmed_balance_sat(), 0);
        assert_eq!(ledger.pending_count(), 1);
    }

    #[test]
    fn confirming_moves_balance_from_unconfirmed_to_confirmed() {
        let mut ledger = Ledger::new();
        ledger.observe_output(txid(3), 0, vec![], 25_000, None);
        ledger.confirm(txid(3), 500);
        assert_eq!(ledger.confirmed_balance_sat(), 25_000);
        assert_eq!(ledger.unconfirmed_balance_sat(), 0);
        assert_eq!(ledger.pending_count(), 0);
    }

    #[test]
    fn spent_outputs_do_not_count_toward_balance() {
        let mut ledger = Ledger::new();
        ledger.observe_output(txid(4), 0, vec![], 30_000, Some(10));
        ledger.mark_spent(txid(4), 0, txid(5));
        assert_eq!(ledger.confirmed_balance_sat(), 0);
        assert_eq!(ledger.spendable_utxos().len(), 0);
    }

    #[test]
    fn multiple_outputs_of_the_same_transaction_all_confirm_together() {
        let mut ledger = Ledger::new();
        ledger.observe_output(txid(6), 0, vec![], 1_000, None);
        ledger.observe_output(txid(6), 1, vec![], 2_000, None);
        ledger.confirm(txid(6), 42);
        assert_eq!(ledger.confirmed_balance_sat(), 3_000);
    }
}
