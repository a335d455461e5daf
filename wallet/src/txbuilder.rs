//! Legacy (pre-SegWit) transaction construction (§4.4 "Send"): UTXO
//! selection, output construction, SIGHASH_ALL signing and assembly.
//!
//! This module never touches a socket. Broadcasting the finished
//! transaction is left to whatever implements [`TxBroadcaster`] — the
//! composition root wires that trait to the peer group so this crate
//! stays testable without a network stack.

use bitc_core::crypto::ecdsa::{self, KeyPair};
use bitc_core::crypto::hash::{sha256d, Hash256};
use bitc_core::wire::message::{OutPoint, Transaction, TxIn, TxOut};

use crate::address;
use crate::error::{Error, Result};
use crate::keystore::Wallet;
use crate::ledger::{Ledger, Utxo, DUST_THRESHOLD_SAT};

/// Legacy `SIGHASH_ALL`, the only sighash type the wallet produces.
const SIGHASH_ALL: u32 = 0x01;

/// Default per-input sequence number for a non-RBF, non-locktime spend.
const DEFAULT_SEQUENCE: u32 = 0xFFFF_FFFF;

/// Rough legacy-transaction size estimate used for fee calculation:
/// a P2PKH input is ~148 bytes signed, a P2PKH output ~34 bytes, plus
/// a flat overhead for version/locktime/counts.
fn estimate_vsize(input_count: usize, output_count: usize) -> u64 {
    (10 + input_count * 148 + output_count * 34) as u64
}

/// Something that can relay a finished transaction to the network.
/// Implemented by the composition root on top of the peer group; the
/// wallet crate itself has no network dependency.
pub trait TxBroadcaster {
    fn broadcast(&self, tx: &Transaction) -> Result<()>;
}

/// Greedily selects spendable UTXOs, largest first, until their total
/// value covers `target_sat` plus the fee implied by the inputs chosen
/// so far. Returns the chosen UTXOs and the fee charged against them.
fn select_utxos(mut candidates: Vec<Utxo>, target_sat: u64, fee_rate_sat_per_vbyte: u64) -> Result<(Vec<Utxo>, u64)> {
    candidates.sort_by(|a, b| b.value_sat.cmp(&a.value_sat));

    let mut chosen = Vec::new();
    let mut total = 0u64;
    for utxo in candidates {
        chosen.push(utxo);
        total += chosen.last().unwrap().value_sat;
        // Two outputs assumed: recipient + change. select_and_build trims
        // the change output away afterward if it turns out to be dust.
        let fee = estimate_vsize(chosen.len(), 2) * fee_rate_sat_per_vbyte;
        if total >= target_sat + fee {
            return Ok((chosen, fee));
        }
    }

    let fee = estimate_vsize(chosen.len().max(1), 2) * fee_rate_sat_per_vbyte;
    Err(Error::InsufficientFunds { needed: target_sat + fee, available: total })
}

/// Builds, signs and returns a transaction paying `amount_sat` to
/// `recipient_address`, spending from `ledger`'s spendable UTXOs and
/// returning any change to a freshly generated wallet address.
///
/// Does not broadcast; call [`TxBroadcaster::broadcast`] with the
/// result once the caller is satisfied with it.
pub fn build_and_sign_transaction(
    wallet: &mut Wallet,
    ledger: &Ledger,
    passphrase: &str,
    recipient_address: &str,
    network: bitc_core::config::Network,
    amount_sat: u64,
    fee_rate_sat_per_vbyte: u64,
) -> Result<Transaction> {
    let candidates: Vec<Utxo> = ledger.spendable_utxos().into_iter().cloned().collect();
    let (selected, fee) = select_utxos(candidates, amount_sat, fee_rate_sat_per_vbyte)?;

    let total_in: u64 = selected.iter().map(|u| u.value_sat).sum();
    let change_sat = total_in - amount_sat - fee;

    let recipient_hash = address::pubkey_hash_for_address(network, recipient_address)?;
    let mut outputs = vec![TxOut {
        value_sat: amount_sat,
        script_pubkey: address::p2pkh_script_pubkey(&recipient_hash),
    }];

    if change_sat >= DUST_THRESHOLD_SAT {
        let change_pubkey = wallet.generate_address(passphrase)?;
        let change_hash = bitc_core::crypto::hash::hash160(&change_pubkey);
        outputs.push(TxOut { value_sat: change_sat, script_pubkey: address::p2pkh_script_pubkey(&change_hash) });
    }

    let inputs: Vec<TxIn> = selected
        .iter()
        .map(|utxo| TxIn {
            previous_output: OutPoint { txid: utxo.txid, vout: utxo.vout },
            script_sig: Vec::new(),
            sequence: DEFAULT_SEQUENCE,
        })
        .collect();

    let unsigned = Transaction { version: 1, inputs, outputs, lock_time: 0 };
    sign_transaction(wallet, unsigned, &selected)
}

fn sign_transaction(wallet: &Wallet, mut tx: Transaction, spent: &[Utxo]) -> Result<Transaction> {
    for (index, utxo) in spent.iter().enumerate() {
        let pubkey_hash = script_pubkey_hash(&utxo.script_pubkey).ok_or(Error::UnknownAddress)?;
        let public_key = *wallet
            .public_keys()
            .iter()
            .find(|pk| bitc_core::crypto::hash::hash160(pk.as_slice()) == pubkey_hash)
            .ok_or(Error::UnknownAddress)?;
        let secret_bytes = wallet.find_secret(&public_key)?;
        let keypair = KeyPair::from_secret_bytes(secret_bytes)?;

        let digest = legacy_sighash(&tx, index, &utxo.script_pubkey, SIGHASH_ALL);
        let mut der_sig = ecdsa::sign(&keypair.secret, &digest)?;
        der_sig.push(SIGHASH_ALL as u8);

        tx.inputs[index].script_sig = build_p2pkh_script_sig(&der_sig, &public_key);
    }
    Ok(tx)
}

/// Extracts the 20-byte pubkey hash from a standard P2PKH scriptPubKey,
/// or `None` if `script` does not have that shape.
fn script_pubkey_hash(script: &[u8]) -> Option<[u8; 20]> {
    if script.len() == 25 && script[0] == 0x76 && script[1] == 0xA9 && script[2] == 0x14 && script[23] == 0x88 && script[24] == 0xAC {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&script[3..23]);
        Some(hash)
    } else {
        None
    }
}

fn push_bytes(out: &mut Vec<u8>, data: &[u8]) {
    assert!(data.len() < 76, "push_bytes only handles direct pushes under OP_PUSHDATA1");
    out.push(data.len() as u8);
    out.extend_from_slice(data);
}

fn build_p2pkh_script_sig(der_sig_with_hashtype: &[u8], public_key: &[u8; 33]) -> Vec<u8> {
    let mut script = Vec::with_capacity(der_sig_with_hashtype.len() + public_key.len() + 2);
    push_bytes(&mut script, der_sig_with_hashtype);
    push_bytes(&mut script, public_key);
    script
}

/// Legacy `SIGHASH_ALL` digest (§4.4 step 3): serialize the transaction
/// with every scriptSig blanked except the input being signed, which
/// gets the spent output's scriptPubKey, append the sighash type as a
/// little-endian u32, and double-SHA-256 the result.
fn legacy_sighash(tx: &Transaction, input_index: usize, script_pubkey: &[u8], sighash_type: u32) -> Hash256 {
    let mut tx_copy = tx.clone();
    for (index, input) in tx_copy.inputs.iter_mut().enumerate() {
        input.script_sig = if index == input_index { script_pubkey.to_vec() } else { Vec::new() };
    }
    let mut buf = tx_copy.encode_to_vec();
    buf.extend_from_slice(&sighash_type.to_le_bytes());
    sha256d(&buf)
}
