//! Embedded genesis headers for mainnet and testnet3 (§4.1 Bootstrap).
//! There is no trust anchor beyond these constants.

use crate::chain::header::{BlockHeader, GENESIS_PREV_HASH};
use crate::config::Network;

/// Parses a big-endian hex hash string (as conventionally displayed by
/// block explorers) into the little-endian internal byte order used by
/// [`BlockHeader`] fields.
fn hash_from_display_hex(hex_str: &str) -> [u8; 32] {
    let mut bytes: Vec<u8> = hex::decode(hex_str).expect("valid genesis constant");
    bytes.reverse();
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    out
}

/// The canonical mainnet genesis header, mined 2009-01-03.
pub fn mainnet_genesis() -> BlockHeader {
    BlockHeader {
        version: 1,
        prev_hash: GENESIS_PREV_HASH,
        merkle_root: hash_from_display_hex(
            "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b",
        ),
        time: 1_231_006_505,
        bits: 0x1d00ffff,
        nonce: 2_083_236_893,
    }
}

/// The canonical testnet3 genesis header.
pub fn testnet3_genesis() -> BlockHeader {
    BlockHeader {
        version: 1,
        prev_hash: GENESIS_PREV_HASH,
        merkle_root: mainnet_genesis().merkle_root,
        time: 1_296_688_602,
        bits: 0x1d00ffff,
        nonce: 414_098_458,
    }
}

pub fn genesis_for(network: Network) -> BlockHeader {
    match network {
        Network::Mainnet => mainnet_genesis(),
        Network::Testnet3 => testnet3_genesis(),
    }
}
