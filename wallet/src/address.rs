//! P2PKH address derivation (§4.4): Base58Check(version || hash160(pubkey)).

use bitc_core::config::Network;
use bitc_core::crypto::{base58check, hash160};

use crate::error::Result;

fn version_byte(network: Network) -> u8 {
    match network {
        Network::Mainnet => 0x00,
        Network::Testnet3 => 0x6F,
    }
}

/// Derives the Base58Check P2PKH address for a compressed public key.
pub fn address_for_pubkey(network: Network, pubkey_compressed: &[u8; 33]) -> String {
    let pubkey_hash = hash160(pubkey_compressed);
    base58check::encode(version_byte(network), &pubkey_hash)
}

/// The standard P2PKH `scriptPubKey`: `OP_DUP OP_HASH160 <20 bytes>
/// OP_EQUALVERIFY OP_CHECKSIG`.
pub fn p2pkh_script_pubkey(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(0x76); // OP_DUP
    script.push(0xA9); // OP_HASH160
    script.push(0x14); // push 20 bytes
    script.extend_from_slice(pubkey_hash);
    script.push(0x88); // OP_EQUALVERIFY
    script.push(0xAC); // OP_CHECKSIG
    script
}

/// Recovers the 20-byte pubkey hash from an address, validating its
/// network version byte.
pub fn pubkey_hash_for_address(network: Network, address: &str) -> Result<[u8; 20]> {
    let (version, payload) = base58check::decode(address)?;
    if version != version_byte(network) {
        return Err(bitc_core::Error::BadBase58Check.into());
    }
    let mut hash = [0u8; 20];
    if payload.len() != 20 {
        return Err(bitc_core::Error::BadBase58Check.into());
    }
    hash.copy_from_slice(&payload);
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitc_core::crypto::ecdsa::KeyPair;

    #[test]
    fn mainnet_and_testnet_addresses_for_the_same_key_differ() {
        let pair = KeyPair::generate();
        let pubkey = pair.public_key_compressed();
        let mainnet_addr = address_for_pubkey(Network::Mainnet, &pubkey);
        let testnet_addr = address_for_pubkey(Network::Testnet3, &pubkey);
        assert_ne!(mainnet_addr, testnet_addr);
    }

    #[test]
    fn address_round_trips_to_the_same_pubkey_hash() {
        let pair = KeyPair::generate();
        let pubkey = pair.public_key_compressed();
        let expected_hash = hash160(&pubkey);
        let addr = address_for_pubkey(Network::Mainnet, &pubkey);
        let recovered = pubkey_hash_for_address(Network::Mainnet, &addr).unwrap();
        assert_eq!(recovered, expected_hash);
    }

    #[test]
    fn decoding_with_wrong_network_fails() {
        let pair = KeyPair::generate();
        let addr = address_for_pubkey(Network::Mainnet, &pair.public_key_compressed());
        assert!(pubkey_hash_for_address(Network::Testnet3, &addr).is_err());
    }

    #[test]
    fn p2pkh_script_has_expected_structure() {
        let script = p2pkh_script_pubkey(&[0x11; 20]);
        assert_eq!(script.len(), 25);
        assert_eq!(script[0], 0x76);
        assert_eq!(script[1], 0xA9);
        assert_eq!(script[2], 0x14);
        assert_eq!(script[23], 0x88);
        assert_eq!(script[24], 0xAC);
    }
}
