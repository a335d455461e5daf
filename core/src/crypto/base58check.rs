//! Base58Check encoding, used for P2PKH addresses (§4.4): a version byte
//! followed by the hash160 payload and a 4-byte checksum, the whole
//! thing Base58-encoded.

use crate::error::{Error, Result};

/// Encodes `version || payload` as Base58Check.
pub fn encode(version: u8, payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(1 + payload.len());
    data.push(version);
    data.extend_from_slice(payload);
    bs58::encode(data).with_check().into_string()
}

/// Decodes a Base58Check string, returning `(version, payload)`.
/// Fails if the checksum does not match or the alphabet is invalid.
pub fn decode(s: &str) -> Result<(u8, Vec<u8>)> {
    let data = bs58::decode(s)
        .with_check(None)
        .into_vec()
        .map_err(|_| Error::BadBase58Check)?;
    let (version, payload) = data.split_first().ok_or(Error::BadBase58Check)?;
    Ok((*version, payload.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::hash160;

    #[test]
    fn encode_then_decode_round_trips() {
        let payload = hash160(b"a compressed public key");
        let address = encode(0x00, &payload);
        let (version, decoded) = decode(&address).unwrap();
        assert_eq!(version, 0x00);
        assert_eq!(decoded, payload.to_vec());
    }

    #[test]
    fn mainnet_and_testnet_versions_differ() {
        let payload = hash160(b"same key");
        let main = encode(0x00, &payload);
        let test = encode(0x6F, &payload);
        assert_ne!(main, test);
    }

    #[test]
    fn decode_rejects_corrupted_checksum() {
        let payload = hash160(b"a key");
        let mut address = encode(0x00, &payload).into_bytes();
        // Flip the last character, which lives in the checksum region.
        let last = address.len() - 1;
        address[last] = if address[last] == b'1' { b'2' } else { b'1' };
        let address = String::from_utf8(address).unwrap();
        assert!(decode(&address).is_err());
    }
}
