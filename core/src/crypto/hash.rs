//! Double-SHA-256 and hash160 (RIPEMD-160 of SHA-256), the two hash
//! combinators used throughout the wire protocol and address derivation.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// 32-byte hash type used for txids, block hashes and merkle nodes.
pub type Hash256 = [u8; 32];

/// 20-byte hash type used for pubkey hashes (P2PKH) and address payloads.
pub type Hash160 = [u8; 20];

/// `SHA256(SHA256(data))`, Bitcoin's standard message digest.
pub fn sha256d(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    second.into()
}

/// `RIPEMD160(SHA256(data))`, used to derive pubkey hashes for addresses.
pub fn hash160(data: &[u8]) -> Hash160 {
    let sha = Sha256::digest(data);
    let mut hasher = Ripemd160::new();
    hasher.update(sha);
    hasher.finalize().into()
}

/// Single SHA-256, used where the wire format calls for it directly
/// (e.g. the 4-byte message checksum is the first four bytes of a
/// double-SHA-256, computed by calling this twice).
pub fn sha256(data: &[u8]) -> Hash256 {
    Sha256::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256d_equals_two_successive_sha256_calls() {
        let got = sha256d(b"hello bitc");
        let manual = sha256(&sha256(b"hello bitc"));
        assert_eq!(got, manual);
    }

    #[test]
    fn sha256d_is_deterministic_and_sensitive_to_input() {
        assert_eq!(sha256d(b"a"), sha256d(b"a"));
        assert_ne!(sha256d(b"a"), sha256d(b"b"));
    }

    #[test]
    fn hash160_is_20_bytes_and_deterministic() {
        let a = hash160(b"some public key bytes");
        let b = hash160(b"some public key bytes");
        assert_eq!(a, b);
        assert_eq!(a.len(), 20);
    }
}
