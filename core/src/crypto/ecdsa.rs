//! ECDSA over secp256k1: key generation, signing and verification.
//!
//! Signing and verification are CPU-heavy enough that the peer group and
//! wallet submit them as jobs to the worker pool (§4.5) rather than
//! calling them directly from the reactor thread. This module exposes
//! plain, synchronous functions; the caller decides where to run them.

use rand::RngCore;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};

use crate::error::{Error, Result};

/// A secp256k1 keypair. The secret scalar should be kept in a
/// [`crate::crypto::kdf`]-unlocked, zeroize-on-drop region by callers
/// that hold it long-term (see `bitc-wallet::keys`); this type itself is
/// just the arithmetic pairing, not the storage policy.
#[derive(Clone)]
pub struct KeyPair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl KeyPair {
    /// Samples a cryptographically secure random scalar in `[1, n-1]`
    /// and derives the matching public point, per §4.4's address
    /// derivation rule. `SecretKey::from_slice` itself rejects zero and
    /// out-of-range scalars, so on the vanishingly rare rejection this
    /// simply resamples.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let mut rng = rand::thread_rng();
        loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            if let Ok(secret) = SecretKey::from_slice(&bytes) {
                let public = PublicKey::from_secret_key(&secp, &secret);
                return KeyPair { secret, public };
            }
        }
    }

    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(bytes).map_err(|e| Error::Crypto(e.to_string()))?;
        let public = PublicKey::from_secret_key(&secp, &secret);
        Ok(KeyPair { secret, public })
    }

    /// Compressed (33-byte) SEC1 public key encoding, used in scriptSigs
    /// and in deriving P2PKH addresses.
    pub fn public_key_compressed(&self) -> [u8; 33] {
        self.public.serialize()
    }

    /// The raw 32-byte scalar. Callers that hold this long-term should
    /// keep it in a zeroize-on-drop region (see `bitc-wallet::keystore`).
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }
}

/// Signs a 32-byte message digest (typically a legacy sighash, §4.4
/// step 3) producing a DER-encoded ECDSA signature.
pub fn sign(secret: &SecretKey, digest: &[u8; 32]) -> Result<Vec<u8>> {
    let secp = Secp256k1::signing_only();
    let msg = Message::from_digest_slice(digest).map_err(|e| Error::Crypto(e.to_string()))?;
    let sig = secp.sign_ecdsa(&msg, secret);
    Ok(sig.serialize_der().to_vec())
}

/// Verifies a DER-encoded ECDSA signature over a 32-byte digest.
pub fn verify(public: &PublicKey, digest: &[u8; 32], der_signature: &[u8]) -> Result<()> {
    let secp = Secp256k1::verification_only();
    let msg = Message::from_digest_slice(digest).map_err(|e| Error::Crypto(e.to_string()))?;
    let sig = Signature::from_der(der_signature).map_err(|e| Error::Crypto(e.to_string()))?;
    secp.verify_ecdsa(&msg, &sig, public)
        .map_err(|e| Error::Crypto(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::sha256d;

    #[test]
    fn sign_then_verify_round_trips() {
        let kp = KeyPair::generate();
        let digest = sha256d(b"a transaction to sign");
        let sig = sign(&kp.secret, &digest).unwrap();
        verify(&kp.public, &digest, &sig).expect("valid signature must verify");
    }

    #[test]
    fn verify_rejects_wrong_digest() {
        let kp = KeyPair::generate();
        let digest = sha256d(b"original message");
        let sig = sign(&kp.secret, &digest).unwrap();
        let other_digest = sha256d(b"tampered message");
        assert!(verify(&kp.public, &other_digest, &sig).is_err());
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let kp = KeyPair::generate();
        let other = KeyPair::generate();
        let digest = sha256d(b"message");
        let sig = sign(&kp.secret, &digest).unwrap();
        assert!(verify(&other.public, &digest, &sig).is_err());
    }
}
