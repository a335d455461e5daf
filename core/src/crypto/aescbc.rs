//! AES-256-CBC encryption of the wallet's private-key blob (§4.4).
//!
//! The IV is generated fresh per encryption and prepended to the
//! ciphertext on disk; PKCS#7 padding makes the plaintext length
//! irrelevant to callers.

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use crate::error::{Error, Result};

type Encryptor = cbc::Encryptor<Aes256>;
type Decryptor = cbc::Decryptor<Aes256>;

pub const IV_LEN: usize = 16;

/// Encrypts `plaintext` under `key`, returning `iv || ciphertext`.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Vec<u8> {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    let ciphertext = Encryptor::new(key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    out
}

/// Decrypts `iv || ciphertext` produced by [`encrypt`] under `key`.
/// Fails deterministically (bad padding) if `key` is wrong.
pub fn decrypt(key: &[u8; 32], blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < IV_LEN {
        return Err(Error::Crypto("ciphertext shorter than IV".into()));
    }
    let (iv, ciphertext) = blob.split_at(IV_LEN);
    Decryptor::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| Error::Crypto("wallet decrypt failed: wrong passphrase or corrupt blob".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::kdf::derive_key;

    #[test]
    fn encrypt_then_decrypt_round_trips_with_correct_passphrase() {
        let key = derive_key(b"hunter2", b"some-salt", 1_000);
        let plaintext = b"thirty-two bytes of secret key!";
        let blob = encrypt(&key, plaintext);
        let recovered = decrypt(&key, &blob).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn decrypt_with_wrong_passphrase_fails_deterministically() {
        let key = derive_key(b"hunter2", b"some-salt", 1_000);
        let wrong_key = derive_key(b"hunter3", b"some-salt", 1_000);
        let blob = encrypt(&key, b"private key material");
        assert!(decrypt(&wrong_key, &blob).is_err());
        assert!(decrypt(&wrong_key, &blob).is_err());
    }
}
