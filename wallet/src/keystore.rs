//! The wallet file format (§4.4, §6 `wallet.cfg`): a versioned record
//! of salt, KDF parameters, an AES-256-CBC-encrypted private-key blob,
//! and the plaintext public-key list. Unlocking decrypts private keys
//! into a [`zeroize`]d region; a watch-only wallet carries no private
//! keys at all.

use std::collections::HashMap;
use std::path::Path;

use bitc_core::crypto::ecdsa::KeyPair;
use bitc_core::crypto::{aescbc, kdf};
use zeroize::Zeroize;

use crate::error::{Error, Result};

const FORMAT_VERSION: u32 = 1;

/// One private scalar held only while the wallet is unlocked. Zeroized
/// on drop so the secret does not linger in freed memory (§3 "Private
/// scalars are held in a locked memory region and cleared on
/// destruction").
pub struct LockedKey {
    bytes: [u8; 32],
}

impl LockedKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl Drop for LockedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// The wallet's on-disk state, plus unlocked private keys when present.
pub struct Wallet {
    salt: [u8; 16],
    iterations: u32,
    encrypted_blob: Vec<u8>,
    public_keys: Vec<[u8; 33]>,
    unlocked_keys: Option<Vec<LockedKey>>,
}

impl Wallet {
    /// Creates a fresh encrypted wallet with no keys yet.
    pub fn new_encrypted(passphrase: &str) -> Self {
        let salt = rand_salt();
        let key = kdf::derive_key(passphrase.as_bytes(), &salt, kdf::DEFAULT_ITERATIONS);
        let encrypted_blob = aescbc::encrypt(&key, &[]);
        Wallet { salt, iterations: kdf::DEFAULT_ITERATIONS, encrypted_blob, public_keys: Vec::new(), unlocked_keys: None }
    }

    pub fn is_locked(&self) -> bool {
        self.unlocked_keys.is_none()
    }

    pub fn public_keys(&self) -> &[[u8; 33]] {
        &self.public_keys
    }

    /// Generates a fresh keypair, appends its public key to the
    /// plaintext list, and re-encrypts the private-key blob. Requires
    /// the wallet to currently be unlocked.
    pub fn generate_address(&mut self, passphrase: &str) -> Result<[u8; 33]> {
        let keys = self.unlocked_keys.as_mut().ok_or(Error::Locked)?;
        let pair = KeyPair::generate();
        let compressed = pair.public_key_compressed();
        keys.push(LockedKey { bytes: pair.secret_bytes() });
        self.public_keys.push(compressed);
        self.reencrypt(passphrase, keys)?;
        Ok(compressed)
    }

    fn reencrypt(&mut self, passphrase: &str, keys: &[LockedKey]) -> Result<()> {
        let mut plaintext = Vec::with_capacity(keys.len() * 32);
        for key in keys {
            plaintext.extend_from_slice(key.as_bytes());
        }
        let kdf_key = kdf::derive_key(passphrase.as_bytes(), &self.salt, self.iterations);
        self.encrypted_blob = aescbc::encrypt(&kdf_key, &plaintext);
        plaintext.zeroize();
        Ok(())
    }

    /// Decrypts the private-key blob with `passphrase`, populating
    /// [`Wallet::unlocked_keys`]. Fails deterministically on a wrong
    /// passphrase (§4.4, §8 round-trip law).
    pub fn unlock(&mut self, passphrase: &str) -> Result<()> {
        let kdf_key = kdf::derive_key(passphrase.as_bytes(), &self.salt, self.iterations);
        let mut plaintext = aescbc::decrypt(&kdf_key, &self.encrypted_blob)?;
        let keys = plaintext
            .chunks_exact(32)
            .map(|chunk| {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(chunk);
                LockedKey { bytes }
            })
            .collect();
        plaintext.zeroize();
        self.unlocked_keys = Some(keys);
        Ok(())
    }

    pub fn lock(&mut self) {
        self.unlocked_keys = None;
    }

    pub fn find_secret(&self, public_key: &[u8; 33]) -> Result<&[u8; 32]> {
        let index = self.public_keys.iter().position(|pk| pk == public_key).ok_or(Error::UnknownAddress)?;
        let keys = self.unlocked_keys.as_ref().ok_or(Error::Locked)?;
        Ok(keys[index].as_bytes())
    }

    /// Serializes to the keyed-text `wallet.cfg` format (§6).
    pub fn save(&self, dir: &Path) -> Result<()> {
        let mut text = String::new();
        text.push_str(&format!("version={FORMAT_VERSION}\n"));
        text.push_str(&format!("salt={}\n", hex::encode(self.salt)));
        text.push_str(&format!("iterations={}\n", self.iterations));
        text.push_str(&format!("blob={}\n", hex::encode(&self.encrypted_blob)));
        let pubkeys = self.public_keys.iter().map(hex::encode).collect::<Vec<_>>().join(",");
        text.push_str(&format!("pubkeys={pubkeys}\n"));
        std::fs::write(dir.join("wallet.cfg"), text)?;
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(dir.join("wallet.cfg"))?;
        let fields = parse_keyed_lines(&text);

        let version: u32 = fields
            .get("version")
            .ok_or_else(|| Error::MalformedWalletFile("missing version".into()))?
            .parse()
            .map_err(|_| Error::MalformedWalletFile("bad version".into()))?;
        if version != FORMAT_VERSION {
            return Err(Error::MalformedWalletFile(format!("unsupported wallet file version {version}")));
        }

        let salt_hex = fields.get("salt").ok_or_else(|| Error::MalformedWalletFile("missing salt".into()))?;
        let salt_bytes = hex::decode(salt_hex).map_err(|e| Error::MalformedWalletFile(e.to_string()))?;
        let mut salt = [0u8; 16];
        if salt_bytes.len() != 16 {
            return Err(Error::MalformedWalletFile("salt must be 16 bytes".into()));
        }
        salt.copy_from_slice(&salt_bytes);

        let iterations: u32 = fields
            .get("iterations")
            .ok_or_else(|| Error::MalformedWalletFile("missing iterations".into()))?
            .parse()
            .map_err(|_| Error::MalformedWalletFile("bad iterations".into()))?;

        let blob_hex = fields.get("blob").ok_or_else(|| Error::MalformedWalletFile("missing blob".into()))?;
        let encrypted_blob = hex::decode(blob_hex).map_err(|e| Error::MalformedWalletFile(e.to_string()))?;

        let public_keys = match fields.get("pubkeys").map(|s| s.as_str()) {
            Some("") | None => Vec::new(),
            Some(list) => list
                .split(',')
                .map(|entry| {
                    let bytes = hex::decode(entry).map_err(|e| Error::MalformedWalletFile(e.to_string()))?;
                    let mut pk = [0u8; 33];
                    if bytes.len() != 33 {
                        return Err(Error::MalformedWalletFile("public key must be 33 bytes".into()));
                    }
                    pk.copy_from_slice(&bytes);
                    Ok(pk)
                })
                .collect::<Result<Vec<_>>>()?,
        };

        Ok(Wallet { salt, iterations, encrypted_blob, public_keys, unlocked_keys: None })
    }
}

fn parse_keyed_lines(text: &str) -> HashMap<String, String> {
    text.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn rand_salt() -> [u8; 16] {
    use rand::RngCore;
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_wallet_starts_locked_after_reload() {
        let dir = tempfile::tempdir().unwrap();
        let wallet = Wallet::new_encrypted("correct horse");
        wallet.save(dir.path()).unwrap();
        let reloaded = Wallet::load(dir.path()).unwrap();
        assert!(reloaded.is_locked());
    }

    #[test]
    fn unlock_with_correct_passphrase_succeeds() {
        let mut wallet = Wallet::new_encrypted("hunter2");
        wallet.unlock("hunter2").unwrap();
        assert!(!wallet.is_locked());
    }

    #[test]
    fn unlock_with_wrong_passphrase_fails_deterministically() {
        let mut wallet = Wallet::new_encrypted("hunter2");
        assert!(wallet.unlock("wrong passphrase").is_err());
    }

    #[test]
    fn generate_address_then_reload_and_unlock_recovers_the_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let pubkey = {
            let mut wallet = Wallet::new_encrypted("pw");
            wallet.unlock("pw").unwrap();
            let pk = wallet.generate_address("pw").unwrap();
            wallet.save(dir.path()).unwrap();
            pk
        };

        let mut reloaded = Wallet::load(dir.path()).unwrap();
        reloaded.unlock("pw").unwrap();
        assert_eq!(reloaded.public_keys(), &[pubkey]);
        assert!(reloaded.find_secret(&pubkey).is_ok());
    }

    #[test]
    fn find_secret_on_locked_wallet_errors() {
        let mut wallet = Wallet::new_encrypted("pw");
        wallet.unlock("pw").unwrap();
        let pk = wallet.generate_address("pw").unwrap();
        wallet.lock();
        assert!(matches!(wallet.find_secret(&pk), Err(Error::Locked)));
    }
}
