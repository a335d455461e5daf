//! PBKDF2-HMAC-SHA-512 key derivation for the wallet file (§4.4).

use pbkdf2::pbkdf2_hmac;
use sha2::Sha512;

/// Number of PBKDF2 iterations used by default when creating a new
/// wallet file. Stored alongside the salt in `wallet.cfg` so existing
/// wallets keep working if this default ever changes.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Derives a 32-byte AES-256 key from `passphrase` and `salt` using
/// PBKDF2-HMAC-SHA-512 with `iterations` rounds.
pub fn derive_key(passphrase: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha512>(passphrase, salt, iterations, &mut key);
    key
}
