//! Crypto primitives: SHA-256, RIPEMD-160, HMAC, ECDSA over secp256k1,
//! Base58Check and AES key-wrap.
//!
//! All functions here are pure and stateless so they can be called from
//! any thread, including worker-pool threads (§4.5): the only shared
//! mutable state a caller needs to manage is the `secp256k1::Secp256k1`
//! context, which this module treats as thread-safe (the `secp256k1`
//! crate's C bindings use no global mutable state once constructed; see
//! DESIGN.md's note on the crypto-library-locking open question).

pub mod hash;
pub mod ecdsa;
pub mod base58check;
pub mod kdf;
pub mod aescbc;

pub use hash::{hash160, sha256d};
