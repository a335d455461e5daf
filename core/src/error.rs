//! Error types for the **bitc** core crate.
//!
//! All high-level operations return [`crate::Result`], a convenient alias
//! for `core::result::Result<T, Error>`.
//!
//! The enum stays high-level and small; lower-level errors (crypto, I/O,
//! parse) are mapped into one of these variants before bubbling up.
//!
//! # Examples
//!
//! ```
//! use bitc_core::{Error, Result};
//!
//! fn demo_fn(fail: bool) -> Result<()> {
//!     if fail {
//!         Err(Error::InvalidProofOfWork)
//!     } else {
//!         Ok(())
//!     }
//! }
//! ```

use thiserror::Error;

/// Core crate error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Header hash does not satisfy the difficulty target implied by `bits`.
    #[error("proof of work does not meet target")]
    InvalidProofOfWork,

    /// `bits` disagrees with the difficulty retarget rule at this height.
    #[error("bad difficulty bits at height {height}: expected {expected:#010x}, got {actual:#010x}")]
    BadDifficultyBits { height: u32, expected: u32, actual: u32 },

    /// `prev_hash` does not reference a known header or the genesis sentinel.
    #[error("unknown parent header")]
    UnknownParent,

    /// Header is already present in the index (idempotent accept).
    #[error("duplicate header")]
    DuplicateHeader,

    /// A wire message failed to decode.
    #[error("decode error: {0}")]
    Decode(&'static str),

    /// A wire message exceeded `MAX_MESSAGE_PAYLOAD`.
    #[error("message payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Frame magic bytes did not match the configured network.
    #[error("bad message magic")]
    BadMagic,

    /// Frame checksum did not match the payload.
    #[error("bad message checksum")]
    BadChecksum,

    /// The on-disk headers store is corrupt beyond tail-truncation recovery.
    #[error("header store corrupt: {0}")]
    StoreCorrupt(String),

    /// Underlying I/O failure reading or writing persisted state.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// secp256k1 signing/verification failed.
    #[error("cryptographic operation failed: {0}")]
    Crypto(String),

    /// Base58Check decode failed (bad checksum or alphabet).
    #[error("base58check decode failed")]
    BadBase58Check,

    /// Config file present but malformed.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenient result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
