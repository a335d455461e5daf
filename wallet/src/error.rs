//! Error types for the **bitc** wallet crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] bitc_core::Error),

    #[error("wallet is locked")]
    Locked,

    #[error("wallet file is malformed: {0}")]
    MalformedWalletFile(String),

    #[error("insufficient funds: need {needed} sat, have {available} sat")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("no such wallet address")]
    UnknownAddress,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, Error>;
