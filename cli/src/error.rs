//! Error type for the **bitc** composition root. `main.rs` itself
//! aggregates with `anyhow`; this crate's internal logic keeps a typed
//! error so `context::NodeContext` stays a normal `Result`-returning
//! module like every other crate in the workspace.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] bitc_core::Error),

    #[error(transparent)]
    Net(#[from] bitc_net::Error),

    #[error(transparent)]
    Wallet(#[from] bitc_wallet::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("wallet is not loaded or is locked")]
    WalletUnavailable,
}

pub type Result<T> = core::result::Result<T, Error>;
