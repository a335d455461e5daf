//! Error types for the **bitc** RPC crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("submit_tx failed: {0}")]
    SubmitFailed(String),
}

pub type Result<T> = core::result::Result<T, Error>;
