//! Bloom-filtered SPV wallet for the **bitc** client (§4.4): an
//! encrypted keystore, UTXO/observation ledger, and legacy transaction
//! construction. Owns no socket; broadcasting goes through whatever the
//! composition root wires up to implement [`txbuilder::TxBroadcaster`].

pub mod address;
pub mod error;
pub mod keystore;
pub mod ledger;
pub mod txbuilder;

pub use error::{Error, Result};
