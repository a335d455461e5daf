//! The seam between this crate and the node composition root (§9
//! "single explicit node context"): the RPC server only ever talks to
//! its [`NodeHandle`], never to the chain index, peer group or wallet
//! directly.

use crate::error::Error;
use crate::types::StatusSnapshot;

/// Implemented by the CLI's composition root on top of the live node
/// context. Every method here must be safe to call from the jsonrpsee
/// runtime's worker threads, not the reactor thread itself — the
/// implementation is responsible for any hand-off back onto the
/// reactor (e.g. via a channel) that `status_snapshot`'s "taken on the
/// reactor thread" requirement (§6) demands.
pub trait NodeHandle: Send + Sync + 'static {
    fn status_snapshot(&self) -> StatusSnapshot;

    /// Builds, signs and broadcasts a transaction, returning its txid
    /// as a hex string on success.
    fn submit_tx(&self, recipient: String, amount_sat: u64, fee_rate_sat_per_vbyte: u64) -> Result<String, Error>;
}
