//! Starts the HTTP JSON-RPC server (§6b). This is the only place in
//! the crate that touches an async runtime; the node itself runs on
//! its own reactor thread per [`bitc_core`]'s design, entirely outside
//! tokio.

use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::server::{Server, ServerHandle};

use crate::api::{BitcApiImpl, BitcApiServer, EventChannels};
use crate::handle::NodeHandle;

/// Builds and starts the RPC server, returning a handle the caller can
/// use to stop it (and the event channels, which the composition root
/// should feed from its core [`bitc_core::events::EventBus`]
/// subscribers).
pub async fn serve<H: NodeHandle>(
    addr: SocketAddr,
    handle: Arc<H>,
    events: Arc<EventChannels>,
) -> std::io::Result<ServerHandle> {
    let server = Server::builder().build(addr).await?;
    let module = BitcApiImpl::new(handle, events).into_rpc();
    Ok(server.start(module))
}
