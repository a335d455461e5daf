//! The jsonrpsee method and subscription surface (§6, §6b): exactly
//! `status_snapshot`, `submit_tx`, and one subscription per event bus.
//! No additional node-management surface is added.

use std::sync::Arc;

use jsonrpsee::core::{async_trait, RpcResult, SubscriptionResult};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::{PendingSubscriptionSink, SubscriptionMessage};
use tokio::sync::broadcast;

use crate::handle::NodeHandle;
use crate::types::{ChainEventPayload, PeerEventPayload, StatusSnapshot, WalletEventPayload};

#[rpc(server)]
pub trait BitcApi {
    #[method(name = "status_snapshot")]
    fn status_snapshot(&self) -> RpcResult<StatusSnapshot>;

    #[method(name = "submit_tx")]
    async fn submit_tx(&self, recipient: String, amount_sat: u64, fee_rate: u64) -> RpcResult<String>;

    #[subscription(name = "subscribe_chain_events" => "chain_events", item = ChainEventPayload)]
    async fn subscribe_chain_events(&self) -> SubscriptionResult;

    #[subscription(name = "subscribe_wallet_events" => "wallet_events", item = WalletEventPayload)]
    async fn subscribe_wallet_events(&self) -> SubscriptionResult;

    #[subscription(name = "subscribe_peer_events" => "peer_events", item = PeerEventPayload)]
    async fn subscribe_peer_events(&self) -> SubscriptionResult;
}

/// Broadcast channels the composition root feeds from its
/// [`bitc_core::events::EventBus`] subscribers; each RPC subscription
/// gets its own receiver off the relevant channel.
pub struct EventChannels {
    pub chain: broadcast::Sender<ChainEventPayload>,
    pub wallet: broadcast::Sender<WalletEventPayload>,
    pub peer: broadcast::Sender<PeerEventPayload>,
}

impl EventChannels {
    pub fn new(capacity: usize) -> Self {
        EventChannels {
            chain: broadcast::channel(capacity).0,
            wallet: broadcast::channel(capacity).0,
            peer: broadcast::channel(capacity).0,
        }
    }
}

pub struct BitcApiImpl<H: NodeHandle> {
    handle: Arc<H>,
    events: Arc<EventChannels>,
}

impl<H: NodeHandle> BitcApiImpl<H> {
    pub fn new(handle: Arc<H>, events: Arc<EventChannels>) -> Self {
        BitcApiImpl { handle, events }
    }
}

async fn pump_subscription<T>(sink: PendingSubscriptionSink, mut receiver: broadcast::Receiver<T>)
where
    T: serde::Serialize + Clone + Send + 'static,
{
    let sink = match sink.accept().await {
        Ok(sink) => sink,
        Err(_) => return,
    };
    loop {
        match receiver.recv().await {
            Ok(event) => {
                let Ok(message) = SubscriptionMessage::from_json(&event) else { continue };
                if sink.send(message).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[async_trait]
impl<H: NodeHandle> BitcApiServer for BitcApiImpl<H> {
    fn status_snapshot(&self) -> RpcResult<StatusSnapshot> {
        Ok(self.handle.status_snapshot())
    }

    async fn submit_tx(&self, recipient: String, amount_sat: u64, fee_rate: u64) -> RpcResult<String> {
        self.handle
            .submit_tx(recipient, amount_sat, fee_rate)
            .map_err(|e| ErrorObjectOwned::owned(1, e.to_string(), None::<()>))
    }

    async fn subscribe_chain_events(&self, sink: PendingSubscriptionSink) -> SubscriptionResult {
        pump_subscription(sink, self.events.chain.subscribe()).await;
        Ok(())
    }

    async fn subscribe_wallet_events(&self, sink: PendingSubscriptionSink) -> SubscriptionResult {
        pump_subscription(sink, self.events.wallet.subscribe()).await;
        Ok(())
    }

    async fn subscribe_peer_events(&self, sink: PendingSubscriptionSink) -> SubscriptionResult {
        pump_subscription(sink, self.events.peer.subscribe()).await;
        Ok(())
    }
}
