//! Integration test driving the JSON-RPC server over real HTTP against
//! a stub [`NodeHandle`], exercising the same `status_snapshot` and
//! `submit_tx` methods the CLI's client commands call.

use std::sync::Arc;

use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::HttpClientBuilder;
use jsonrpsee::rpc_params;

use bitc_rpc::error::Error as RpcError;
use bitc_rpc::handle::NodeHandle;
use bitc_rpc::types::StatusSnapshot;
use bitc_rpc::{server, EventChannels};

struct StubHandle;

impl NodeHandle for StubHandle {
    fn status_snapshot(&self) -> StatusSnapshot {
        StatusSnapshot { best_height: 123, peer_count: 4, balance_sat: 50_000, sync_percent: 87.5 }
    }

    fn submit_tx(&self, recipient: String, amount_sat: u64, _fee_rate_sat_per_vbyte: u64) -> Result<String, RpcError> {
        if recipient.is_empty() {
            return Err(RpcError::SubmitFailed("empty recipient".into()));
        }
        Ok(format!("{amount_sat:0>64x}"))
    }
}

#[tokio::test]
async fn status_snapshot_round_trips_over_http() {
    let addr: std::net::SocketAddr = "127.0.0.1:18901".parse().unwrap();
    let events = Arc::new(EventChannels::new(16));
    let handle = server::serve(addr, Arc::new(StubHandle), events).await.unwrap();

    let client = HttpClientBuilder::default().build(format!("http://{addr}")).unwrap();
    let snapshot: StatusSnapshot = client.request("status_snapshot", rpc_params![]).await.unwrap();

    assert_eq!(snapshot.best_height, 123);
    assert_eq!(snapshot.peer_count, 4);
    assert_eq!(snapshot.balance_sat, 50_000);
    assert_eq!(snapshot.sync_percent, 87.5);

    handle.stop().unwrap();
}

#[tokio::test]
async fn submit_tx_errors_propagate_as_rpc_errors() {
    let addr: std::net::SocketAddr = "127.0.0.1:18902".parse().unwrap();
    let events = Arc::new(EventChannels::new(16));
    let handle = server::serve(addr, Arc::new(StubHandle), events).await.unwrap();

    let client = HttpClientBuilder::default().build(format!("http://{addr}")).unwrap();
    let result: Result<String, _> = client.request("submit_tx", rpc_params!["", 1000u64, 1u64]).await;
    assert!(result.is_err());

    let txid: String = client.request("submit_tx", rpc_params!["1recipient", 1000u64, 1u64]).await.unwrap();
    assert_eq!(txid.len(), 64);

    handle.stop().unwrap();
}
