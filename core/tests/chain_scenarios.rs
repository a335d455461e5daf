//! Integration tests exercising the header-chain engine end to end
//! through its public API, the way a peer feeding real `headers`
//! batches would.

use bitc_core::chain::genesis::mainnet_genesis;
use bitc_core::chain::header::BlockHeader;
use bitc_core::chain::index::{AcceptOutcome, ChainIndex};
use bitc_core::chain::pow::hash_meets_target;
use bitc_core::config::Network;
use bitc_core::events::{ChainEvent, EventBus};
use bitc_core::Error;

/// Mines a child header of `parent` satisfying its (trivially easy,
/// genesis-level) target, starting the nonce search at `start_nonce`.
fn child_of(parent: &BlockHeader, start_nonce: u32) -> BlockHeader {
    let mut candidate = BlockHeader {
        version: 1,
        prev_hash: parent.hash(),
        merkle_root: [7u8; 32],
        time: parent.time + 600,
        bits: parent.bits,
        nonce: start_nonce,
    };
    for n in start_nonce..start_nonce + 1_000_000 {
        candidate.nonce = n;
        if hash_meets_target(&candidate.hash(), candidate.bits) {
            return candidate;
        }
    }
    panic!("failed to mine a test header satisfying genesis-level difficulty");
}

fn chain_of(genesis: &BlockHeader, len: u32, start_nonce: u32) -> Vec<BlockHeader> {
    let mut out = Vec::new();
    let mut tip = *genesis;
    for _ in 0..len {
        let header = child_of(&tip, start_nonce);
        out.push(header);
        tip = header;
    }
    out
}

/// Scenario 1: fresh start, a peer serving a 10-header chain from
/// mainnet genesis. `headers.dat` ends up with 11 records (genesis
/// plus 10) and the best height advances to 10.
#[test]
fn fresh_start_syncs_a_ten_header_chain() {
    let dir = tempfile::tempdir().unwrap();
    let mut index = ChainIndex::open(dir.path(), Network::Mainnet).unwrap();
    let events = EventBus::new();

    let genesis = mainnet_genesis();
    let headers = chain_of(&genesis, 10, 0);
    for header in &headers {
        let outcome = index.accept_header(*header, &events).unwrap();
        assert!(matches!(outcome, AcceptOutcome::Accepted(_)));
    }

    assert_eq!(index.best_height(), 10);
    assert_eq!(index.best_tip_hash(), headers.last().unwrap().hash());

    let reopened = ChainIndex::open(dir.path(), Network::Mainnet).unwrap();
    assert_eq!(reopened.best_height(), 10);
    assert_eq!(reopened.best_tip_hash(), headers.last().unwrap().hash());
}

/// Scenario 2: two peers feed competing branches of differing work;
/// the heavier branch wins and a reorg is reported disconnecting the
/// loser's unique headers and connecting the winner's.
#[test]
fn competing_branches_reorg_to_the_heavier_chain() {
    let dir = tempfile::tempdir().unwrap();
    let mut index = ChainIndex::open(dir.path(), Network::Mainnet).unwrap();
    let events = EventBus::new();
    let genesis = mainnet_genesis();

    // Common prefix shared by both peers' views.
    let common = chain_of(&genesis, 3, 0);
    for header in &common {
        index.accept_header(*header, &events).unwrap();
    }
    let fork_point = *common.last().unwrap();

    let alpha = chain_of(&fork_point, 2, 100);
    for header in &alpha {
        index.accept_header(*header, &events).unwrap();
    }
    assert_eq!(index.best_tip_hash(), alpha.last().unwrap().hash());

    let beta = chain_of(&fork_point, 3, 200);
    let mut last_outcome = None;
    for header in &beta {
        last_outcome = Some(index.accept_header(*header, &events).unwrap());
    }

    match last_outcome.unwrap() {
        AcceptOutcome::Accepted(Some(ChainEvent::Reorg { disconnected, connected })) => {
            assert_eq!(disconnected, alpha.iter().map(|h| h.hash()).collect::<Vec<_>>());
            assert_eq!(connected, beta.iter().map(|h| h.hash()).collect::<Vec<_>>());
        }
        other => panic!("expected the heavier branch to trigger a reorg, got {other:?}"),
    }
    assert_eq!(index.best_tip_hash(), beta.last().unwrap().hash());
    assert_eq!(index.best_height(), 6);
}

/// Scenario 3: a header whose hash does not meet the target it claims
/// is rejected outright and never reaches the store.
#[test]
fn header_with_invalid_proof_of_work_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut index = ChainIndex::open(dir.path(), Network::Mainnet).unwrap();
    let events = EventBus::new();
    let genesis = mainnet_genesis();

    let mut bad = child_of(&genesis, 0);
    bad.nonce = bad.nonce.wrapping_add(1);
    while hash_meets_target(&bad.hash(), bad.bits) {
        bad.nonce = bad.nonce.wrapping_add(1);
    }

    let result = index.accept_header(bad, &events);
    assert!(matches!(result, Err(Error::InvalidProofOfWork)));
    assert_eq!(index.best_height(), 0);
    assert!(!index.contains(&bad.hash()));
}
