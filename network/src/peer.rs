//! Per-peer connection state machine (§4.3) and misbehavior scoring.

use std::net::SocketAddr;

/// The seven states a peer connection passes through, in order
/// (§4.3, §9 "each peer's state is a variant over the seven states").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Init,
    Connecting,
    HandshakeSent,
    HandshakeAck,
    Ready,
    Closing,
    Closed,
}

/// Misbehavior score threshold at which a peer is disconnected and
/// banned (§4.3).
pub const BAN_THRESHOLD: u32 = 100;

/// Ban duration once a peer crosses [`BAN_THRESHOLD`].
pub const BAN_DURATION_SECS: u32 = 24 * 60 * 60;

/// Per-peer inflight `getdata` request cap (§4.3).
pub const MAX_INFLIGHT_REQUESTS: usize = 16;

/// Points added to a peer's misbehavior score per violation kind.
pub mod penalty {
    pub const INVALID_HEADER: u32 = 100;
    pub const BAD_CHECKSUM: u32 = 20;
    pub const OVERSIZE_MESSAGE: u32 = 20;
    pub const PROTOCOL_STATE_VIOLATION: u32 = 20;
    pub const MERKLE_MISMATCH: u32 = 50;
    pub const STALE_SYNC: u32 = 10;
}

/// Runtime state for one connected peer.
pub struct Peer {
    pub addr: SocketAddr,
    pub state: PeerState,
    pub negotiated_version: Option<i32>,
    pub services: u64,
    pub height_at_handshake: i32,
    pub misbehavior_score: u32,
    pub inflight_requests: usize,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub last_ping_nonce: Option<u64>,
    pub rolling_latency_ms: Option<u32>,
}

impl Peer {
    pub fn new(addr: SocketAddr) -> Self {
        Peer {
            addr,
            state: PeerState::Init,
            negotiated_version: None,
            services: 0,
            height_at_handshake: 0,
            misbehavior_score: 0,
            inflight_requests: 0,
            bytes_sent: 0,
            bytes_received: 0,
            last_ping_nonce: None,
            rolling_latency_ms: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == PeerState::Ready
    }

    pub fn has_inflight_capacity(&self) -> bool {
        self.inflight_requests < MAX_INFLIGHT_REQUESTS
    }

    /// Adds `points` to this peer's misbehavior score. Returns `true` if
    /// the peer has now crossed [`BAN_THRESHOLD`] and must be
    /// disconnected and banned.
    #[must_use]
    pub fn penalize(&mut self, points: u32) -> bool {
        self.misbehavior_score = self.misbehavior_score.saturating_add(points);
        self.misbehavior_score >= BAN_THRESHOLD
    }

    /// Transitions to [`PeerState::Closing`]; any state may do this
    /// (§4.3 "Any state → CLOSING").
    pub fn begin_closing(&mut self) {
        self.state = PeerState::Closing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn sample_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8333)
    }

    #[test]
    fn fresh_peer_starts_in_init_state() {
        let peer = Peer::new(sample_addr());
        assert_eq!(peer.state, PeerState::Init);
        assert!(!peer.is_ready());
    }

    #[test]
    fn invalid_header_penalty_alone_crosses_ban_threshold() {
        let mut peer = Peer::new(sample_addr());
        let banned = peer.penalize(penalty::INVALID_HEADER);
        assert!(banned);
    }

    #[test]
    fn small_penalties_accumulate_before_banning() {
        let mut peer = Peer::new(sample_addr());
        assert!(!peer.penalize(penalty::BAD_CHECKSUM));
        assert!(!peer.penalize(penalty::OVERSIZE_MESSAGE));
        assert!(!peer.penalize(penalty::PROTOCOL_STATE_VIOLATION));
        assert!(!peer.penalize(penalty::MERKLE_MISMATCH));
        assert!(peer.penalize(penalty::MERKLE_MISMATCH));
    }

    #[test]
    fn inflight_capacity_respects_cap() {
        let mut peer = Peer::new(sample_addr());
        peer.inflight_requests = MAX_INFLIGHT_REQUESTS;
        assert!(!peer.has_inflight_capacity());
    }

    #[test]
    fn any_state_can_begin_closing() {
        let mut peer = Peer::new(sample_addr());
        peer.state = PeerState::Ready;
        peer.begin_closing();
        assert_eq!(peer.state, PeerState::Closing);
    }
}
