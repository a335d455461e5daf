//! Peer group orchestration (§4.3): target peer-count maintenance,
//! header-sync peer election and rotation, round-robin `getdata`
//! dispatch, and misbehavior-driven bans.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use crate::peer::{penalty, Peer, PeerState, BAN_DURATION_SECS};

/// How long the header-sync peer is given to make progress before
/// rotation (§4.3, §5).
pub const SYNC_PROGRESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Coordinates every connected [`Peer`]. Owns no sockets itself — the
/// reactor drives actual I/O and calls into this type to decide what to
/// do next.
pub struct PeerGroup {
    peers: HashMap<SocketAddr, Peer>,
    target_peer_count: usize,
    min_peers_init: usize,
    sync_peer: Option<SocketAddr>,
    sync_deadline: Option<Instant>,
    bans: HashMap<IpAddr, Instant>,
    getdata_cursor: usize,
}

impl PeerGroup {
    pub fn new(target_peer_count: usize, min_peers_init: usize) -> Self {
        PeerGroup {
            peers: HashMap::new(),
            target_peer_count,
            min_peers_init,
            sync_peer: None,
            sync_deadline: None,
            bans: HashMap::new(),
            getdata_cursor: 0,
        }
    }

    pub fn insert(&mut self, peer: Peer) {
        self.peers.insert(peer.addr, peer);
    }

    pub fn remove(&mut self, addr: &SocketAddr) -> Option<Peer> {
        if self.sync_peer == Some(*addr) {
            self.sync_peer = None;
            self.sync_deadline = None;
        }
        self.peers.remove(addr)
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&Peer> {
        self.peers.get(addr)
    }

    pub fn get_mut(&mut self, addr: &SocketAddr) -> Option<&mut Peer> {
        self.peers.get_mut(addr)
    }

    pub fn ready_count(&self) -> usize {
        self.peers.values().filter(|p| p.is_ready()).count()
    }

    /// The highest height any ready peer announced at handshake, used
    /// to estimate header-sync progress. `0` if no peer is ready yet.
    pub fn best_known_peer_height(&self) -> i32 {
        self.peers.values().filter(|p| p.is_ready()).map(|p| p.height_at_handshake).max().unwrap_or(0)
    }

    /// Whether the group should attempt more outbound connections,
    /// accounting for the initial-sync acceleration window (§4.3).
    pub fn wants_more_connections(&self, initial_sync: bool) -> bool {
        let target = if initial_sync { self.min_peers_init } else { self.target_peer_count };
        self.ready_count() < target
    }

    pub fn is_banned(&self, ip: &IpAddr) -> bool {
        match self.bans.get(ip) {
            Some(expiry) => *expiry > Instant::now(),
            None => false,
        }
    }

    fn ban(&mut self, ip: IpAddr) {
        self.bans.insert(ip, Instant::now() + Duration::from_secs(BAN_DURATION_SECS as u64));
    }

    /// Applies a misbehavior penalty to the peer at `addr`. If it
    /// crosses the ban threshold, the peer is moved to `CLOSING` and its
    /// IP is banned; returns `true` in that case.
    pub fn penalize(&mut self, addr: &SocketAddr, points: u32) -> bool {
        let Some(peer) = self.peers.get_mut(addr) else { return false };
        let banned = peer.penalize(points);
        if banned {
            peer.begin_closing();
            self.ban(addr.ip());
        }
        banned
    }

    /// Elects a header-sync peer if none is active, or rotates away
    /// from the current one if it has made no progress within
    /// [`SYNC_PROGRESS_TIMEOUT`], penalizing the stale peer
    /// (§4.3 "rotate to another peer and penalize the previous one").
    pub fn elect_or_rotate_sync_peer(&mut self) -> Option<SocketAddr> {
        let now = Instant::now();
        let stale = matches!(self.sync_deadline, Some(deadline) if now >= deadline);

        if stale {
            if let Some(stale_addr) = self.sync_peer.take() {
                self.penalize(&stale_addr, penalty::STALE_SYNC);
            }
            self.sync_deadline = None;
        }

        if self.sync_peer.is_none() {
            let candidate = self.peers.values().find(|p| p.is_ready()).map(|p| p.addr);
            if let Some(addr) = candidate {
                self.sync_peer = Some(addr);
                self.sync_deadline = Some(now + SYNC_PROGRESS_TIMEOUT);
            }
        }

        self.sync_peer
    }

    /// Call when the sync peer's `headers` batch advanced the best
    /// chain, resetting its progress deadline.
    pub fn note_sync_progress(&mut self) {
        if self.sync_peer.is_some() {
            self.sync_deadline = Some(Instant::now() + SYNC_PROGRESS_TIMEOUT);
        }
    }

    /// Picks the next ready peer with inflight capacity, round-robin
    /// (§4.3 "Multiplex `getdata` requests... using round-robin").
    pub fn next_getdata_peer(&mut self) -> Option<SocketAddr> {
        let ready: Vec<SocketAddr> = {
            let mut addrs: Vec<SocketAddr> =
                self.peers.values().filter(|p| p.is_ready() && p.has_inflight_capacity()).map(|p| p.addr).collect();
            addrs.sort();
            addrs
        };
        if ready.is_empty() {
            return None;
        }
        self.getdata_cursor = (self.getdata_cursor + 1) % ready.len();
        Some(ready[self.getdata_cursor])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
    }

    fn ready_peer(port: u16) -> Peer {
        let mut peer = Peer::new(addr(port));
        peer.state = PeerState::Ready;
        peer
    }

    #[test]
    fn wants_more_connections_below_target() {
        let group = PeerGroup::new(5, 50);
        assert!(group.wants_more_connections(false));
    }

    #[test]
    fn initial_sync_window_uses_min_peers_init() {
        let mut group = PeerGroup::new(5, 2);
        group.insert(ready_peer(1));
        group.insert(ready_peer(2));
        assert!(!group.wants_more_connections(true));
        assert!(group.wants_more_connections(false));
    }

    #[test]
    fn penalize_past_threshold_bans_the_ip() {
        let mut group = PeerGroup::new(5, 50);
        group.insert(ready_peer(1));
        let banned = group.penalize(&addr(1), penalty::INVALID_HEADER);
        assert!(banned);
        assert!(group.is_banned(&addr(1).ip()));
        assert_eq!(group.get(&addr(1)).unwrap().state, PeerState::Closing);
    }

    #[test]
    fn sync_peer_is_elected_from_ready_peers() {
        let mut group = PeerGroup::new(5, 50);
        group.insert(ready_peer(1));
        let elected = group.elect_or_rotate_sync_peer();
        assert_eq!(elected, Some(addr(1)));
    }

    #[test]
    fn getdata_round_robins_across_ready_peers() {
        let mut group = PeerGroup::new(5, 50);
        group.insert(ready_peer(1));
        group.insert(ready_peer(2));
        let first = group.next_getdata_peer();
        let second = group.next_getdata_peer();
        assert_ne!(first, second);
    }

    #[test]
    fn getdata_skips_peers_without_inflight_capacity() {
        let mut group = PeerGroup::new(5, 50);
        let mut busy = ready_peer(1);
        busy.inflight_requests = crate::peer::MAX_INFLIGHT_REQUESTS;
        group.insert(busy);
        group.insert(ready_peer(2));
        let picked = group.next_getdata_peer();
        assert_eq!(picked, Some(addr(2)));
    }

    #[test]
    fn removing_the_sync_peer_clears_election_state() {
        let mut group = PeerGroup::new(5, 50);
        group.insert(ready_peer(1));
        group.elect_or_rotate_sync_peer();
        group.remove(&addr(1));
        assert!(group.elect_or_rotate_sync_peer().is_none());
    }
}
