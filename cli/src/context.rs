//! The node composition root (§9 "single explicit node context"): the
//! one place that owns the chain index, address book, peer group,
//! reactor, worker pool and wallet, and drives them all from a single
//! `Reactor::poll_once` loop. No other module reaches across these
//! boundaries directly.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use mio::Token;
use tracing::{debug, info, warn};

use bitc_core::chain::header::{BlockHeader, GENESIS_PREV_HASH};
use bitc_core::chain::index::{AcceptOutcome, ChainIndex};
use bitc_core::chain::merkle::PartialMerkleTree;
use bitc_core::config::Config;
use bitc_core::crypto::hash::{hash160, Hash256};
use bitc_core::events::{ChainEvent, EventBus, PeerEvent, WalletEvent};
use bitc_core::wire::message::{
    GetHeadersPayload, InvPayload, Message, MerkleBlockPayload, Transaction, VersionPayload,
};
use bitc_core::wire::primitives::{InvType, InventoryVector, NetAddr};
use bitc_core::bloom::{BloomFilter, BloomFlags};

use bitc_net::addrbook::{AddrBook, AddrEntry};
use bitc_net::connection::Connection;
use bitc_net::group::PeerGroup;
use bitc_net::peer::{penalty, Peer, PeerState};
use bitc_net::pool::WorkerPool;
use bitc_net::reactor::Reactor;
use bitc_net::socks5;

use bitc_wallet::keystore::Wallet;
use bitc_wallet::ledger::Ledger;

use crate::error::Result;

const PROTOCOL_VERSION: i32 = 70016;
const USER_AGENT: &str = "/bitc:0.1.0/";

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
const PING_INTERVAL: Duration = Duration::from_secs(90);
const SYNC_TICK_INTERVAL: Duration = Duration::from_secs(5);
const RECONNECT_INTERVAL: Duration = Duration::from_secs(10);
/// §4.3 "Rebroadcast outbound wallet transactions every 15 minutes
/// until observed in the chain or evicted."
const REBROADCAST_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// What a fired timer id was scheduled for; the reactor only knows ids,
/// this map gives them back their meaning.
enum TimerKind {
    Ping,
    SyncTick,
    Reconnect,
    Rebroadcast,
    Handshake(Token),
}

/// Everything needed to talk to one connected peer: the raw connection,
/// keyed by the token the reactor reports readiness events against.
struct PeerSlot {
    connection: Connection,
}

/// An outbound wallet transaction kept around so it can be resent by
/// the rebroadcast timer until it is observed confirmed or evicted.
struct OutboundTx {
    tx: Transaction,
    first_seen: SystemTime,
}

/// The live node: every long-lived collaborator plus the bookkeeping
/// the event loop needs to route readiness events back to peers.
pub struct NodeContext {
    config: Config,
    state_dir: PathBuf,
    chain: ChainIndex,
    addr_book: AddrBook,
    peer_group: PeerGroup,
    reactor: Reactor,
    worker_pool: Option<WorkerPool>,
    wallet: Option<Wallet>,
    ledger: Ledger,
    chain_events: EventBus<ChainEvent>,
    wallet_events: EventBus<WalletEvent>,
    peer_events: EventBus<PeerEvent>,
    slots: HashMap<Token, PeerSlot>,
    token_of_addr: HashMap<SocketAddr, Token>,
    next_token: usize,
    timers: HashMap<u64, TimerKind>,
    shutdown: Arc<AtomicBool>,
    initial_sync: bool,
    /// Kept in memory only while the wallet is unlocked; needed again
    /// for the change-address re-encryption step of every send.
    wallet_passphrase: Option<String>,
    /// Our own unconfirmed outbound transactions, resent by the
    /// rebroadcast timer until observed confirmed or evicted.
    outbound_pending: HashMap<Hash256, OutboundTx>,
    /// Txids matched in a merkleblock, along with the height of that
    /// block, awaiting the `tx` response to a follow-up `getdata` so
    /// the ledger can be told they confirmed.
    awaiting_confirmation: HashMap<Hash256, u32>,
}

impl NodeContext {
    /// Opens on-disk state under `state_dir` (headers, address book,
    /// optionally the wallet file) and builds every in-memory
    /// collaborator. Does not dial any peers yet.
    pub fn open(state_dir: PathBuf, config: Config) -> Result<Self> {
        std::fs::create_dir_all(&state_dir)?;
        let chain = ChainIndex::open(&state_dir, config.network)?;
        let addr_book = AddrBook::load(&state_dir, bitc_net::addrbook::DEFAULT_CAPACITY)?;
        let peer_group = PeerGroup::new(config.target_peer_count, config.min_peers_init);
        let reactor = Reactor::new()?;
        let worker_pool = WorkerPool::new(config.worker_pool_size);

        let wallet = match Wallet::load(&state_dir) {
            Ok(wallet) => Some(wallet),
            Err(_) => None,
        };

        Ok(NodeContext {
            config,
            state_dir,
            chain,
            addr_book,
            peer_group,
            reactor,
            worker_pool: Some(worker_pool),
            wallet,
            ledger: Ledger::new(),
            chain_events: EventBus::new(),
            wallet_events: EventBus::new(),
            peer_events: EventBus::new(),
            slots: HashMap::new(),
            token_of_addr: HashMap::new(),
            next_token: 1, // token 0 is reserved for the reactor's wake pipe
            timers: HashMap::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            initial_sync: true,
            wallet_passphrase: None,
            outbound_pending: HashMap::new(),
            awaiting_confirmation: HashMap::new(),
        })
    }

    pub fn chain(&self) -> &ChainIndex {
        &self.chain
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn wallet(&self) -> Option<&Wallet> {
        self.wallet.as_ref()
    }

    pub fn wallet_mut(&mut self) -> Option<&mut Wallet> {
        self.wallet.as_mut()
    }

    pub fn peer_count(&self) -> usize {
        self.peer_group.ready_count()
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// A clonable handle other threads can use to wake a blocked
    /// `poll_once`, e.g. after enqueueing an out-of-band command.
    pub fn waker(&self) -> Result<bitc_net::reactor::Waker> {
        Ok(self.reactor.waker()?)
    }

    pub fn best_height(&self) -> u32 {
        self.chain.best_height()
    }

    pub fn confirmed_plus_unconfirmed_balance_sat(&self) -> u64 {
        self.ledger.confirmed_balance_sat() + self.ledger.unconfirmed_balance_sat()
    }

    /// Estimated header-sync progress, for [`StatusSnapshot`]. Once a
    /// `headers` batch shorter than 2000 headers has been seen,
    /// [`Self::initial_sync`] has cleared and we report fully synced;
    /// until then, progress is our best height over the highest height
    /// any ready peer announced at handshake.
    pub fn sync_percent(&self) -> f64 {
        if !self.initial_sync {
            return 100.0;
        }
        let target = self.peer_group.best_known_peer_height();
        if target <= 0 {
            return 0.0;
        }
        let progress = (self.chain.best_height() as f64 / target as f64) * 100.0;
        progress.min(100.0)
    }

    /// Unlocks the loaded wallet and keeps the passphrase in memory for
    /// the change-address step every subsequent send needs.
    pub fn unlock_wallet(&mut self, passphrase: &str) -> Result<()> {
        let wallet = self.wallet.as_mut().ok_or(crate::error::Error::WalletUnavailable)?;
        wallet.unlock(passphrase)?;
        self.wallet_passphrase = Some(passphrase.to_string());
        Ok(())
    }

    pub fn lock_wallet(&mut self) {
        if let Some(wallet) = self.wallet.as_mut() {
            wallet.lock();
        }
        self.wallet_passphrase = None;
    }

    pub fn generate_new_address(&mut self) -> Result<[u8; 33]> {
        let passphrase = self.wallet_passphrase.clone().ok_or(crate::error::Error::WalletUnavailable)?;
        let wallet = self.wallet.as_mut().ok_or(crate::error::Error::WalletUnavailable)?;
        Ok(wallet.generate_address(&passphrase)?)
    }

    /// Builds, signs and relays a transaction to every ready peer,
    /// marking the inputs it spends and returning its txid.
    pub fn submit_tx(&mut self, recipient: &str, amount_sat: u64, fee_rate_sat_per_vbyte: u64) -> Result<Hash256> {
        let passphrase = self.wallet_passphrase.clone().ok_or(crate::error::Error::WalletUnavailable)?;
        let wallet = self.wallet.as_mut().ok_or(crate::error::Error::WalletUnavailable)?;
        let tx = bitc_wallet::txbuilder::build_and_sign_transaction(
            wallet,
            &self.ledger,
            &passphrase,
            recipient,
            self.config.network,
            amount_sat,
            fee_rate_sat_per_vbyte,
        )?;
        let txid = tx.txid();
        for input in &tx.inputs {
            self.ledger.mark_spent(input.previous_output.txid, input.previous_output.vout, txid);
        }
        self.outbound_pending.insert(txid, OutboundTx { tx: tx.clone(), first_seen: SystemTime::now() });
        self.broadcast_tx(&tx)?;
        Ok(txid)
    }

    /// Resends every still-unconfirmed outbound transaction, dropping
    /// any that have sat unconfirmed longer than
    /// [`bitc_wallet::ledger::UNCONFIRMED_EVICTION`] (§4.3).
    fn rebroadcast_outbound(&mut self) -> Result<()> {
        let now = SystemTime::now();
        let stale: Vec<Hash256> = self
            .outbound_pending
            .iter()
            .filter(|(_, o)| now.duration_since(o.first_seen).unwrap_or_default() > bitc_wallet::ledger::UNCONFIRMED_EVICTION)
            .map(|(txid, _)| *txid)
            .collect();
        for txid in stale {
            self.outbound_pending.remove(&txid);
        }

        let txs: Vec<Transaction> = self.outbound_pending.values().map(|o| o.tx.clone()).collect();
        for tx in &txs {
            self.broadcast_tx(tx)?;
        }
        Ok(())
    }

    fn broadcast_tx(&mut self, tx: &Transaction) -> Result<()> {
        let message = Message::Tx(tx.clone());
        let ready_tokens: Vec<Token> = self
            .slots
            .iter()
            .filter(|(_, slot)| self.peer_group.get(&slot.connection.addr).map(|p| p.is_ready()).unwrap_or(false))
            .map(|(token, _)| *token)
            .collect();
        for token in ready_tokens {
            if let Some(slot) = self.slots.get_mut(&token) {
                slot.connection.queue_message(&message, self.config.network)?;
            }
            self.rearm_interest(token)?;
        }
        Ok(())
    }

    fn next_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    /// Connects to every statically configured peer plus enough address
    /// book candidates to reach the initial-sync target. Failures to
    /// dial an individual candidate are logged and skipped, not fatal.
    pub fn dial_initial_peers(&mut self) -> Result<()> {
        let targets = self.resolve_static_peers();
        for addr in targets {
            if let Err(e) = self.dial(addr) {
                warn!(%addr, error = %e, "failed to dial configured peer");
            }
        }

        let wanted = self.config.min_peers_init.saturating_sub(self.peer_group.ready_count());
        if wanted > 0 {
            let exclude: Vec<Ipv6Addr> = Vec::new();
            let candidates = self.addr_book.candidates(wanted, &exclude);
            for candidate in candidates {
                let addr = SocketAddr::new(IpAddr::V6(candidate.addr), candidate.port);
                if let Err(e) = self.dial(addr) {
                    warn!(%addr, error = %e, "failed to dial address book candidate");
                }
            }
        }

        self.schedule_recurring_timers();
        Ok(())
    }

    fn resolve_static_peers(&self) -> Vec<SocketAddr> {
        let mut out = Vec::new();
        for entry in &self.config.resolve_peers {
            match entry.to_socket_addrs() {
                Ok(addrs) => out.extend(addrs),
                Err(e) => warn!(peer = %entry, error = %e, "could not resolve configured peer"),
            }
        }
        out
    }

    fn schedule_recurring_timers(&mut self) {
        let ping_id = self.reactor.schedule_timer(PING_INTERVAL);
        self.timers.insert(ping_id, TimerKind::Ping);
        let sync_id = self.reactor.schedule_timer(SYNC_TICK_INTERVAL);
        self.timers.insert(sync_id, TimerKind::SyncTick);
        let reconnect_id = self.reactor.schedule_timer(RECONNECT_INTERVAL);
        self.timers.insert(reconnect_id, TimerKind::Reconnect);
        let rebroadcast_id = self.reactor.schedule_timer(REBROADCAST_INTERVAL);
        self.timers.insert(rebroadcast_id, TimerKind::Rebroadcast);
    }

    /// Dials `addr`, either directly or through the configured SOCKS5
    /// proxy, registers the resulting connection with the reactor, and
    /// starts the handshake clock.
    fn dial(&mut self, addr: SocketAddr) -> Result<()> {
        if self.peer_group.is_banned(&addr.ip()) {
            return Ok(());
        }

        let token = self.next_token();
        let mut connection = if self.config.use_socks5 {
            let proxy = (self.config.socks5_hostname.as_str(), self.config.socks5_port);
            let target = (addr.ip().to_string(), addr.port());
            let std_stream = socks5::dial_via_socks5(proxy, (&target.0, target.1))?;
            std_stream.set_nonblocking(true)?;
            Connection::from_stream(mio::net::TcpStream::from_std(std_stream), addr, token)
        } else {
            Connection::connect(addr, token)?
        };

        self.reactor.register(&mut connection.stream, token, connection.interests())?;

        let mut peer = Peer::new(addr);
        peer.state = PeerState::Connecting;
        self.peer_group.insert(peer);
        self.slots.insert(token, PeerSlot { connection });
        self.token_of_addr.insert(addr, token);

        self.send_version(token)?;
        let handshake_id = self.reactor.schedule_timer(HANDSHAKE_TIMEOUT);
        self.timers.insert(handshake_id, TimerKind::Handshake(token));

        Ok(())
    }

    fn send_version(&mut self, token: Token) -> Result<()> {
        let Some(slot) = self.slots.get_mut(&token) else { return Ok(()) };
        let version = Message::Version(VersionPayload {
            version: PROTOCOL_VERSION,
            services: 0,
            timestamp: unix_time_now(),
            receiver: NetAddr::new_v4(0, Ipv4Addr::UNSPECIFIED, slot.connection.addr.port()),
            sender: NetAddr::new_v4(0, Ipv4Addr::UNSPECIFIED, 0),
            nonce: rand_nonce(),
            user_agent: USER_AGENT.to_string(),
            start_height: self.chain.best_height() as i32,
            relay: true,
        });
        slot.connection.queue_message(&version, self.config.network)?;
        if let Some(peer) = self.peer_group.get_mut(&slot.connection.addr) {
            peer.state = PeerState::HandshakeSent;
        }
        self.rearm_interest(token)?;
        Ok(())
    }

    fn rearm_interest(&mut self, token: Token) -> Result<()> {
        if let Some(slot) = self.slots.get_mut(&token) {
            let interests = slot.connection.interests();
            self.reactor.reregister(&mut slot.connection.stream, token, interests)?;
        }
        Ok(())
    }

    /// Runs one iteration of the event loop: blocks in `poll_once`,
    /// then dispatches whatever it reports. Callers loop this until
    /// `shutdown_flag` is set.
    pub fn run_once(&mut self) -> Result<()> {
        let outcome = self.reactor.poll_once()?;

        for timer_id in &outcome.fired_timers {
            if let Some(kind) = self.timers.remove(timer_id) {
                self.handle_timer(kind)?;
            }
        }

        let events: Vec<(Token, bool, bool, bool)> = outcome
            .events
            .iter()
            .map(|e| (e.token(), e.is_readable(), e.is_writable(), e.is_read_closed() || e.is_write_closed()))
            .collect();

        for (token, readable, writable, closed) in events {
            if token == bitc_net::reactor::WAKE_TOKEN {
                continue;
            }
            if closed {
                self.disconnect(token, "connection closed");
                continue;
            }
            if writable {
                if let Err(e) = self.flush(token) {
                    warn!(?token, error = %e, "write failed");
                    self.disconnect(token, "write error");
                    continue;
                }
            }
            if readable {
                if let Err(e) = self.drain_readable(token) {
                    warn!(?token, error = %e, "read failed");
                    self.disconnect(token, "read error");
                }
            }
        }

        Ok(())
    }

    fn flush(&mut self, token: Token) -> Result<()> {
        if let Some(slot) = self.slots.get_mut(&token) {
            slot.connection.flush_writes()?;
        }
        Ok(())
    }

    fn drain_readable(&mut self, token: Token) -> Result<()> {
        let network = self.config.network;
        let messages = match self.slots.get_mut(&token) {
            Some(slot) => slot.connection.read_messages(network)?,
            None => return Ok(()),
        };
        for message in messages {
            self.handle_message(token, message)?;
        }
        Ok(())
    }

    fn handle_timer(&mut self, kind: TimerKind) -> Result<()> {
        match kind {
            TimerKind::Ping => {
                self.broadcast_pings()?;
                let id = self.reactor.schedule_timer(PING_INTERVAL);
                self.timers.insert(id, TimerKind::Ping);
            }
            TimerKind::SyncTick => {
                self.drive_header_sync()?;
                self.ledger.evict_stale_pending();
                let id = self.reactor.schedule_timer(SYNC_TICK_INTERVAL);
                self.timers.insert(id, TimerKind::SyncTick);
            }
            TimerKind::Reconnect => {
                if self.peer_group.wants_more_connections(self.initial_sync) {
                    self.dial_initial_peers()?;
                }
                let id = self.reactor.schedule_timer(RECONNECT_INTERVAL);
                self.timers.insert(id, TimerKind::Reconnect);
            }
            TimerKind::Rebroadcast => {
                self.rebroadcast_outbound()?;
                let id = self.reactor.schedule_timer(REBROADCAST_INTERVAL);
                self.timers.insert(id, TimerKind::Rebroadcast);
            }
            TimerKind::Handshake(token) => {
                if let Some(slot) = self.slots.get(&token) {
                    let still_handshaking = self
                        .peer_group
                        .get(&slot.connection.addr)
                        .map(|p| matches!(p.state, PeerState::Connecting | PeerState::HandshakeSent | PeerState::HandshakeAck))
                        .unwrap_or(false);
                    if still_handshaking {
                        warn!(addr = %slot.connection.addr, "handshake timed out");
                        self.disconnect(token, "handshake timeout");
                    }
                }
            }
        }
        Ok(())
    }

    fn broadcast_pings(&mut self) -> Result<()> {
        let tokens: Vec<Token> = self.slots.keys().copied().collect();
        for token in tokens {
            let nonce = rand_nonce();
            let addr = match self.slots.get(&token) {
                Some(slot) => slot.connection.addr,
                None => continue,
            };
            let ready = self.peer_group.get(&addr).map(|p| p.is_ready()).unwrap_or(false);
            if !ready {
                continue;
            }
            if let Some(slot) = self.slots.get_mut(&token) {
                slot.connection.queue_message(&Message::Ping { nonce }, self.config.network)?;
            }
            if let Some(peer) = self.peer_group.get_mut(&addr) {
                peer.last_ping_nonce = Some(nonce);
            }
            self.rearm_interest(token)?;
        }
        Ok(())
    }

    /// Elects or rotates the header-sync peer and, if one is active,
    /// sends it a fresh `getheaders` built from the current best chain.
    fn drive_header_sync(&mut self) -> Result<()> {
        let Some(sync_addr) = self.peer_group.elect_or_rotate_sync_peer() else { return Ok(()) };
        let Some(&token) = self.token_of_addr.get(&sync_addr) else { return Ok(()) };
        self.send_getheaders(token)
    }

    fn send_getheaders(&mut self, token: Token) -> Result<()> {
        let locator = bitc_net::locator::build_locator(&self.ancestors_to_genesis());
        let message = Message::GetHeaders(GetHeadersPayload { version: PROTOCOL_VERSION, locator_hashes: locator, stop_hash: GENESIS_PREV_HASH });
        if let Some(slot) = self.slots.get_mut(&token) {
            slot.connection.queue_message(&message, self.config.network)?;
        }
        self.rearm_interest(token)
    }

    /// Walks the best chain from its tip back to genesis. `ChainIndex`
    /// only exposes ancestor lookups one hop at a time, so the locator
    /// builder is fed this fully materialized path rather than reaching
    /// into the index's internals itself.
    fn ancestors_to_genesis(&self) -> Vec<Hash256> {
        let mut path = Vec::new();
        let mut cursor = self.chain.best_tip_hash();
        loop {
            let Some(record) = self.chain.get(&cursor) else { break };
            path.push(cursor);
            if record.header.prev_hash == GENESIS_PREV_HASH {
                break;
            }
            cursor = record.header.prev_hash;
        }
        path
    }

    fn handle_message(&mut self, token: Token, message: Message) -> Result<()> {
        let addr = match self.slots.get(&token) {
            Some(slot) => slot.connection.addr,
            None => return Ok(()),
        };

        match message {
            Message::Version(v) => self.on_version(token, addr, v)?,
            Message::Verack => self.on_verack(token, addr)?,
            Message::Ping { nonce } => {
                if let Some(slot) = self.slots.get_mut(&token) {
                    slot.connection.queue_message(&Message::Pong { nonce }, self.config.network)?;
                }
                self.rearm_interest(token)?;
            }
            Message::Pong { nonce } => {
                if let Some(peer) = self.peer_group.get_mut(&addr) {
                    if peer.last_ping_nonce == Some(nonce) {
                        peer.last_ping_nonce = None;
                    }
                }
            }
            Message::Headers(h) => self.on_headers(token, addr, h.headers)?,
            Message::MerkleBlock(m) => self.on_merkleblock(addr, m)?,
            Message::Tx(tx) => self.on_tx(addr, tx)?,
            Message::Inv(i) => self.on_inv(i.items)?,
            Message::NotFound(nf) => self.on_notfound(addr, nf.items),
            Message::Addr(a) => {
                for item in a.addresses {
                    self.addr_book.upsert(AddrEntry {
                        last_success: 0,
                        attempts: 0,
                        addr: item.addr.ip,
                        port: item.addr.port,
                        services: item.addr.services,
                    });
                }
            }
            Message::Reject(r) => {
                debug!(%addr, message = %r.message, reason = %r.reason, "peer sent reject");
            }
            Message::GetHeaders(_) | Message::GetAddr | Message::GetData(_)
            | Message::FilterAdd { .. } | Message::FilterClear
            | Message::FilterLoad(_) | Message::SendHeaders | Message::Block(_)
            | Message::Unknown { .. } => {
                // Not served or not expected from a peer by this client
                // (§1 Non-goals: no full-validating/serving role).
            }
        }
        Ok(())
    }

    fn on_version(&mut self, token: Token, addr: SocketAddr, v: VersionPayload) -> Result<()> {
        let expects_version = self
            .peer_group
            .get(&addr)
            .map(|p| p.state == PeerState::HandshakeSent)
            .unwrap_or(false);
        if !expects_version {
            self.penalize(addr, penalty::PROTOCOL_STATE_VIOLATION);
            return Ok(());
        }

        if let Some(peer) = self.peer_group.get_mut(&addr) {
            peer.negotiated_version = Some(v.version);
            peer.services = v.services;
            peer.height_at_handshake = v.start_height;
            peer.state = PeerState::HandshakeAck;
        }

        if let Some(slot) = self.slots.get_mut(&token) {
            slot.connection.queue_message(&Message::Verack, self.config.network)?;
        }
        self.rearm_interest(token)
    }

    fn on_verack(&mut self, token: Token, addr: SocketAddr) -> Result<()> {
        let expects_verack = self
            .peer_group
            .get(&addr)
            .map(|p| p.state == PeerState::HandshakeAck)
            .unwrap_or(false);
        if !expects_verack {
            self.penalize(addr, penalty::PROTOCOL_STATE_VIOLATION);
            return Ok(());
        }
        if let Some(peer) = self.peer_group.get_mut(&addr) {
            peer.state = PeerState::Ready;
        }
        self.addr_book.record_success(ipv4_mapped(addr.ip()), addr.port(), unix_time_now().max(0) as u32);
        self.peer_events.publish(PeerEvent::Connected { addr: addr.to_string() });
        info!(%addr, "peer handshake complete");

        if let Some(slot) = self.slots.get_mut(&token) {
            if let Some(filter) = self.wallet_bloom_filter() {
                let load = Message::FilterLoad(bitc_core::wire::message::FilterLoadPayload {
                    filter_bytes: filter.bits().to_vec(),
                    hash_funcs: filter.hash_count(),
                    tweak: filter.tweak(),
                    flags: 0,
                });
                slot.connection.queue_message(&load, self.config.network)?;
            }
            slot.connection.queue_message(&Message::SendHeaders, self.config.network)?;
            slot.connection.queue_message(&Message::GetAddr, self.config.network)?;
        }
        self.rearm_interest(token)?;
        self.send_getheaders(token)
    }

    fn wallet_bloom_filter(&self) -> Option<BloomFilter> {
        let wallet = self.wallet.as_ref()?;
        let keys = wallet.public_keys();
        if keys.is_empty() {
            return None;
        }
        let mut filter = BloomFilter::new(keys.len() * 2, self.config.bloom_false_positive_rate, rand_nonce() as u32);
        for pk in keys {
            filter.insert(pk);
            filter.insert(&hash160(pk));
        }
        filter.set_flags(BloomFlags::None);
        Some(filter)
    }

    fn on_headers(&mut self, token: Token, addr: SocketAddr, headers: Vec<BlockHeader>) -> Result<()> {
        let batch_len = headers.len();
        let mut advanced = false;
        for header in headers {
            match self.chain.accept_header(header, &self.chain_events) {
                Ok(AcceptOutcome::Accepted(_)) => advanced = true,
                Ok(AcceptOutcome::Duplicate) | Ok(AcceptOutcome::Orphan) => {}
                Err(bitc_core::Error::InvalidProofOfWork) | Err(bitc_core::Error::BadDifficultyBits { .. }) => {
                    self.penalize(addr, penalty::INVALID_HEADER);
                    return Ok(());
                }
                Err(e) => {
                    warn!(%addr, error = %e, "header store error");
                    return Ok(());
                }
            }
        }
        if advanced {
            self.peer_group.note_sync_progress();
        }
        if batch_len >= 2000 {
            self.send_getheaders(token)?;
        } else {
            self.initial_sync = false;
        }
        Ok(())
    }

    /// Peers announce new blocks and mempool transactions via `inv`;
    /// request the wallet-relevant ones with `getdata`, always asking
    /// for the filtered form of a block rather than the full form
    /// (§4.3 "the client issues `getdata` with type `MSG_FILTERED_BLOCK`
    /// for new blocks, `MSG_TX` for unconfirmed txs").
    fn on_inv(&mut self, items: Vec<InventoryVector>) -> Result<()> {
        let wanted: Vec<InventoryVector> = items
            .into_iter()
            .filter_map(|item| match item.kind() {
                Some(InvType::Tx) => Some(InventoryVector::new(InvType::Tx, item.hash)),
                Some(InvType::Block) | Some(InvType::FilteredBlock) => {
                    Some(InventoryVector::new(InvType::FilteredBlock, item.hash))
                }
                _ => None,
            })
            .collect();
        self.dispatch_getdata(wanted)
    }

    fn on_notfound(&mut self, addr: SocketAddr, _items: Vec<InventoryVector>) {
        self.note_getdata_fulfilled(addr);
    }

    /// Sends a single `getdata` batch to the next round-robin peer with
    /// inflight capacity (§4.3 "Multiplex `getdata` requests... using
    /// round-robin with a per-peer inflight cap").
    fn dispatch_getdata(&mut self, items: Vec<InventoryVector>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let Some(peer_addr) = self.peer_group.next_getdata_peer() else { return Ok(()) };
        let Some(&token) = self.token_of_addr.get(&peer_addr) else { return Ok(()) };
        if let Some(slot) = self.slots.get_mut(&token) {
            slot.connection.queue_message(&Message::GetData(InvPayload { items }), self.config.network)?;
        }
        if let Some(peer) = self.peer_group.get_mut(&peer_addr) {
            peer.inflight_requests += 1;
        }
        self.rearm_interest(token)
    }

    fn note_getdata_fulfilled(&mut self, addr: SocketAddr) {
        if let Some(peer) = self.peer_group.get_mut(&addr) {
            peer.inflight_requests = peer.inflight_requests.saturating_sub(1);
        }
    }

    fn on_merkleblock(&mut self, addr: SocketAddr, m: MerkleBlockPayload) -> Result<()> {
        self.note_getdata_fulfilled(addr);
        let Some(record) = self.chain.get(&m.header.hash()) else {
            // Peer proved a block we haven't linked into the chain yet;
            // nothing to verify it against.
            return Ok(());
        };
        let height = record.height;
        let tree = PartialMerkleTree {
            total_transactions: m.total_transactions,
            hashes: m.hashes,
            flags: unpack_flag_bits(&m.flag_bytes),
        };
        match tree.extract_matches() {
            Ok((root, matches)) if root == m.header.merkle_root => {
                self.request_matched_transactions(matches, height)?;
            }
            _ => {
                self.penalize(addr, penalty::MERKLE_MISMATCH);
            }
        }
        Ok(())
    }

    /// A merkleblock only proves which txids matched the wallet's
    /// filter, not their contents; fetch the full transactions so their
    /// outputs/inputs can update the ledger when they arrive as `tx`
    /// messages (§4.3).
    fn request_matched_transactions(&mut self, matches: Vec<(u32, Hash256)>, height: u32) -> Result<()> {
        if matches.is_empty() {
            return Ok(());
        }
        let items = matches
            .into_iter()
            .map(|(_, txid)| {
                self.awaiting_confirmation.insert(txid, height);
                InventoryVector::new(InvType::Tx, txid)
            })
            .collect();
        self.dispatch_getdata(items)
    }

    fn on_tx(&mut self, addr: SocketAddr, tx: Transaction) -> Result<()> {
        self.note_getdata_fulfilled(addr);
        let txid = tx.txid();
        let confirmed_height = self.awaiting_confirmation.remove(&txid);
        let mut matched = false;

        if let Some(wallet) = self.wallet.as_ref() {
            let hashes: Vec<[u8; 20]> = wallet.public_keys().iter().map(|pk| hash160(pk)).collect();
            for (vout, output) in tx.outputs.iter().enumerate() {
                if let Some(hash) = script_pubkey_hash(&output.script_pubkey) {
                    if hashes.contains(&hash) {
                        self.ledger.observe_output(txid, vout as u32, output.script_pubkey.clone(), output.value_sat, confirmed_height);
                        matched = true;
                    }
                }
            }
        }

        for input in &tx.inputs {
            if self.ledger.owns_utxo(&input.previous_output.txid, input.previous_output.vout) {
                self.ledger.mark_spent(input.previous_output.txid, input.previous_output.vout, txid);
                matched = true;
            }
        }

        if let Some(height) = confirmed_height {
            self.ledger.confirm(txid, height);
            self.outbound_pending.remove(&txid);
            matched = true;
        }

        if matched {
            self.wallet_events.publish(WalletEvent::NewObservation { txid });
            self.wallet_events.publish(WalletEvent::BalanceChanged {
                new_balance_sat: self.ledger.confirmed_balance_sat() + self.ledger.unconfirmed_balance_sat(),
            });
        }
        Ok(())
    }

    fn penalize(&mut self, addr: SocketAddr, points: u32) {
        let banned = self.peer_group.penalize(&addr, points);
        if banned {
            self.peer_events.publish(PeerEvent::Banned { addr: addr.to_string() });
            if let Some(&token) = self.token_of_addr.get(&addr) {
                self.disconnect(token, "misbehavior threshold crossed");
            }
        }
    }

    fn disconnect(&mut self, token: Token, reason: &str) {
        if let Some(mut slot) = self.slots.remove(&token) {
            let _ = self.reactor.deregister(&mut slot.connection.stream);
            self.token_of_addr.remove(&slot.connection.addr);
            self.peer_group.remove(&slot.connection.addr);
            self.peer_events.publish(PeerEvent::Disconnected { addr: slot.connection.addr.to_string() });
            debug!(addr = %slot.connection.addr, reason, "peer disconnected");
        }
    }

    /// Saves the address book and joins the worker pool. The reactor
    /// and its sockets are dropped along with `self`.
    pub fn shutdown(mut self) -> Result<()> {
        self.addr_book.save(&self.state_dir)?;
        if let Some(pool) = self.worker_pool.take() {
            pool.shutdown();
        }
        Ok(())
    }
}

/// Extracts the 20-byte hash from a standard P2PKH scriptPubKey.
fn script_pubkey_hash(script: &[u8]) -> Option<[u8; 20]> {
    if script.len() == 25 && script[0] == 0x76 && script[1] == 0xA9 && script[2] == 0x14 && script[23] == 0x88 && script[24] == 0xAC {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&script[3..23]);
        Some(hash)
    } else {
        None
    }
}

/// Unpacks a BIP37 flag-byte stream into one bool per bit, least
/// significant bit of each byte first.
fn unpack_flag_bits(bytes: &[u8]) -> Vec<bool> {
    let mut bits = Vec::with_capacity(bytes.len() * 8);
    for byte in bytes {
        for i in 0..8 {
            bits.push((byte >> i) & 1 == 1);
        }
    }
    bits
}

fn ipv4_mapped(ip: IpAddr) -> Ipv6Addr {
    match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        IpAddr::V6(v6) => v6,
    }
}

fn rand_nonce() -> u64 {
    use rand::RngCore;
    rand::thread_rng().next_u64()
}

fn unix_time_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
