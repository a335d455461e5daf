//! Persisted candidate peer endpoints (§3 "Address book entry", §6
//! `peers.dat`). Entries are scored by recency of success and attempt
//! count so the peer group prefers not-recently-tried candidates.

use std::io::{Read, Write};
use std::net::Ipv6Addr;
use std::path::Path;

use crate::error::{Error, Result};

const MAGIC: &[u8; 4] = b"PEER";

/// One candidate endpoint and its connection history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrEntry {
    pub last_success: u32,
    pub attempts: u32,
    pub addr: Ipv6Addr,
    pub port: u16,
    pub services: u64,
}

impl AddrEntry {
    fn encode(&self, w: &mut impl Write) -> std::io::Result<()> {
        w.write_all(&self.last_success.to_le_bytes())?;
        w.write_all(&self.attempts.to_le_bytes())?;
        w.write_all(&self.addr.octets())?;
        w.write_all(&self.port.to_be_bytes())?;
        w.write_all(&self.services.to_le_bytes())
    }

    fn decode(r: &mut impl Read) -> std::io::Result<Self> {
        let mut last_success = [0u8; 4];
        r.read_exact(&mut last_success)?;
        let mut attempts = [0u8; 4];
        r.read_exact(&mut attempts)?;
        let mut addr = [0u8; 16];
        r.read_exact(&mut addr)?;
        let mut port = [0u8; 2];
        r.read_exact(&mut port)?;
        let mut services = [0u8; 8];
        r.read_exact(&mut services)?;
        Ok(AddrEntry {
            last_success: u32::from_le_bytes(last_success),
            attempts: u32::from_le_bytes(attempts),
            addr: Ipv6Addr::from(addr),
            port: u16::from_be_bytes(port),
            services: u64::from_le_bytes(services),
        })
    }

    /// Lower is more attractive: entries with a recent success and few
    /// failed attempts are tried first.
    fn rank_key(&self) -> (u32, std::cmp::Reverse<u32>) {
        (self.attempts, std::cmp::Reverse(self.last_success))
    }
}

/// The default quota of entries retained (§3 "pruned on quota").
pub const DEFAULT_CAPACITY: usize = 2_000;

/// In-memory address book backed by `peers.dat`.
pub struct AddrBook {
    entries: Vec<AddrEntry>,
    capacity: usize,
}

impl AddrBook {
    pub fn new(capacity: usize) -> Self {
        AddrBook { entries: Vec::new(), capacity }
    }

    /// Loads `<dir>/peers.dat`, or starts an empty book if absent.
    pub fn load(dir: &Path, capacity: usize) -> Result<Self> {
        let path = dir.join("peers.dat");
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(AddrBook::new(capacity)),
            Err(e) => return Err(Error::Io(e)),
        };

        let mut cursor = std::io::Cursor::new(&bytes);
        let mut magic = [0u8; 4];
        cursor
            .read_exact(&mut magic)
            .map_err(|e| Error::AddrBookCorrupt(e.to_string()))?;
        if &magic != MAGIC {
            return Err(Error::AddrBookCorrupt("bad magic".to_string()));
        }
        let mut count_buf = [0u8; 4];
        cursor
            .read_exact(&mut count_buf)
            .map_err(|e| Error::AddrBookCorrupt(e.to_string()))?;
        let count = u32::from_le_bytes(count_buf);

        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(AddrEntry::decode(&mut cursor).map_err(|e| Error::AddrBookCorrupt(e.to_string()))?);
        }
        Ok(AddrBook { entries, capacity })
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let mut buf = Vec::new();
        buf.write_all(MAGIC)?;
        buf.write_all(&(self.entries.len() as u32).to_le_bytes())?;
        for entry in &self.entries {
            entry.encode(&mut buf)?;
        }
        std::fs::write(dir.join("peers.dat"), buf)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts or refreshes an entry, then prunes to `capacity` by
    /// discarding the least attractive entries.
    pub fn upsert(&mut self, entry: AddrEntry) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.addr == entry.addr && e.port == entry.port) {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
        if self.entries.len() > self.capacity {
            self.entries.sort_by_key(|e| e.rank_key());
            self.entries.truncate(self.capacity);
        }
    }

    pub fn record_attempt(&mut self, addr: Ipv6Addr, port: u16) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.addr == addr && e.port == port) {
            entry.attempts += 1;
        }
    }

    pub fn record_success(&mut self, addr: Ipv6Addr, port: u16, now: u32) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.addr == addr && e.port == port) {
            entry.last_success = now;
            entry.attempts = 0;
        }
    }

    /// Returns up to `count` candidates, preferring entries with fewer
    /// attempts and more recent successes (§4.3 "preferring
    /// not-recently-tried entries"), excluding any address already in
    /// `exclude`.
    pub fn candidates(&self, count: usize, exclude: &[Ipv6Addr]) -> Vec<AddrEntry> {
        let mut ranked: Vec<&AddrEntry> =
            self.entries.iter().filter(|e| !exclude.contains(&e.addr)).collect();
        ranked.sort_by_key(|e| e.rank_key());
        ranked.into_iter().take(count).copied().collect()
    }
}
