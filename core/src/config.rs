//! Runtime configuration for **bitc**.
//!
//! [`Config`] centralises the tunables named in the external-interfaces
//! section of the design: which network to join, whether to dial peers
//! through a SOCKS5 proxy, and the statically configured peer list used
//! when DNS seeding is unavailable or disabled. It is constructed via the
//! fluent [`ConfigBuilder`], then optionally overlaid with values parsed
//! from `<state-dir>/main.cfg` (TOML). Fields are `pub` for ergonomic
//! read access; mutation should go through the builder so defaults stay
//! centralised in one place.
//!
//! ```
//! use bitc_core::config::Config;
//!
//! let cfg = Config::default();
//! assert_eq!(cfg.network, bitc_core::config::Network::Mainnet);
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which Bitcoin network to join. Determines magic bytes, default port,
/// genesis header and difficulty-retarget exceptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet3,
}

impl Network {
    pub fn magic(self) -> [u8; 4] {
        match self {
            Network::Mainnet => [0xF9, 0xBE, 0xB4, 0xD9],
            Network::Testnet3 => [0x0B, 0x11, 0x09, 0x07],
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Network::Mainnet => 8333,
            Network::Testnet3 => 18333,
        }
    }

    /// Whether the "20 minute since last block" minimum-difficulty
    /// exception applies. Mainnet never relaxes the retarget rule;
    /// testnet3 does, per the network's own consensus rules, not because
    /// the original implementation's bit-comparison happened to allow
    /// it. See DESIGN.md Open Question.
    pub fn allows_minimum_difficulty_blocks(self) -> bool {
        matches!(self, Network::Testnet3)
    }
}

/// Runtime configuration shared across the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which network to join.
    pub network: Network,

    /// Target number of READY peers (§4.3).
    pub target_peer_count: usize,

    /// Peer count used during the initial-sync acceleration window.
    pub min_peers_init: usize,

    /// Whether to dial outbound connections through a SOCKS5 proxy.
    pub use_socks5: bool,

    /// SOCKS5 proxy hostname, consulted when `use_socks5` is set.
    pub socks5_hostname: String,

    /// SOCKS5 proxy port.
    pub socks5_port: u16,

    /// Statically configured peer endpoints (`host:port`), consulted
    /// alongside or instead of DNS seeding.
    pub resolve_peers: Vec<String>,

    /// Whether the wallet file is expected to be passphrase-encrypted.
    pub wallet_encrypted: bool,

    /// Size of the CPU-bound worker pool (§4.5).
    pub worker_pool_size: usize,

    /// Bloom filter false-positive rate target (§4.3).
    pub bloom_false_positive_rate: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            target_peer_count: 5,
            min_peers_init: 50,
            use_socks5: false,
            socks5_hostname: String::new(),
            socks5_port: 9050,
            resolve_peers: Vec::new(),
            wallet_encrypted: true,
            worker_pool_size: 10,
            bloom_false_positive_rate: 1.0e-4,
        }
    }
}

impl Config {
    /// Loads `<dir>/main.cfg` if present and overlays it onto
    /// [`Config::default`]. A missing file is not an error: a first-time
    /// user simply runs with defaults, matching bitc's own "welcome, new
    /// user" behavior of creating the state directory lazily rather than
    /// refusing to start.
    pub fn load_or_default(dir: &std::path::Path) -> Result<Self> {
        let path = dir.join("main.cfg");
        match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text).map_err(|e| Error::Config(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub fn save(&self, dir: &std::path::Path) -> Result<()> {
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(dir.join("main.cfg"), text)?;
        Ok(())
    }
}

/// Fluent builder for [`Config`].
pub struct ConfigBuilder {
    inner: Config,
}

impl ConfigBuilder {
    /// Starts a new builder pre-populated with [`Config::default`].
    pub fn new() -> Self {
        Self { inner: Config::default() }
    }

    pub fn network(mut self, network: Network) -> Self {
        self.inner.network = network;
        self
    }

    pub fn target_peer_count(mut self, n: usize) -> Self {
        self.inner.target_peer_count = n;
        self
    }

    pub fn use_socks5(mut self, host: impl Into<String>, port: u16) -> Self {
        self.inner.use_socks5 = true;
        self.inner.socks5_hostname = host.into();
        self.inner.socks5_port = port;
        self
    }

    pub fn resolve_peers(mut self, peers: Vec<String>) -> Self {
        self.inner.resolve_peers = peers;
        self
    }

    pub fn worker_pool_size(mut self, n: usize) -> Self {
        self.inner.worker_pool_size = n;
        self
    }

    /// Consumes the builder returning an immutable configuration value.
    pub fn finish(self) -> Config {
        self.inner
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves the state directory: `~/.bitc` unless overridden.
pub fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bitc")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_fields() {
        let cfg = ConfigBuilder::new()
            .network(Network::Testnet3)
            .target_peer_count(8)
            .resolve_peers(vec!["127.0.0.1:18333".into()])
            .finish();
        assert_eq!(cfg.network, Network::Testnet3);
        assert_eq!(cfg.target_peer_count, 8);
        assert_eq!(cfg.resolve_peers, vec!["127.0.0.1:18333".to_string()]);
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_or_default(dir.path()).unwrap();
        assert_eq!(cfg.network, Network::Mainnet);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ConfigBuilder::new().network(Network::Testnet3).finish();
        cfg.save(dir.path()).unwrap();
        let loaded = Config::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.network, Network::Testnet3);
    }

    #[test]
    fn testnet_allows_minimum_difficulty_blocks() {
        assert!(Network::Testnet3.allows_minimum_difficulty_blocks());
        assert!(!Network::Mainnet.allows_minimum_difficulty_blocks());
    }
}
