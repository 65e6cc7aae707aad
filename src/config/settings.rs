use crate::error::{BlockchainError, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

static DEFAULT_NODE_ADDR: &str = "127.0.0.1:8000";
static DEFAULT_DB_PATH: &str = "data";

const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
const DB_PATH_KEY: &str = "DB_PATH";

pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_FRAME_LEN: u32 = 32 * 1024 * 1024;

/// Node settings: defaults, then an optional TOML file, then environment
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node_addr: String,
    pub db_path: PathBuf,
    pub read_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    pub protocol_version: u32,
    pub max_frame_len: u32,
    pub validate_incoming_blocks: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            node_addr: String::from(DEFAULT_NODE_ADDR),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            handshake_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            protocol_version: PROTOCOL_VERSION,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            validate_incoming_blocks: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Config {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Load a TOML file over the defaults, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            BlockchainError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let mut config = Config::from_toml(&text)?;
        config.apply_env();
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Config> {
        let config: Config = toml::from_str(text)?;
        config.check()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(addr) = env::var(NODE_ADDRESS_KEY) {
            self.node_addr = addr;
        }
        if let Ok(path) = env::var(DB_PATH_KEY) {
            self.db_path = PathBuf::from(path);
        }
    }

    fn check(&self) -> Result<()> {
        if self.read_timeout_secs == 0 || self.handshake_timeout_secs == 0 {
            return Err(BlockchainError::Config(
                "timeouts must be at least one second".to_string(),
            ));
        }
        if self.max_frame_len == 0 {
            return Err(BlockchainError::Config(
                "max_frame_len must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// Port part of `node_addr` (e.g., "127.0.0.1:8000" -> 8000)
    pub fn listen_port(&self) -> Option<u16> {
        self.node_addr
            .rsplit(':')
            .next()
            .and_then(|port| port.parse().ok())
    }
}
