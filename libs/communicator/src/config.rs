//! Communicator Configuration
//!
//! Loaded from a TOML file with `COMM_`-prefixed environment overrides,
//! e.g. `COMM_WORKER_THREADS=8`. Every field has a default, so an empty
//! file (or none at all) yields a working configuration.

use crate::envelope::WireFormat;
use crate::host::{HostInfo, KeyBytes, Uid, KEY_LEN};
use crate::security::LocalKeys;
use crate::{CommError, Result, DEFAULT_WORKER_THREADS};
use anyhow::Context;
use config_rs::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Upper bound on receive workers
pub const MAX_WORKER_THREADS: usize = 256;

/// Default longest router trail an envelope may carry
pub const DEFAULT_MAX_ROUTE_LENGTH: usize = 16;

/// Main communicator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunicatorConfig {
    /// Receive pool size
    pub worker_threads: usize,

    /// Largest sealed payload accepted for sending, in bytes
    pub max_payload_size: u32,

    /// Envelopes with a longer router trail are dropped instead of forwarded
    pub max_route_length: usize,

    pub log_level: String,

    /// Where the local identity is persisted; generated fresh when unset
    pub identity_file: Option<PathBuf>,

    /// Statically known peers
    pub peers: Vec<PeerConfig>,
}

impl Default for CommunicatorConfig {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            max_payload_size: WireFormat::MAX_PAYLOAD_SIZE,
            max_route_length: DEFAULT_MAX_ROUTE_LENGTH,
            log_level: "info".to_string(),
            identity_file: None,
            peers: Vec::new(),
        }
    }
}

impl CommunicatorConfig {
    /// Load from an optional TOML file, then apply `COMM_*` overrides
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading communicator config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("COMM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate().context("Invalid configuration")?;
        debug!(?config, "Configuration loaded");
        Ok(config)
    }

    /// Parse TOML text without consulting the environment
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let config: Self = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 || self.worker_threads > MAX_WORKER_THREADS {
            return Err(CommError::configuration(
                format!(
                    "worker_threads must be between 1 and {}, got {}",
                    MAX_WORKER_THREADS, self.worker_threads
                ),
                Some("worker_threads"),
            ));
        }

        if self.max_payload_size == 0 || self.max_payload_size > WireFormat::MAX_PAYLOAD_SIZE {
            return Err(CommError::configuration(
                format!(
                    "max_payload_size must be between 1 and {}",
                    WireFormat::MAX_PAYLOAD_SIZE
                ),
                Some("max_payload_size"),
            ));
        }

        if self.max_route_length == 0 || self.max_route_length > WireFormat::MAX_ROUTE_LENGTH {
            return Err(CommError::configuration(
                format!(
                    "max_route_length must be between 1 and {}",
                    WireFormat::MAX_ROUTE_LENGTH
                ),
                Some("max_route_length"),
            ));
        }

        if self.log_level.parse::<tracing::Level>().is_err() {
            return Err(CommError::configuration(
                format!("Unknown log level '{}'", self.log_level),
                Some("log_level"),
            ));
        }

        for peer in &self.peers {
            peer.host_info()?;
        }

        Ok(())
    }
}

/// A statically configured peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub uid: Uid,

    /// Hex-encoded X25519 public key
    pub encrypt_key: String,

    /// Hex-encoded Ed25519 public key
    pub verify_key: String,

    /// Reach the peer through this process instead of directly
    #[serde(default)]
    pub router: Option<Uid>,

    #[serde(default)]
    pub hops: u32,
}

impl PeerConfig {
    /// Describe a peer from its public keys
    pub fn from_keys(uid: Uid, keys: &LocalKeys, router: Option<Uid>, hops: u32) -> Self {
        Self {
            uid,
            encrypt_key: hex::encode(keys.encrypt_key()),
            verify_key: hex::encode(keys.verify_key()),
            router,
            hops,
        }
    }

    pub fn host_info(&self) -> Result<HostInfo> {
        if self.uid.is_nil() {
            return Err(CommError::configuration("Peer uid must not be nil", Some("peers.uid")));
        }
        let encrypt_key = decode_public_key(&self.encrypt_key, "peers.encrypt_key")?;
        let verify_key = decode_public_key(&self.verify_key, "peers.verify_key")?;
        Ok(HostInfo::new(self.uid, encrypt_key, verify_key))
    }
}

fn decode_public_key(text: &str, field: &str) -> Result<KeyBytes> {
    let bytes = hex::decode(text.trim()).map_err(|e| {
        CommError::configuration(format!("Key is not valid hex: {}", e), Some(field))
    })?;
    let key: KeyBytes = bytes.as_slice().try_into().map_err(|_| {
        CommError::configuration(
            format!("Key has {} bytes, expected {}", bytes.len(), KEY_LEN),
            Some(field),
        )
    })?;
    Ok(key)
}
