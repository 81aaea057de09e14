use std::{net::Ipv4Addr, path::PathBuf, time::Duration};

use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{save::layout::SaveLayout, storage};

pub const CONFIG_NAME: &str = "fitsync";
pub const ENV_PREFIX: &str = "FITSYNC";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config error `{0}`")]
    Load(#[from] ::config::ConfigError),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    pub transport: TransportConfig,
    pub storage: StorageConfig,
    pub patch: PatchConfig,
    pub layout: SaveLayout,
    pub host: HostConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    pub port: u16,
    pub max_message_size: usize,
    pub max_request_size: usize,
    pub request_timeout_ms: u64,
    pub ack_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub send_chunk: usize,
    pub chunk_delay_ms: u64,
    pub retry_delay_ms: u64,
    pub send_stall_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 8888,
            max_message_size: 65536,
            max_request_size: 1024,
            request_timeout_ms: 5000,
            ack_timeout_ms: 2000,
            poll_interval_ms: 10,
            send_chunk: 512,
            chunk_delay_ms: 1,
            retry_delay_ms: 5,
            send_stall_timeout_ms: 10_000,
        }
    }
}

impl TransportConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// tried in order, first that opens wins
    pub save_paths: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            save_paths: storage::default_save_paths(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PatchConfig {
    /// also patch the flash permission check, not needed for reading saves
    pub isfs_permissions: bool,
}

/// Only used when running on a development machine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HostConfig {
    /// directory standing in for the root of the flash filesystem
    pub nand_root: PathBuf,
    pub elevated: bool,
    pub firmware_version: u32,
    /// dump of system software memory to run the patcher against
    pub memory_image: Option<PathBuf>,
    pub address: Ipv4Addr,
    /// start the sync server without waiting for the A button
    pub autostart: bool,
    pub frame_interval_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            nand_root: PathBuf::from("./nand"),
            elevated: true,
            firmware_version: 58,
            memory_image: None,
            address: Ipv4Addr::LOCALHOST,
            autostart: true,
            frame_interval_ms: 16,
        }
    }
}

impl AgentConfig {
    /// Layers `fitsync.{toml,ron,json,..}` (optional) and `FITSYNC__*`
    /// environment variables over the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            .add_source(File::with_name(CONFIG_NAME).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    pub fn parse(s: &str, format: FileFormat) -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            .add_source(File::from_str(s, format))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }
}
