use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{ComputeError, ComputeResult};
use crate::types::Blockchain;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComputeConfig {
    pub data_dir: PathBuf,
    pub api_listen: SocketAddr,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub api: ApiLimitsConfig,
}

impl ComputeConfig {
    pub fn load(path: &Path) -> ComputeResult<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|err| ComputeError::Config(format!("unable to parse config: {err}")))
    }

    pub fn save(&self, path: &Path) -> ComputeResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let encoded = toml::to_string_pretty(self)
            .map_err(|err| ComputeError::Config(format!("unable to encode config: {err}")))?;
        fs::write(path, encoded)?;
        Ok(())
    }

    pub fn ensure_directories(&self) -> ComputeResult<()> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("db")
    }
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            api_listen: SocketAddr::from(([127, 0, 0, 1], 5000)),
            execution: ExecutionConfig::default(),
            realtime: RealtimeConfig::default(),
            api: ApiLimitsConfig::default(),
        }
    }
}

/// Tuning for the simulated circuit execution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    #[serde(default = "default_execution_chain")]
    pub default_chain: Blockchain,
}

fn default_step_delay_ms() -> u64 {
    500
}

fn default_execution_chain() -> Blockchain {
    Blockchain::Ethereum
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay_ms(),
            default_chain: default_execution_chain(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiLimitsConfig {
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Default for ApiLimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
        }
    }
}
