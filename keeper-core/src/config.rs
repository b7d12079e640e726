//! Client configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{KeeperError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    pub data_dir: PathBuf,
    pub request_timeout_secs: u64,
    /// Capacity in bytes of the pipe between transfer legs.
    pub pipe_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8743".to_string(),
            data_dir: PathBuf::from("data"),
            request_timeout_secs: 30,
            pipe_capacity: 64 * 1024,
        }
    }
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| KeeperError::Config(e.to_string()))?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir.join("credentials.vault")
    }

    pub fn files_path(&self) -> PathBuf {
        self.data_dir.join("files.vault")
    }
}
