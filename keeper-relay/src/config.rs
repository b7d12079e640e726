//! Relay server configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub listen_addr: String,
    pub storage_path: PathBuf,
    pub blob_dir: PathBuf,
    /// Base URL clients use to reach this relay; blob URLs are built from it.
    pub public_url: String,
    /// HMAC key for session tokens. Empty means a random per-process key.
    pub token_secret: String,
    pub token_ttl_secs: u64,
    /// Body limit for JSON vault requests.
    pub max_payload_size: usize,
    /// Body limit for blob uploads.
    pub max_blob_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8743".to_string(),
            storage_path: PathBuf::from("relay.db"),
            blob_dir: PathBuf::from("blobs"),
            public_url: "http://127.0.0.1:8743".to_string(),
            token_secret: String::new(),
            token_ttl_secs: 24 * 60 * 60,
            max_payload_size: 1024 * 1024,
            max_blob_size: 1024 * 1024 * 1024,
        }
    }
}

impl RelayConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "listen_addr = \"0.0.0.0:9000\"\ntoken_ttl_secs = 60\n").unwrap();

        let config = RelayConfig::load(&path).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.token_ttl_secs, 60);
        assert_eq!(config.storage_path, PathBuf::from("relay.db"));
    }
}
