//! Binary file records. The record holds metadata and a wrapped per-file
//! key; the encrypted content lives in the external blob store.

use serde::{Deserialize, Serialize};

use crate::storage::record::RecordPayload;
use crate::storage::vault::LocalVault;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    pub file_name: String,
    #[serde(default)]
    pub extension: Option<String>,
    /// Plaintext size in bytes.
    pub size: u64,
    /// Location of the encrypted content; set once the upload finished.
    #[serde(default)]
    pub blob_url: Option<String>,
    /// Per-file stream key sealed with the master key.
    #[serde(with = "crate::sync::models::base64_bytes")]
    pub wrapped_key: Vec<u8>,
}

impl RecordPayload for FilePayload {
    const KIND: &'static str = "file";

    fn blob_url(&self) -> Option<&str> {
        self.blob_url.as_deref()
    }

    fn set_blob_url(&mut self, url: &str) {
        self.blob_url = Some(url.to_string());
    }
}

pub type FileVault = LocalVault<FilePayload>;
