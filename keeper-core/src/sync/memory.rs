//! In-memory [`RemoteVault`] with the relay's version semantics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::sync::client::{BlobReader, RemoteError, RemoteVault, Result};
use crate::sync::models::{VaultBlob, VersionEntry};

#[derive(Default)]
pub struct MemoryRemote {
    vaults: Mutex<Vec<VaultBlob>>,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    next_id: AtomicU64,
    offline: AtomicBool,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn get(&self, id: &str) -> Option<VaultBlob> {
        self.vaults
            .lock()
            .unwrap()
            .iter()
            .find(|v| v.id == id)
            .cloned()
    }

    pub fn live_count(&self) -> usize {
        self.vaults
            .lock()
            .unwrap()
            .iter()
            .filter(|v| !v.is_deleted)
            .count()
    }

    pub fn blob(&self, url: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(url).cloned()
    }

    fn check(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RemoteError::Transport("offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteVault for MemoryRemote {
    async fn login(&self, _login: &str, _password: &str) -> Result<String> {
        self.check()?;
        Ok("memory-token".to_string())
    }

    async fn check_session(&self) -> Result<()> {
        self.check()
    }

    async fn create_vault(&self, ciphertext: &[u8], blob_url: Option<&str>) -> Result<(String, u64)> {
        self.check()?;
        let id = format!("vault-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.vaults.lock().unwrap().push(VaultBlob {
            id: id.clone(),
            version: 0,
            is_deleted: false,
            ciphertext: ciphertext.to_vec(),
            blob_url: blob_url.map(str::to_string),
        });
        Ok((id, 0))
    }

    async fn update_vault(&self, id: &str, version: u64, ciphertext: &[u8]) -> Result<u64> {
        self.check()?;
        let mut vaults = self.vaults.lock().unwrap();
        let vault = vaults
            .iter_mut()
            .find(|v| v.id == id && !v.is_deleted)
            .ok_or(RemoteError::NotFound)?;
        if vault.version != version {
            return Err(RemoteError::Conflict);
        }
        vault.version += 1;
        vault.ciphertext = ciphertext.to_vec();
        Ok(vault.version)
    }

    async fn delete_vault(&self, id: &str, version: u64) -> Result<()> {
        self.check()?;
        let mut vaults = self.vaults.lock().unwrap();
        let vault = vaults
            .iter_mut()
            .find(|v| v.id == id && v.version == version && !v.is_deleted)
            .ok_or(RemoteError::Conflict)?;
        vault.version += 1;
        vault.is_deleted = true;
        vault.ciphertext.clear();
        Ok(())
    }

    async fn sync_delta(&self, manifest: &[VersionEntry]) -> Result<Vec<VaultBlob>> {
        self.check()?;
        let known: HashMap<&str, u64> = manifest
            .iter()
            .map(|entry| (entry.id.as_str(), entry.version))
            .collect();
        Ok(self
            .vaults
            .lock()
            .unwrap()
            .iter()
            .filter(|v| match known.get(v.id.as_str()) {
                Some(seen) => v.version > *seen,
                None => !v.is_deleted,
            })
            .cloned()
            .collect())
    }

    async fn upload_blob(&self, mut body: BlobReader) -> Result<String> {
        self.check()?;
        let mut data = Vec::new();
        body.read_to_end(&mut data).await?;
        let url = format!("mem://blobs/{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.blobs.lock().unwrap().insert(url.clone(), data);
        Ok(url)
    }

    async fn download_blob(
        &self,
        url: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64> {
        self.check()?;
        let data = self.blob(url).ok_or(RemoteError::NotFound)?;
        sink.write_all(&data).await?;
        sink.flush().await?;
        Ok(data.len() as u64)
    }
}
