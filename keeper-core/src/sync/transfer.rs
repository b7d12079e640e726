//! Streamed upload and download of file bodies.
//!
//! Each transfer is two concurrent legs joined by a bounded in-memory pipe:
//! `file → encrypt → pipe → network` on upload and
//! `network → pipe → decrypt → file` on download. The legs run under
//! `tokio::try_join!`, so the first error ends the transfer and drops the
//! other leg.

use std::path::Path;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::crypto::{decrypt_copy, encrypt_copy, FileKey, VaultCipher};
use crate::storage::FilePayload;
use crate::sync::client::RemoteVault;
use crate::sync::engine::{Result, SyncError};

/// Default capacity of the pipe between the two legs.
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

pub struct FileTransfer {
    cipher: Arc<VaultCipher>,
    remote: Arc<dyn RemoteVault>,
    pipe_capacity: usize,
}

impl FileTransfer {
    pub fn new(cipher: Arc<VaultCipher>, remote: Arc<dyn RemoteVault>) -> Self {
        Self {
            cipher,
            remote,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }

    pub fn with_pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity.max(1);
        self
    }

    /// Encrypt `path` under a fresh per-file key while uploading it.
    ///
    /// Returns a file record payload holding the blob URL and the per-file
    /// key wrapped with the master key.
    pub async fn upload(&self, path: &Path) -> Result<FilePayload> {
        let file = File::open(path).await?;
        let size = file.metadata().await?.len();

        let key = FileKey::generate();
        let wrapped_key = self.cipher.wrap_file_key(&key)?;

        let (mut pipe_writer, pipe_reader) = tokio::io::duplex(self.pipe_capacity);

        let encrypt = async {
            let copied = encrypt_copy(file, &mut pipe_writer, &key).await?;
            Ok::<_, SyncError>(copied)
        };
        let send = async {
            let url = self.remote.upload_blob(Box::new(pipe_reader)).await?;
            Ok::<_, SyncError>(url)
        };

        let (copied, url) = tokio::try_join!(encrypt, send)?;
        debug!(bytes = copied, "Encrypted upload complete");

        let file_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|s| s.to_string_lossy().into_owned());

        info!(size, "Uploaded file body");
        Ok(FilePayload {
            file_name,
            extension,
            size,
            blob_url: Some(url),
            wrapped_key,
        })
    }

    /// Download and decrypt the body of a file record into `dest`.
    ///
    /// A failed download removes the partially written file.
    pub async fn download(&self, payload: &FilePayload, dest: &Path) -> Result<u64> {
        let url = payload.blob_url.as_deref().ok_or(SyncError::MissingBlob)?;
        let key = self.cipher.unwrap_file_key(&payload.wrapped_key)?;

        let outcome = self.receive(url, &key, dest).await;
        if outcome.is_err() {
            let _ = tokio::fs::remove_file(dest).await;
        }
        outcome
    }

    async fn receive(&self, url: &str, key: &FileKey, dest: &Path) -> Result<u64> {
        let file = File::create(dest).await?;
        let (mut pipe_writer, pipe_reader) = tokio::io::duplex(self.pipe_capacity);

        let fetch = async {
            let fetched = self.remote.download_blob(url, &mut pipe_writer).await?;
            pipe_writer.shutdown().await?;
            Ok::<_, SyncError>(fetched)
        };
        let decrypt = async {
            let written = decrypt_copy(pipe_reader, file, key).await?;
            Ok::<_, SyncError>(written)
        };

        let (fetched, written) = tokio::try_join!(fetch, decrypt)?;
        debug!(fetched, written, "Decrypted download complete");
        Ok(written)
    }
}
