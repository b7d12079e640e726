//! Filesystem store for large encrypted file bodies.
//!
//! Bodies are opaque ciphertext streamed straight to disk under
//! `<blob_dir>/<user_id>/<name>`; a user can only read back their own blobs.

use std::path::{Path, PathBuf};

use futures::{Stream, StreamExt};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

use crate::error::RelayError;

const READ_CHUNK: usize = 64 * 1024;

#[derive(Clone)]
pub struct BlobStore {
    root: PathBuf,
    public_url: String,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>, public_url: &str) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, name: &str) -> String {
        format!("{}/api/v1/blobs/{}", self.public_url, name)
    }

    fn user_dir(&self, user_id: &str) -> Result<PathBuf, RelayError> {
        let user = Uuid::parse_str(user_id)
            .map_err(|_| RelayError::Internal("Malformed user id".to_string()))?;
        Ok(self.root.join(user.simple().to_string()))
    }

    fn blob_path(&self, user_id: &str, name: &str) -> Result<PathBuf, RelayError> {
        let name = Uuid::parse_str(name)
            .map_err(|_| RelayError::NotFound("Blob not found".to_string()))?;
        Ok(self.user_dir(user_id)?.join(name.simple().to_string()))
    }

    /// Write `body` to a new blob, returning its public URL and size.
    pub async fn save<S, E>(&self, user_id: &str, mut body: S) -> Result<(String, u64), RelayError>
    where
        S: Stream<Item = Result<axum::body::Bytes, E>> + Unpin,
        E: std::fmt::Display,
    {
        let dir = self.user_dir(user_id)?;
        fs::create_dir_all(&dir).await?;

        let name = Uuid::new_v4().simple().to_string();
        let final_path = dir.join(&name);
        let tmp_path = dir.join(format!("{}.part", name));

        let written = match write_stream(&tmp_path, &mut body).await {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(e);
            }
        };
        fs::rename(&tmp_path, &final_path).await?;

        debug!(user_id, blob = %name, bytes = written, "Blob stored");
        Ok((self.url_for(&name), written))
    }

    /// Stream a stored blob back in fixed-size chunks.
    pub async fn open(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<impl Stream<Item = std::io::Result<Vec<u8>>> + Send + 'static, RelayError> {
        let path = self.blob_path(user_id, name)?;
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RelayError::NotFound("Blob not found".to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(futures::stream::unfold(Some(file), |state| async move {
            let mut file = state?;
            let mut buf = vec![0u8; READ_CHUNK];
            match file.read(&mut buf).await {
                Ok(0) => None,
                Ok(n) => {
                    buf.truncate(n);
                    Some((Ok(buf), Some(file)))
                }
                Err(e) => Some((Err(e), None)),
            }
        }))
    }
}

async fn write_stream<S, E>(path: &Path, body: &mut S) -> Result<u64, RelayError>
where
    S: Stream<Item = Result<axum::body::Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut file = File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| RelayError::BadRequest(format!("Upload interrupted: {}", e)))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.sync_all().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use tempfile::TempDir;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
        let items: Vec<Result<Bytes, std::io::Error>> =
            parts.iter().map(|p| Ok(Bytes::from_static(*p))).collect();
        futures::stream::iter(items)
    }

    async fn read_all(store: &BlobStore, user: &str, name: &str) -> Vec<u8> {
        let mut stream = Box::pin(store.open(user, name).await.unwrap());
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn save_then_open() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(dir.path(), "http://relay.local/");
        let user = Uuid::new_v4().to_string();

        let (url, size) = store.save(&user, chunks(&[&b"hello "[..], &b"world"[..]])).await.unwrap();
        assert_eq!(size, 11);
        let name = url.rsplit('/').next().unwrap();
        assert!(url.starts_with("http://relay.local/api/v1/blobs/"));
        assert_eq!(read_all(&store, &user, name).await, b"hello world");
    }

    #[tokio::test]
    async fn blobs_are_per_user() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(dir.path(), "http://relay.local");
        let owner = Uuid::new_v4().to_string();
        let other = Uuid::new_v4().to_string();

        let (url, _) = store.save(&owner, chunks(&[&b"secret"[..]])).await.unwrap();
        let name = url.rsplit('/').next().unwrap();
        assert!(matches!(
            store.open(&other, name).await,
            Err(RelayError::NotFound(_))
        ));
        assert!(matches!(
            store.open(&owner, "../../etc/passwd").await,
            Err(RelayError::NotFound(_))
        ));
    }
}
