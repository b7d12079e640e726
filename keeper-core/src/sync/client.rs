//! Remote vault contract and its HTTP implementation against the relay.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::sync::models::{
    CreateVaultRequest, CreateVaultResponse, ErrorBody, LoginRequest, LoginResponse,
    SyncRequest, SyncResponse, UpdateVaultRequest, UpdateVaultResponse, UploadResponse,
    VaultBlob, VersionEntry,
};

/// Read size used when streaming a blob body out to the network.
const UPLOAD_CHUNK: usize = 64 * 1024;

/// Failure conditions of the remote contract.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Record not found on server")]
    NotFound,

    #[error("Version conflict")]
    Conflict,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Protocol(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<std::io::Error> for RemoteError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Result type for remote operations
pub type Result<T> = std::result::Result<T, RemoteError>;

/// Source of a blob upload.
pub type BlobReader = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Operations the sync engine needs from the server.
///
/// Every call except [`RemoteVault::login`] requires an established
/// session and fails with [`RemoteError::Unauthenticated`] otherwise.
#[async_trait]
pub trait RemoteVault: Send + Sync {
    /// Authenticate and keep the returned session token for later calls.
    async fn login(&self, login: &str, password: &str) -> Result<String>;

    async fn check_session(&self) -> Result<()>;

    /// Store a new record; the server assigns its id at version 0.
    async fn create_vault(&self, ciphertext: &[u8], blob_url: Option<&str>)
        -> Result<(String, u64)>;

    /// Replace a record if its server version still equals `version`.
    async fn update_vault(&self, id: &str, version: u64, ciphertext: &[u8]) -> Result<u64>;

    /// Soft-delete a record if its server version still equals `version`.
    async fn delete_vault(&self, id: &str, version: u64) -> Result<()>;

    /// Every record newer than the manifest or unknown to it.
    async fn sync_delta(&self, manifest: &[VersionEntry]) -> Result<Vec<VaultBlob>>;

    /// Stream `body` to the blob store and return its URL.
    async fn upload_blob(&self, body: BlobReader) -> Result<String>;

    /// Stream the blob at `url` into `sink`, returning the byte count.
    async fn download_blob(&self, url: &str, sink: &mut (dyn AsyncWrite + Send + Unpin))
        -> Result<u64>;
}

/// HTTP client for the relay server.
pub struct HttpVaultClient {
    client: reqwest::Client,
    server_url: String,
    token: RwLock<Option<String>>,
}

impl HttpVaultClient {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    /// Reuse a token obtained earlier.
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    pub fn has_token(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    // --- Internal helpers ---

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server_url, path)
    }

    /// Whether `url` lives under the relay this client is logged into.
    fn is_own_url(&self, url: &str) -> bool {
        url.strip_prefix(&self.server_url)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    fn authorized(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        let token = self
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(RemoteError::Unauthenticated)?;
        Ok(self.client.request(method, url).bearer_auth(token))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let resp = request.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        match status {
            StatusCode::UNAUTHORIZED => Err(RemoteError::Unauthenticated),
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound),
            StatusCode::CONFLICT => Err(RemoteError::Conflict),
            _ => {
                let detail = resp
                    .json::<ErrorBody>()
                    .await
                    .map(|body| body.error)
                    .unwrap_or_else(|_| "unknown".to_string());
                Err(RemoteError::Transport(format!(
                    "Relay error {}: {}",
                    status, detail
                )))
            }
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let resp = self.send(request).await?;
        resp.json::<T>()
            .await
            .map_err(|e| RemoteError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl RemoteVault for HttpVaultClient {
    async fn login(&self, login: &str, password: &str) -> Result<String> {
        let request = self
            .client
            .post(self.url("/api/v1/auth/login"))
            .json(&LoginRequest {
                login: login.to_string(),
                password: password.to_string(),
            });
        let response: LoginResponse = self.send_json(request).await?;
        self.set_token(Some(response.token.clone()));
        debug!(login, "Session established");
        Ok(response.token)
    }

    async fn check_session(&self) -> Result<()> {
        let request = self.authorized(Method::GET, &self.url("/api/v1/auth/check"))?;
        self.send(request).await?;
        Ok(())
    }

    async fn create_vault(
        &self,
        ciphertext: &[u8],
        blob_url: Option<&str>,
    ) -> Result<(String, u64)> {
        let request = self
            .authorized(Method::POST, &self.url("/api/v1/vaults"))?
            .json(&CreateVaultRequest {
                ciphertext: ciphertext.to_vec(),
                blob_url: blob_url.map(str::to_string),
            });
        let response: CreateVaultResponse = self.send_json(request).await?;
        Ok((response.id, response.version))
    }

    async fn update_vault(&self, id: &str, version: u64, ciphertext: &[u8]) -> Result<u64> {
        let request = self
            .authorized(Method::PUT, &self.url(&format!("/api/v1/vaults/{}", id)))?
            .json(&UpdateVaultRequest {
                version,
                ciphertext: ciphertext.to_vec(),
            });
        let response: UpdateVaultResponse = self.send_json(request).await?;
        Ok(response.version)
    }

    async fn delete_vault(&self, id: &str, version: u64) -> Result<()> {
        let request = self
            .authorized(Method::DELETE, &self.url(&format!("/api/v1/vaults/{}", id)))?
            .query(&[("version", version)]);
        self.send(request).await?;
        Ok(())
    }

    async fn sync_delta(&self, manifest: &[VersionEntry]) -> Result<Vec<VaultBlob>> {
        let request = self
            .authorized(Method::POST, &self.url("/api/v1/vaults/sync"))?
            .json(&SyncRequest {
                manifest: manifest.to_vec(),
            });
        let response: SyncResponse = self.send_json(request).await?;
        Ok(response.vaults)
    }

    async fn upload_blob(&self, body: BlobReader) -> Result<String> {
        let stream = futures::stream::unfold(Some(body), |state| async move {
            let mut reader = state?;
            let mut buf = vec![0u8; UPLOAD_CHUNK];
            match reader.read(&mut buf).await {
                Ok(0) => None,
                Ok(n) => {
                    buf.truncate(n);
                    Some((Ok(buf), Some(reader)))
                }
                Err(e) => Some((Err(e), None)),
            }
        });

        let request = self
            .authorized(Method::PUT, &self.url("/api/v1/blobs"))?
            .header("Content-Type", "application/octet-stream")
            .body(reqwest::Body::wrap_stream(stream));
        let response: UploadResponse = self.send_json(request).await?;
        Ok(response.url)
    }

    async fn download_blob(
        &self,
        url: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64> {
        // The session token only ever goes to our own relay.
        let request = if self.is_own_url(url) {
            self.authorized(Method::GET, url)?
        } else {
            debug!(url, "Fetching blob from foreign host without credentials");
            self.client.get(url)
        };
        let resp = self.send(request).await?;

        let mut body = resp.bytes_stream();
        let mut total = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            sink.write_all(&chunk).await?;
            total += chunk.len() as u64;
        }
        sink.flush().await?;
        Ok(total)
    }
}
