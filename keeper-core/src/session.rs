//! A logged-in client: session key, local storages, remote client and
//! sync engine wired together from a [`ClientConfig`].

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::config::ClientConfig;
use crate::crypto::VaultCipher;
use crate::storage::{CredentialVault, FilePayload, FileVault, LocalId, Record};
use crate::sync::{FileTransfer, HttpVaultClient, RemoteVault, SyncEngine, SyncReport};
use crate::Result;

pub struct KeeperSession {
    cipher: Arc<VaultCipher>,
    remote: Arc<HttpVaultClient>,
    credentials: Arc<CredentialVault>,
    files: Arc<FileVault>,
    engine: SyncEngine,
    transfer: FileTransfer,
}

impl KeeperSession {
    /// Authenticate with the server, derive the master key and open the
    /// local storages under `config.data_dir`.
    pub async fn login(config: &ClientConfig, login: &str, password: &str) -> Result<Self> {
        let cipher = Arc::new(VaultCipher::new());
        Self::login_with_cipher(config, cipher, login, password).await
    }

    /// Same as [`KeeperSession::login`], with a caller-provided cipher
    /// (for non-default KDF parameters).
    pub async fn login_with_cipher(
        config: &ClientConfig,
        cipher: Arc<VaultCipher>,
        login: &str,
        password: &str,
    ) -> Result<Self> {
        let remote = Arc::new(HttpVaultClient::new(
            &config.server_url,
            config.request_timeout(),
        )?);
        remote.login(login, password).await?;

        cipher.set_master_key(login, password)?;

        let credentials = Arc::new(CredentialVault::open(
            config.credentials_path(),
            cipher.clone(),
        )?);
        let files = Arc::new(FileVault::open(config.files_path(), cipher.clone())?);

        let mut engine = SyncEngine::new(cipher.clone(), remote.clone());
        engine.register(credentials.clone()).register(files.clone());
        let transfer = FileTransfer::new(cipher.clone(), remote.clone())
            .with_pipe_capacity(config.pipe_capacity);

        info!(login, "Session opened");
        Ok(Self {
            cipher,
            remote,
            credentials,
            files,
            engine,
            transfer,
        })
    }

    pub fn credentials(&self) -> &CredentialVault {
        &self.credentials
    }

    pub fn files(&self) -> &FileVault {
        &self.files
    }

    pub fn remote(&self) -> &HttpVaultClient {
        &self.remote
    }

    pub async fn sync(&self) -> Result<SyncReport> {
        Ok(self.engine.sync().await?)
    }

    /// Upload a file body and add its record to the file storage.
    pub async fn add_file(&self, path: &Path) -> Result<Record<FilePayload>> {
        let payload = self.transfer.upload(path).await?;
        Ok(self.files.create(payload)?)
    }

    /// Download and decrypt the body of file record `local_id` into `dest`.
    pub async fn fetch_file(&self, local_id: LocalId, dest: &Path) -> Result<u64> {
        let record = self.files.get(local_id)?;
        Ok(self.transfer.download(&record.payload, dest).await?)
    }

    /// Persist local storages and drop the master key.
    pub fn close(self) -> Result<()> {
        self.credentials.save()?;
        self.files.save()?;
        self.cipher.clear();
        info!("Session closed");
        Ok(())
    }
}
