//! Keeper Core Library
//!
//! Client side of a personal secrets vault: master key derivation and
//! blob/stream encryption, encrypted local record storage with per-record
//! sync state, and the engine that reconciles local storages with the
//! versioned server store.

pub mod config;
pub mod crypto;
pub mod session;
pub mod storage;
pub mod sync;

pub use config::ClientConfig;
pub use crypto::{CryptoError, FileKey, KdfParams, MasterKey, VaultCipher};
pub use session::KeeperSession;
pub use storage::{
    CredentialPayload, CredentialVault, FilePayload, FileVault, LocalId, LocalVault, Record,
    StorageError, SyncStorage,
};
pub use sync::{
    FileTransfer, HttpVaultClient, RemoteError, RemoteVault, Resolution, SyncEngine, SyncError,
    SyncReport,
};

use thiserror::Error;

/// Result type for keeper operations
pub type Result<T> = std::result::Result<T, KeeperError>;

/// General error type for keeper operations
#[derive(Error, Debug)]
pub enum KeeperError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
