//! Local vault storage: one encrypted-at-rest record collection per kind.
//!
//! Each [`LocalVault`] owns an arena of records keyed by a local integer id
//! plus a separate index from server-assigned external ids to local ids.
//! The sync engine drives every kind through the [`SyncStorage`] trait.

pub mod credential;
pub mod file;
pub mod record;
pub mod vault;

pub use credential::{CredentialPayload, CredentialVault};
pub use file::{FilePayload, FileVault};
pub use record::{LocalId, Record, RecordPayload, RemoteRevision, SyncCandidate, SyncFlags};
pub use vault::LocalVault;

use crate::crypto::CryptoError;
use thiserror::Error;

/// Errors raised by local storage. These indicate a programming or
/// file-corruption problem and are always surfaced to the caller.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Record {0} not found")]
    NotFound(LocalId),

    #[error("No local record for external id {0}")]
    UnknownExternalId(String),

    #[error("Record {0} is marked for deletion")]
    RecordDeleted(LocalId),

    #[error("Record {0} has no unresolved conflict")]
    NoConflict(LocalId),

    #[error("Payload does not decode as {kind}: {reason}")]
    TypeMismatch { kind: &'static str, reason: String },

    #[error("Storage file encoding error: {0}")]
    Encoding(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// A pulled server revision that raced a local edit, still in wire form.
#[derive(Debug, Clone, Copy)]
pub enum RemoteChange<'a> {
    Updated { version: u64, payload: &'a [u8] },
    Deleted { version: u64 },
}

/// Uniform sync contract over every record kind.
///
/// All methods take `&self`; implementations serialize mutations behind
/// their own lock and never hold it across an await point.
pub trait SyncStorage: Send + Sync {
    /// Storage kind tag embedded in every encrypted envelope.
    fn kind(&self) -> &'static str;

    /// Every record with its sync metadata, for the engine to classify.
    fn list_for_sync(&self) -> Result<Vec<SyncCandidate>>;

    /// Encode the payload of a local record for transport.
    fn serialize(&self, local_id: LocalId) -> Result<Vec<u8>>;

    /// Insert a record first seen in a server delta. No-op if the external
    /// id is already indexed.
    fn apply_server_create(
        &self,
        external_id: &str,
        version: u64,
        payload: &[u8],
        blob_url: Option<&str>,
    ) -> Result<()>;

    /// Overwrite a record from a server delta unless it still needs a push
    /// or the delta is not newer than the local version.
    fn apply_server_update(&self, external_id: &str, version: u64, payload: &[u8]) -> Result<()>;

    /// Remove a record deleted on the server, with the same guards as
    /// [`SyncStorage::apply_server_update`].
    fn apply_server_delete(&self, external_id: &str, version: u64) -> Result<()>;

    /// Record the server identity after a confirmed create or update of
    /// the payload at `edit_seq`. A record edited since keeps `is_update`.
    fn confirm_push(
        &self,
        local_id: LocalId,
        external_id: &str,
        version: u64,
        edit_seq: u64,
    ) -> Result<()>;

    /// Drop a record after the server confirmed its deletion.
    fn confirm_delete(&self, local_id: LocalId) -> Result<()>;

    /// Mark a record as conflicting with `remote`; the local payload is kept.
    fn flag_conflict(&self, local_id: LocalId, remote: RemoteChange<'_>) -> Result<()>;

    /// Write the current state to the backing file, if any.
    fn persist(&self) -> Result<()>;
}
