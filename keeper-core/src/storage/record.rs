//! Record types shared by every local storage kind.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::storage::{Result, StorageError};

/// Process-local record handle, never reused within one storage.
pub type LocalId = u64;

/// Per-record mutation state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFlags {
    /// Never accepted by the server.
    pub is_new: bool,
    /// Locally edited since the last confirmed push.
    pub is_update: bool,
    /// Locally marked for deletion.
    pub is_delete: bool,
    /// The server holds a newer revision that raced a local edit.
    pub is_conflict: bool,
}

impl SyncFlags {
    /// Whether the next sync run has something to push for this record.
    pub fn need_sync(&self) -> bool {
        self.is_new || self.is_update || self.is_delete
    }
}

/// Server revision set aside when a conflict was flagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemoteRevision<P> {
    Live { version: u64, payload: P },
    Deleted { version: u64 },
}

impl<P> RemoteRevision<P> {
    pub fn version(&self) -> u64 {
        match self {
            Self::Live { version, .. } | Self::Deleted { version } => *version,
        }
    }
}

/// One vault record as held by a local storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<P> {
    pub local_id: LocalId,
    /// Server identity; `None` until the first confirmed push.
    pub external_id: Option<String>,
    pub payload: P,
    /// Last version confirmed with the server.
    pub version: u64,
    pub flags: SyncFlags,
    /// Bumped on every local payload edit.
    pub edit_seq: u64,
    /// Unresolved server revision, present while `flags.is_conflict`.
    pub conflict: Option<RemoteRevision<P>>,
}

impl<P> Record<P> {
    pub fn need_sync(&self) -> bool {
        self.flags.need_sync()
    }
}

/// Kind-agnostic view of a record handed to the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCandidate {
    pub local_id: LocalId,
    pub external_id: Option<String>,
    pub version: u64,
    pub flags: SyncFlags,
    /// Edit counter at listing time; a push only settles this edit.
    pub edit_seq: u64,
    /// Version of the server revision set aside by a flagged conflict.
    pub conflict_version: Option<u64>,
    /// External blob pointer to send along with a create.
    pub blob_url: Option<String>,
}

/// Application data carried by one record kind.
pub trait RecordPayload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Storage kind tag, unique per payload type.
    const KIND: &'static str;

    fn blob_url(&self) -> Option<&str> {
        None
    }

    fn set_blob_url(&mut self, _url: &str) {}

    fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StorageError::TypeMismatch {
            kind: Self::KIND,
            reason: e.to_string(),
        })
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| StorageError::TypeMismatch {
            kind: Self::KIND,
            reason: e.to_string(),
        })
    }
}
