//! Classification of pulled blobs against local state.

use serde::{Deserialize, Serialize};

use crate::storage::{LocalId, SyncCandidate};
use crate::sync::models::VaultBlob;

/// How the user settles a flagged conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// Accept the server revision and discard the local edit.
    AcceptRemote,
    /// Keep the local edit and overwrite the server on the next push.
    KeepLocal,
}

/// What the pull phase does with one blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullAction {
    Create,
    Update,
    Delete,
    /// The server moved past a record that still carries a local edit.
    Conflict,
    /// Deleted on the server and never seen here, or a revision already
    /// set aside by a flagged conflict.
    Skip,
}

/// A record whose local edit raced a server change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictNotice {
    pub kind: String,
    pub local_id: LocalId,
    pub external_id: String,
    pub local_version: u64,
    pub remote_version: u64,
    pub remote_deleted: bool,
}

impl ConflictNotice {
    pub fn new(
        kind: &str,
        local: &SyncCandidate,
        external_id: &str,
        remote_version: u64,
        remote_deleted: bool,
    ) -> Self {
        Self {
            kind: kind.to_string(),
            local_id: local.local_id,
            external_id: external_id.to_string(),
            local_version: local.version,
            remote_version,
            remote_deleted,
        }
    }
}

/// Decide how a pulled blob applies to its local counterpart, if any.
pub fn classify(local: Option<&SyncCandidate>, remote: &VaultBlob) -> PullAction {
    let Some(local) = local else {
        return if remote.is_deleted {
            PullAction::Skip
        } else {
            PullAction::Create
        };
    };

    if local.flags.is_conflict && local.conflict_version == Some(remote.version) {
        PullAction::Skip
    } else if remote.version > local.version && local.flags.is_update {
        PullAction::Conflict
    } else if remote.is_deleted {
        PullAction::Delete
    } else {
        PullAction::Update
    }
}
