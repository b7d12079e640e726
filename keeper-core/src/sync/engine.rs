//! Sync engine: push local mutations, then pull and apply the server delta.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::crypto::{CryptoError, VaultCipher};
use crate::storage::{LocalId, RemoteChange, StorageError, SyncCandidate, SyncStorage};
use crate::sync::client::{RemoteError, RemoteVault};
use crate::sync::conflict::{classify, ConflictNotice, PullAction};
use crate::sync::models::{Envelope, VaultBlob, VersionEntry};

/// Errors that end a sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("A sync run is already in progress")]
    AlreadyRunning,

    #[error("Server rejected delete of {kind} record {local_id} ({external_id}): version conflict")]
    DeleteConflict {
        kind: String,
        local_id: LocalId,
        external_id: String,
    },

    #[error("Record {0} is marked synced but has no external id")]
    MissingExternalId(LocalId),

    #[error("File record has no uploaded content")]
    MissingBlob,

    #[error("Envelope encoding failed: {0}")]
    Envelope(String),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Outcome of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// New records that were deleted before ever reaching the server.
    pub discarded: usize,
    pub pulled_created: usize,
    pub pulled_updated: usize,
    pub pulled_deleted: usize,
    pub skipped_unknown_kind: usize,
    /// Records flagged because a pulled revision raced a local edit.
    pub conflicts: Vec<ConflictNotice>,
    /// Updates the server refused during push, because the version moved
    /// or the record is gone. The pull phase then flags them.
    pub rejected: Vec<ConflictNotice>,
    /// External ids of pulled blobs that failed to decrypt or decode.
    pub corrupted: Vec<String>,
}

type StorageRef = Arc<dyn SyncStorage>;

#[derive(Default)]
struct PushPlan {
    creates: Vec<(StorageRef, SyncCandidate)>,
    deletes: Vec<(StorageRef, SyncCandidate)>,
    updates: Vec<(StorageRef, SyncCandidate)>,
    discards: Vec<(StorageRef, SyncCandidate)>,
}

/// A decrypted pulled change waiting to be applied.
struct PendingChange {
    storage: StorageRef,
    blob: VaultBlob,
    data: Vec<u8>,
}

#[derive(Default)]
struct PullPlan {
    deletes: Vec<PendingChange>,
    creates: Vec<PendingChange>,
    updates: Vec<PendingChange>,
}

/// Orchestrates the two-phase reconciliation between every registered
/// local storage and the remote vault.
pub struct SyncEngine {
    cipher: Arc<VaultCipher>,
    remote: Arc<dyn RemoteVault>,
    storages: Vec<StorageRef>,
    running: tokio::sync::Mutex<()>,
}

impl SyncEngine {
    pub fn new(cipher: Arc<VaultCipher>, remote: Arc<dyn RemoteVault>) -> Self {
        Self {
            cipher,
            remote,
            storages: Vec::new(),
            running: tokio::sync::Mutex::new(()),
        }
    }

    /// Add a storage kind. Later registrations of the same kind replace
    /// earlier ones.
    pub fn register(&mut self, storage: StorageRef) -> &mut Self {
        self.storages.retain(|s| s.kind() != storage.kind());
        self.storages.push(storage);
        self
    }

    pub fn remote(&self) -> &Arc<dyn RemoteVault> {
        &self.remote
    }

    fn storage_for(&self, kind: &str) -> Option<&StorageRef> {
        self.storages.iter().find(|s| s.kind() == kind)
    }

    /// Run one full sync cycle.
    ///
    /// Local state only advances on confirmed server responses, so a run
    /// that fails part way is safe to retry. Every storage is persisted on
    /// the way out, successful or not.
    pub async fn sync(&self) -> Result<SyncReport> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| SyncError::AlreadyRunning)?;

        if !self.cipher.is_ready() {
            return Err(CryptoError::NoKey.into());
        }

        let mut report = SyncReport::default();
        let outcome = self.run(&mut report).await;

        for storage in &self.storages {
            if let Err(e) = storage.persist() {
                error!(kind = storage.kind(), "Failed to persist storage after sync: {}", e);
                if outcome.is_ok() {
                    return Err(e.into());
                }
            }
        }

        outcome.map(|()| report)
    }

    async fn run(&self, report: &mut SyncReport) -> Result<()> {
        let plan = self.collect()?;
        debug!(
            creates = plan.creates.len(),
            deletes = plan.deletes.len(),
            updates = plan.updates.len(),
            "Collected local changes"
        );

        for (storage, candidate) in &plan.discards {
            storage.confirm_delete(candidate.local_id)?;
            report.discarded += 1;
        }

        self.push_creates(&plan.creates, report).await?;
        self.push_deletes(&plan.deletes, report).await?;
        self.push_updates(&plan.updates, report).await?;
        info!(
            created = report.created,
            deleted = report.deleted,
            updated = report.updated,
            rejected = report.rejected.len(),
            "Push phase complete"
        );

        self.pull(report).await?;
        info!(
            created = report.pulled_created,
            updated = report.pulled_updated,
            deleted = report.pulled_deleted,
            conflicts = report.conflicts.len(),
            corrupted = report.corrupted.len(),
            "Pull phase complete"
        );
        Ok(())
    }

    /// Partition every record by the operation it needs.
    fn collect(&self) -> Result<PushPlan> {
        let mut plan = PushPlan::default();
        for storage in &self.storages {
            for candidate in storage.list_for_sync()? {
                let flags = candidate.flags;
                let entry = (storage.clone(), candidate);
                if flags.is_conflict {
                    continue;
                } else if flags.is_new && flags.is_delete {
                    plan.discards.push(entry);
                } else if flags.is_new {
                    plan.creates.push(entry);
                } else if flags.is_delete {
                    plan.deletes.push(entry);
                } else if flags.is_update {
                    plan.updates.push(entry);
                }
            }
        }
        Ok(plan)
    }

    fn seal(&self, storage: &StorageRef, local_id: LocalId) -> Result<Vec<u8>> {
        let data = storage.serialize(local_id)?;
        let envelope = Envelope::new(storage.kind(), data)
            .to_bytes()
            .map_err(|e| SyncError::Envelope(e.to_string()))?;
        let sealed = self.cipher.encrypt(&zeroize::Zeroizing::new(envelope))?;
        Ok(sealed)
    }

    async fn push_creates(
        &self,
        creates: &[(StorageRef, SyncCandidate)],
        report: &mut SyncReport,
    ) -> Result<()> {
        for (storage, candidate) in creates {
            let ciphertext = self.seal(storage, candidate.local_id)?;
            let (external_id, version) = self
                .remote
                .create_vault(&ciphertext, candidate.blob_url.as_deref())
                .await?;
            storage.confirm_push(candidate.local_id, &external_id, version, candidate.edit_seq)?;
            report.created += 1;
        }
        Ok(())
    }

    async fn push_deletes(
        &self,
        deletes: &[(StorageRef, SyncCandidate)],
        report: &mut SyncReport,
    ) -> Result<()> {
        for (storage, candidate) in deletes {
            let external_id = candidate
                .external_id
                .as_deref()
                .ok_or(SyncError::MissingExternalId(candidate.local_id))?;

            match self.remote.delete_vault(external_id, candidate.version).await {
                Ok(()) => {
                    storage.confirm_delete(candidate.local_id)?;
                    report.deleted += 1;
                }
                Err(RemoteError::Conflict) => {
                    warn!(
                        kind = storage.kind(),
                        local_id = candidate.local_id,
                        external_id,
                        "Delete rejected with version conflict"
                    );
                    return Err(SyncError::DeleteConflict {
                        kind: storage.kind().to_string(),
                        local_id: candidate.local_id,
                        external_id: external_id.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn push_updates(
        &self,
        updates: &[(StorageRef, SyncCandidate)],
        report: &mut SyncReport,
    ) -> Result<()> {
        for (storage, candidate) in updates {
            let external_id = candidate
                .external_id
                .as_deref()
                .ok_or(SyncError::MissingExternalId(candidate.local_id))?;
            let ciphertext = self.seal(storage, candidate.local_id)?;

            match self
                .remote
                .update_vault(external_id, candidate.version, &ciphertext)
                .await
            {
                Ok(version) => {
                    storage.confirm_push(
                        candidate.local_id,
                        external_id,
                        version,
                        candidate.edit_seq,
                    )?;
                    report.updated += 1;
                }
                Err(e @ (RemoteError::Conflict | RemoteError::NotFound)) => {
                    warn!(
                        kind = storage.kind(),
                        local_id = candidate.local_id,
                        external_id,
                        "Update rejected: {}",
                        e
                    );
                    report.rejected.push(ConflictNotice::new(
                        storage.kind(),
                        candidate,
                        external_id,
                        candidate.version,
                        matches!(e, RemoteError::NotFound),
                    ));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn pull(&self, report: &mut SyncReport) -> Result<()> {
        let mut known: HashMap<String, (StorageRef, SyncCandidate)> = HashMap::new();
        let mut manifest = Vec::new();
        for storage in &self.storages {
            for candidate in storage.list_for_sync()? {
                if let Some(external_id) = candidate.external_id.clone() {
                    manifest.push(VersionEntry {
                        id: external_id.clone(),
                        version: candidate.version,
                    });
                    known.insert(external_id, (storage.clone(), candidate));
                }
            }
        }

        let blobs = self.remote.sync_delta(&manifest).await?;
        debug!(manifest = manifest.len(), received = blobs.len(), "Pulled delta");

        let plan = self.classify(blobs, &known, report)?;

        for change in &plan.deletes {
            change
                .storage
                .apply_server_delete(&change.blob.id, change.blob.version)?;
            report.pulled_deleted += 1;
        }
        for change in &plan.creates {
            change.storage.apply_server_create(
                &change.blob.id,
                change.blob.version,
                &change.data,
                change.blob.blob_url.as_deref(),
            )?;
            report.pulled_created += 1;
        }
        for change in &plan.updates {
            change
                .storage
                .apply_server_update(&change.blob.id, change.blob.version, &change.data)?;
            report.pulled_updated += 1;
        }
        Ok(())
    }

    /// Decrypt and route each blob, flagging conflicts on the spot.
    fn classify(
        &self,
        blobs: Vec<VaultBlob>,
        known: &HashMap<String, (StorageRef, SyncCandidate)>,
        report: &mut SyncReport,
    ) -> Result<PullPlan> {
        let mut plan = PullPlan::default();

        for blob in blobs {
            let local = known.get(&blob.id);

            let (storage, data) = if blob.is_deleted {
                match local {
                    Some((storage, _)) => (storage.clone(), Vec::new()),
                    None => {
                        debug!(external_id = %blob.id, "Deleted blob unknown locally");
                        continue;
                    }
                }
            } else {
                let envelope = match self.open(&blob) {
                    Ok(envelope) => envelope,
                    Err(reason) => {
                        warn!(external_id = %blob.id, "Skipping corrupted blob: {}", reason);
                        report.corrupted.push(blob.id.clone());
                        continue;
                    }
                };
                let storage = match local {
                    Some((storage, _)) => Some(storage.clone()),
                    None => self.storage_for(&envelope.kind).cloned(),
                };
                match storage {
                    Some(storage) => (storage, envelope.data),
                    None => {
                        debug!(external_id = %blob.id, kind = %envelope.kind, "Skipping unknown storage kind");
                        report.skipped_unknown_kind += 1;
                        continue;
                    }
                }
            };

            let candidate = local.map(|(_, candidate)| candidate);
            let change = PendingChange {
                storage,
                blob,
                data,
            };
            match classify(candidate, &change.blob) {
                PullAction::Create => plan.creates.push(change),
                PullAction::Update => plan.updates.push(change),
                PullAction::Delete => plan.deletes.push(change),
                PullAction::Skip => {}
                PullAction::Conflict => {
                    let Some(candidate) = candidate else { continue };
                    let remote = if change.blob.is_deleted {
                        RemoteChange::Deleted {
                            version: change.blob.version,
                        }
                    } else {
                        RemoteChange::Updated {
                            version: change.blob.version,
                            payload: &change.data,
                        }
                    };
                    change.storage.flag_conflict(candidate.local_id, remote)?;
                    warn!(
                        kind = change.storage.kind(),
                        local_id = candidate.local_id,
                        local_version = candidate.version,
                        remote_version = change.blob.version,
                        "Conflict flagged"
                    );
                    report.conflicts.push(ConflictNotice::new(
                        change.storage.kind(),
                        candidate,
                        &change.blob.id,
                        change.blob.version,
                        change.blob.is_deleted,
                    ));
                }
            }
        }

        Ok(plan)
    }

    fn open(&self, blob: &VaultBlob) -> std::result::Result<Envelope, String> {
        let plaintext = self
            .cipher
            .decrypt(&blob.ciphertext)
            .map_err(|e| e.to_string())?;
        Envelope::from_bytes(&zeroize::Zeroizing::new(plaintext)).map_err(|e| e.to_string())
    }
}
