//! Generic in-memory record arena with encrypted file persistence.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::crypto::VaultCipher;
use crate::storage::record::{LocalId, Record, RecordPayload, RemoteRevision, SyncCandidate, SyncFlags};
use crate::storage::{RemoteChange, Result, StorageError, SyncStorage};
use crate::sync::conflict::Resolution;

/// Everything persisted for one storage kind.
#[derive(Debug, Serialize, Deserialize)]
struct VaultState<P> {
    records: BTreeMap<LocalId, Record<P>>,
    external_index: HashMap<String, LocalId>,
    next_id: LocalId,
}

impl<P> Default for VaultState<P> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            external_index: HashMap::new(),
            next_id: 1,
        }
    }
}

impl<P> VaultState<P> {
    fn allocate_id(&mut self) -> LocalId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record_mut(&mut self, local_id: LocalId) -> Result<&mut Record<P>> {
        self.records
            .get_mut(&local_id)
            .ok_or(StorageError::NotFound(local_id))
    }

    /// Resolve an external id, repairing a dangling index entry.
    fn lookup_external(&mut self, external_id: &str) -> Option<LocalId> {
        let local_id = *self.external_index.get(external_id)?;
        if self.records.contains_key(&local_id) {
            Some(local_id)
        } else {
            warn!(external_id, "Dropping dangling external index entry");
            self.external_index.remove(external_id);
            None
        }
    }

    fn remove(&mut self, local_id: LocalId) -> Option<Record<P>> {
        let record = self.records.remove(&local_id)?;
        if let Some(external_id) = &record.external_id {
            self.external_index.remove(external_id);
        }
        Some(record)
    }
}

/// Local storage for one record kind.
///
/// Reads take the shared lock, every mutation takes the exclusive lock for
/// the duration of the in-memory change only.
pub struct LocalVault<P> {
    path: Option<PathBuf>,
    cipher: Arc<VaultCipher>,
    state: RwLock<VaultState<P>>,
}

impl<P: RecordPayload> LocalVault<P> {
    /// A storage with no backing file.
    pub fn in_memory(cipher: Arc<VaultCipher>) -> Self {
        Self {
            path: None,
            cipher,
            state: RwLock::new(VaultState::default()),
        }
    }

    /// Open (or create) the storage file at `path`.
    ///
    /// A missing file is created empty and a zero-length file yields an
    /// empty collection. Anything else must decrypt with the session key.
    pub fn open(path: impl Into<PathBuf>, cipher: Arc<VaultCipher>) -> Result<Self> {
        let vault = Self {
            path: Some(path.into()),
            cipher,
            state: RwLock::new(VaultState::default()),
        };
        vault.load()?;
        Ok(vault)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Reload the collection from the backing file, replacing memory state.
    pub fn load(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::File::create(path)?;
                debug!(kind = P::KIND, path = %path.display(), "Created empty storage file");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let state = if bytes.is_empty() {
            VaultState::default()
        } else {
            let plaintext = zeroize::Zeroizing::new(self.cipher.decrypt(&bytes)?);
            bincode::deserialize(&plaintext).map_err(|e| StorageError::Encoding(e.to_string()))?
        };

        let mut guard = self.write()?;
        *guard = state;
        info!(kind = P::KIND, records = guard.records.len(), "Loaded local storage");
        Ok(())
    }

    /// Encrypt and atomically write the collection to the backing file.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let plaintext = {
            let guard = self.read()?;
            zeroize::Zeroizing::new(
                bincode::serialize(&*guard).map_err(|e| StorageError::Encoding(e.to_string()))?,
            )
        };
        let sealed = self.cipher.encrypt(&plaintext)?;

        let tmp = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&sealed)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;

        debug!(kind = P::KIND, path = %path.display(), "Saved local storage");
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, VaultState<P>>> {
        self.state
            .read()
            .map_err(|_| StorageError::LockPoisoned(P::KIND.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, VaultState<P>>> {
        self.state
            .write()
            .map_err(|_| StorageError::LockPoisoned(P::KIND.to_string()))
    }

    // --- Application-facing CRUD ---

    /// Add a new record; it is pushed on the next sync.
    pub fn create(&self, payload: P) -> Result<Record<P>> {
        let mut state = self.write()?;
        let local_id = state.allocate_id();
        let record = Record {
            local_id,
            external_id: None,
            payload,
            version: 0,
            flags: SyncFlags {
                is_new: true,
                ..SyncFlags::default()
            },
            edit_seq: 0,
            conflict: None,
        };
        state.records.insert(local_id, record.clone());
        Ok(record)
    }

    /// Replace the payload of a record not marked for deletion.
    pub fn update(&self, local_id: LocalId, payload: P) -> Result<()> {
        let mut state = self.write()?;
        let record = state.record_mut(local_id)?;
        if record.flags.is_delete {
            return Err(StorageError::RecordDeleted(local_id));
        }
        record.payload = payload;
        record.flags.is_update = true;
        record.edit_seq += 1;
        Ok(())
    }

    /// Toggle the deletion mark; calling twice before a sync undoes it.
    pub fn soft_delete(&self, local_id: LocalId) -> Result<bool> {
        let mut state = self.write()?;
        let record = state.record_mut(local_id)?;
        record.flags.is_delete = !record.flags.is_delete;
        Ok(record.flags.is_delete)
    }

    pub fn get(&self, local_id: LocalId) -> Result<Record<P>> {
        self.read()?
            .records
            .get(&local_id)
            .cloned()
            .ok_or(StorageError::NotFound(local_id))
    }

    pub fn find_by_external_id(&self, external_id: &str) -> Result<Option<Record<P>>> {
        let state = self.read()?;
        Ok(state
            .external_index
            .get(external_id)
            .and_then(|id| state.records.get(id))
            .cloned())
    }

    /// All records ordered by local id.
    pub fn list(&self) -> Result<Vec<Record<P>>> {
        Ok(self.read()?.records.values().cloned().collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.records.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Decode a transported payload of this kind.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<P> {
        P::decode(bytes)
    }

    /// Settle a flagged conflict.
    ///
    /// `AcceptRemote` adopts the set-aside server revision (removing the
    /// record if the server deleted it). `KeepLocal` rebases the local edit
    /// onto the server version so the next push overwrites it; if the
    /// server deleted the record, it is re-created as a new record.
    pub fn resolve_conflict(&self, local_id: LocalId, resolution: Resolution) -> Result<()> {
        let mut state = self.write()?;
        let record = state.record_mut(local_id)?;
        let remote = record
            .conflict
            .take()
            .ok_or(StorageError::NoConflict(local_id))?;
        record.flags.is_conflict = false;

        match (resolution, remote) {
            (Resolution::AcceptRemote, RemoteRevision::Live { version, payload }) => {
                record.payload = payload;
                record.version = version;
                record.flags.is_update = false;
                record.flags.is_delete = false;
            }
            (Resolution::AcceptRemote, RemoteRevision::Deleted { .. }) => {
                state.remove(local_id);
            }
            (Resolution::KeepLocal, RemoteRevision::Live { version, .. }) => {
                record.version = version;
                record.flags.is_update = true;
            }
            (Resolution::KeepLocal, RemoteRevision::Deleted { .. }) => {
                let external_id = record.external_id.take();
                record.version = 0;
                record.flags = SyncFlags {
                    is_new: true,
                    ..SyncFlags::default()
                };
                if let Some(external_id) = external_id {
                    state.external_index.remove(&external_id);
                }
            }
        }

        info!(kind = P::KIND, local_id, ?resolution, "Conflict resolved");
        Ok(())
    }
}

impl<P: RecordPayload> SyncStorage for LocalVault<P> {
    fn kind(&self) -> &'static str {
        P::KIND
    }

    fn list_for_sync(&self) -> Result<Vec<SyncCandidate>> {
        let state = self.read()?;
        Ok(state
            .records
            .values()
            .map(|record| SyncCandidate {
                local_id: record.local_id,
                external_id: record.external_id.clone(),
                version: record.version,
                flags: record.flags,
                edit_seq: record.edit_seq,
                conflict_version: record.conflict.as_ref().map(RemoteRevision::version),
                blob_url: record.payload.blob_url().map(str::to_string),
            })
            .collect())
    }

    fn serialize(&self, local_id: LocalId) -> Result<Vec<u8>> {
        let state = self.read()?;
        let record = state
            .records
            .get(&local_id)
            .ok_or(StorageError::NotFound(local_id))?;
        record.payload.encode()
    }

    fn apply_server_create(
        &self,
        external_id: &str,
        version: u64,
        payload: &[u8],
        blob_url: Option<&str>,
    ) -> Result<()> {
        let mut payload = P::decode(payload)?;
        if let Some(url) = blob_url {
            payload.set_blob_url(url);
        }

        let mut state = self.write()?;
        if state.lookup_external(external_id).is_some() {
            debug!(kind = P::KIND, external_id, "Create already applied");
            return Ok(());
        }

        let local_id = state.allocate_id();
        state.records.insert(
            local_id,
            Record {
                local_id,
                external_id: Some(external_id.to_string()),
                payload,
                version,
                flags: SyncFlags::default(),
                edit_seq: 0,
                conflict: None,
            },
        );
        state
            .external_index
            .insert(external_id.to_string(), local_id);
        Ok(())
    }

    fn apply_server_update(&self, external_id: &str, version: u64, payload: &[u8]) -> Result<()> {
        let payload = P::decode(payload)?;

        let mut state = self.write()?;
        let local_id = state
            .lookup_external(external_id)
            .ok_or_else(|| StorageError::UnknownExternalId(external_id.to_string()))?;
        let record = state.record_mut(local_id)?;

        if record.need_sync() {
            debug!(kind = P::KIND, local_id, "Local edit pending, server update deferred");
            return Ok(());
        }
        if version <= record.version {
            debug!(kind = P::KIND, local_id, version, "Stale server update ignored");
            return Ok(());
        }

        record.payload = payload;
        record.version = version;
        Ok(())
    }

    fn apply_server_delete(&self, external_id: &str, version: u64) -> Result<()> {
        let mut state = self.write()?;
        let Some(local_id) = state.lookup_external(external_id) else {
            debug!(kind = P::KIND, external_id, "Delete already applied");
            return Ok(());
        };
        let record = state.record_mut(local_id)?;

        if record.need_sync() {
            debug!(kind = P::KIND, local_id, "Local edit pending, server delete deferred");
            return Ok(());
        }
        if version <= record.version {
            debug!(kind = P::KIND, local_id, version, "Stale server delete ignored");
            return Ok(());
        }

        state.remove(local_id);
        Ok(())
    }

    fn confirm_push(
        &self,
        local_id: LocalId,
        external_id: &str,
        version: u64,
        edit_seq: u64,
    ) -> Result<()> {
        let mut state = self.write()?;
        let record = state.record_mut(local_id)?;
        record.flags.is_new = false;
        if record.edit_seq == edit_seq {
            record.flags.is_update = false;
        } else {
            debug!(kind = P::KIND, local_id, "Record edited during push, kept pending");
            record.flags.is_update = true;
        }
        record.version = version;
        record.external_id = Some(external_id.to_string());
        state
            .external_index
            .insert(external_id.to_string(), local_id);
        Ok(())
    }

    fn confirm_delete(&self, local_id: LocalId) -> Result<()> {
        self.write()?
            .remove(local_id)
            .map(|_| ())
            .ok_or(StorageError::NotFound(local_id))
    }

    fn flag_conflict(&self, local_id: LocalId, remote: RemoteChange<'_>) -> Result<()> {
        let revision = match remote {
            RemoteChange::Updated { version, payload } => RemoteRevision::Live {
                version,
                payload: P::decode(payload)?,
            },
            RemoteChange::Deleted { version } => RemoteRevision::Deleted { version },
        };

        let mut state = self.write()?;
        let record = state.record_mut(local_id)?;
        record.flags.is_conflict = true;
        record.conflict = Some(revision);
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KdfParams;
    use crate::storage::{CredentialPayload, FilePayload};
    use tempfile::TempDir;

    fn cipher() -> Arc<VaultCipher> {
        let cipher = VaultCipher::with_params(KdfParams {
            mem_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        });
        cipher.set_master_key("alice", "pw").unwrap();
        Arc::new(cipher)
    }

    fn login(name: &str) -> CredentialPayload {
        CredentialPayload {
            login: name.to_string(),
            password: "secret".to_string(),
            site: Some("https://example.com".to_string()),
            notes: None,
        }
    }

    fn synced(vault: &LocalVault<CredentialPayload>, name: &str, ext: &str, version: u64) -> LocalId {
        let record = vault.create(login(name)).unwrap();
        vault
            .confirm_push(record.local_id, ext, version, record.edit_seq)
            .unwrap();
        record.local_id
    }

    #[test]
    fn create_allocates_increasing_ids() {
        let vault = LocalVault::in_memory(cipher());
        let a = vault.create(login("a")).unwrap();
        let b = vault.create(login("b")).unwrap();
        assert!(b.local_id > a.local_id);
        assert!(a.flags.is_new);
        assert!(a.need_sync());
        assert!(a.external_id.is_none());
    }

    #[test]
    fn local_ids_not_reused_after_delete() {
        let vault = LocalVault::in_memory(cipher());
        let a = vault.create(login("a")).unwrap();
        vault.confirm_delete(a.local_id).unwrap();
        let b = vault.create(login("b")).unwrap();
        assert_ne!(a.local_id, b.local_id);
    }

    #[test]
    fn update_sets_flag_and_rejects_deleted() {
        let vault = LocalVault::in_memory(cipher());
        let id = synced(&vault, "a", "ext-1", 0);
        vault.update(id, login("a2")).unwrap();
        let record = vault.get(id).unwrap();
        assert!(record.flags.is_update);
        assert_eq!(record.payload.login, "a2");

        assert!(vault.soft_delete(id).unwrap());
        assert!(matches!(
            vault.update(id, login("a3")),
            Err(StorageError::RecordDeleted(_))
        ));
        assert!(matches!(vault.update(999, login("x")), Err(StorageError::NotFound(999))));
    }

    #[test]
    fn soft_delete_toggles() {
        let vault = LocalVault::in_memory(cipher());
        let id = synced(&vault, "a", "ext-1", 0);
        assert!(vault.soft_delete(id).unwrap());
        assert!(vault.get(id).unwrap().flags.is_delete);
        assert!(!vault.soft_delete(id).unwrap());
        assert!(!vault.get(id).unwrap().need_sync());
    }

    #[test]
    fn confirm_push_clears_flags_and_indexes() {
        let vault = LocalVault::in_memory(cipher());
        let record = vault.create(login("a")).unwrap();
        vault.confirm_push(record.local_id, "X", 0, 0).unwrap();

        let record = vault.get(record.local_id).unwrap();
        assert!(!record.flags.is_new);
        assert_eq!(record.external_id.as_deref(), Some("X"));
        assert_eq!(record.version, 0);
        assert!(vault.find_by_external_id("X").unwrap().is_some());
    }

    #[test]
    fn edit_during_push_stays_pending() {
        let vault = LocalVault::in_memory(cipher());
        let id = synced(&vault, "a", "X", 0);
        vault.update(id, login("sent")).unwrap();
        let sent = vault.list_for_sync().unwrap()[0].edit_seq;

        vault.update(id, login("typed-meanwhile")).unwrap();
        vault.confirm_push(id, "X", 1, sent).unwrap();

        let record = vault.get(id).unwrap();
        assert_eq!(record.version, 1);
        assert!(record.flags.is_update);
        assert_eq!(record.payload.login, "typed-meanwhile");

        vault.confirm_push(id, "X", 2, record.edit_seq).unwrap();
        assert!(!vault.get(id).unwrap().need_sync());
    }

    #[test]
    fn server_create_is_idempotent() {
        let vault: LocalVault<CredentialPayload> = LocalVault::in_memory(cipher());
        let bytes = login("remote").encode().unwrap();
        vault.apply_server_create("R", 2, &bytes, None).unwrap();
        let once = vault.list().unwrap();
        vault.apply_server_create("R", 2, &bytes, None).unwrap();
        assert_eq!(vault.list().unwrap(), once);
        assert_eq!(once.len(), 1);
        assert!(!once[0].need_sync());
    }

    #[test]
    fn server_update_guards() {
        let vault = LocalVault::in_memory(cipher());
        let id = synced(&vault, "a", "X", 1);

        // stale
        vault
            .apply_server_update("X", 1, &login("stale").encode().unwrap())
            .unwrap();
        assert_eq!(vault.get(id).unwrap().payload.login, "a");

        // newer
        let newer = login("newer").encode().unwrap();
        vault.apply_server_update("X", 2, &newer).unwrap();
        let after_once = vault.get(id).unwrap();
        assert_eq!(after_once.payload.login, "newer");
        assert_eq!(after_once.version, 2);

        // idempotent
        vault.apply_server_update("X", 2, &newer).unwrap();
        assert_eq!(vault.get(id).unwrap(), after_once);

        // local edit wins until pushed
        vault.update(id, login("mine")).unwrap();
        vault
            .apply_server_update("X", 3, &login("theirs").encode().unwrap())
            .unwrap();
        assert_eq!(vault.get(id).unwrap().payload.login, "mine");

        assert!(matches!(
            vault.apply_server_update("missing", 9, &newer),
            Err(StorageError::UnknownExternalId(_))
        ));
    }

    #[test]
    fn server_delete_guards_and_idempotence() {
        let vault = LocalVault::in_memory(cipher());
        let id = synced(&vault, "a", "X", 1);

        vault.apply_server_delete("X", 1).unwrap();
        assert!(vault.get(id).is_ok(), "stale delete must not apply");

        vault.apply_server_delete("X", 2).unwrap();
        assert!(vault.get(id).is_err());
        assert!(vault.find_by_external_id("X").unwrap().is_none());

        vault.apply_server_delete("X", 2).unwrap();
        assert!(vault.is_empty().unwrap());
    }

    #[test]
    fn type_mismatch_surfaces() {
        let vault: LocalVault<CredentialPayload> = LocalVault::in_memory(cipher());
        assert!(matches!(
            vault.apply_server_create("R", 0, b"not json", None),
            Err(StorageError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn flag_conflict_keeps_payload() {
        let vault = LocalVault::in_memory(cipher());
        let id = synced(&vault, "a", "X", 0);
        vault.update(id, login("mine")).unwrap();

        let theirs = login("theirs").encode().unwrap();
        vault
            .flag_conflict(id, RemoteChange::Updated { version: 1, payload: &theirs })
            .unwrap();

        let record = vault.get(id).unwrap();
        assert!(record.flags.is_conflict);
        assert!(record.flags.is_update);
        assert_eq!(record.payload.login, "mine");
        assert_eq!(record.version, 0);
        assert_eq!(record.conflict.unwrap().version(), 1);
    }

    #[test]
    fn resolve_conflict_accept_remote() {
        let vault = LocalVault::in_memory(cipher());
        let id = synced(&vault, "a", "X", 0);
        vault.update(id, login("mine")).unwrap();
        let theirs = login("theirs").encode().unwrap();
        vault
            .flag_conflict(id, RemoteChange::Updated { version: 1, payload: &theirs })
            .unwrap();

        vault.resolve_conflict(id, Resolution::AcceptRemote).unwrap();
        let record = vault.get(id).unwrap();
        assert_eq!(record.payload.login, "theirs");
        assert_eq!(record.version, 1);
        assert_eq!(record.flags, SyncFlags::default());
        assert!(matches!(
            vault.resolve_conflict(id, Resolution::AcceptRemote),
            Err(StorageError::NoConflict(_))
        ));
    }

    #[test]
    fn resolve_conflict_keep_local() {
        let vault = LocalVault::in_memory(cipher());
        let id = synced(&vault, "a", "X", 0);
        vault.update(id, login("mine")).unwrap();
        let theirs = login("theirs").encode().unwrap();
        vault
            .flag_conflict(id, RemoteChange::Updated { version: 4, payload: &theirs })
            .unwrap();

        vault.resolve_conflict(id, Resolution::KeepLocal).unwrap();
        let record = vault.get(id).unwrap();
        assert_eq!(record.payload.login, "mine");
        assert_eq!(record.version, 4);
        assert!(record.flags.is_update);
        assert!(!record.flags.is_conflict);
    }

    #[test]
    fn resolve_conflict_against_remote_delete() {
        let vault = LocalVault::in_memory(cipher());
        let keep = synced(&vault, "keep", "K", 0);
        let drop = synced(&vault, "drop", "D", 0);
        for id in [keep, drop] {
            vault.update(id, login("edited")).unwrap();
            vault
                .flag_conflict(id, RemoteChange::Deleted { version: 1 })
                .unwrap();
        }

        vault.resolve_conflict(keep, Resolution::KeepLocal).unwrap();
        let record = vault.get(keep).unwrap();
        assert!(record.flags.is_new);
        assert!(record.external_id.is_none());
        assert!(vault.find_by_external_id("K").unwrap().is_none());

        vault.resolve_conflict(drop, Resolution::AcceptRemote).unwrap();
        assert!(vault.get(drop).is_err());
    }

    #[test]
    fn missing_file_is_created_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("credentials.vault");
        let vault: LocalVault<CredentialPayload> = LocalVault::open(&path, cipher()).unwrap();
        assert!(path.exists());
        assert!(vault.is_empty().unwrap());
    }

    #[test]
    fn zero_length_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.vault");
        fs::write(&path, b"").unwrap();
        let vault: LocalVault<CredentialPayload> = LocalVault::open(&path, cipher()).unwrap();
        assert!(vault.is_empty().unwrap());
    }

    #[test]
    fn save_and_reload_preserves_records_and_index() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.vault");
        let cipher = cipher();

        let vault = LocalVault::open(&path, cipher.clone()).unwrap();
        let id = synced(&vault, "a", "X", 3);
        let pending = vault.create(login("b")).unwrap();
        vault.save().unwrap();

        let on_disk = fs::read(&path).unwrap();
        assert!(!on_disk.windows(6).any(|w| w == b"secret"));

        let reopened: LocalVault<CredentialPayload> = LocalVault::open(&path, cipher).unwrap();
        assert_eq!(reopened.list().unwrap(), vault.list().unwrap());
        assert_eq!(reopened.find_by_external_id("X").unwrap().unwrap().local_id, id);

        // counter survives reload
        let next = reopened.create(login("c")).unwrap();
        assert!(next.local_id > pending.local_id);
    }

    #[test]
    fn reload_keeps_empty_optional_fields() {
        let dir = TempDir::new().unwrap();
        let cipher = cipher();

        let creds_path = dir.path().join("credentials.vault");
        let creds = LocalVault::open(&creds_path, cipher.clone()).unwrap();
        let bare = CredentialPayload {
            login: "bare".to_string(),
            password: "pw".to_string(),
            site: None,
            notes: None,
        };
        let id = creds.create(bare.clone()).unwrap().local_id;
        creds.confirm_push(id, "X", 7, 0).unwrap();
        creds.create(bare).unwrap();
        creds.save().unwrap();

        let reopened: LocalVault<CredentialPayload> =
            LocalVault::open(&creds_path, cipher.clone()).unwrap();
        assert_eq!(reopened.list().unwrap(), creds.list().unwrap());
        assert_eq!(reopened.get(id).unwrap().version, 7);

        let files_path = dir.path().join("files.vault");
        let files = LocalVault::open(&files_path, cipher.clone()).unwrap();
        let id = files
            .create(FilePayload {
                file_name: "notes".to_string(),
                extension: None,
                size: 12,
                blob_url: None,
                wrapped_key: vec![9; 60],
            })
            .unwrap()
            .local_id;
        files.confirm_push(id, "F", 5, 0).unwrap();
        files.save().unwrap();

        let reopened: LocalVault<FilePayload> = LocalVault::open(&files_path, cipher).unwrap();
        assert_eq!(reopened.list().unwrap(), files.list().unwrap());
        assert_eq!(reopened.find_by_external_id("F").unwrap().unwrap().version, 5);
    }

    #[test]
    fn reload_with_wrong_key_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.vault");
        let vault: LocalVault<CredentialPayload> = LocalVault::open(&path, cipher()).unwrap();
        vault.create(login("a")).unwrap();
        vault.save().unwrap();

        let other = VaultCipher::with_params(KdfParams {
            mem_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        });
        other.set_master_key("alice", "not-pw").unwrap();
        assert!(matches!(
            LocalVault::<CredentialPayload>::open(&path, Arc::new(other)),
            Err(StorageError::Crypto(_))
        ));
    }
}
