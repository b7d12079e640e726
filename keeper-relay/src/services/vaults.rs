//! Server vault store: identity assignment, optimistic concurrency and the
//! delta feed.

use std::collections::HashMap;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::error::VaultError;
use crate::storage::{RelayStorage, StoredVault, VaultRepository};

#[derive(Clone)]
pub struct VaultService {
    storage: RelayStorage,
}

fn parse_id(id: &str) -> Result<String, VaultError> {
    Uuid::parse_str(id)
        .map(|uuid| uuid.to_string())
        .map_err(|_| VaultError::InvalidId(id.to_string()))
}

fn to_db_version(version: u64) -> Result<i64, VaultError> {
    i64::try_from(version).map_err(|_| VaultError::InvalidVersion(version))
}

impl VaultService {
    pub fn new(storage: RelayStorage) -> Self {
        Self { storage }
    }

    /// Store a new record under a fresh id at version 0.
    pub fn create(
        &self,
        user_id: &str,
        ciphertext: &[u8],
        blob_url: Option<&str>,
    ) -> Result<(String, u64), VaultError> {
        let id = Uuid::new_v4().to_string();
        let conn = self.storage.conn()?;
        VaultRepository::insert(&conn, &id, user_id, ciphertext, blob_url, Utc::now().timestamp())?;
        debug!(user_id, vault_id = %id, "Vault created");
        Ok((id, 0))
    }

    /// Compare-and-increment: succeeds only if the stored version equals
    /// `expected`, returning `expected + 1`.
    pub fn update(
        &self,
        user_id: &str,
        id: &str,
        ciphertext: &[u8],
        expected: u64,
    ) -> Result<u64, VaultError> {
        let id = parse_id(id)?;
        let expected = to_db_version(expected)?;
        let conn = self.storage.conn()?;

        let updated = VaultRepository::compare_and_update(
            &conn,
            user_id,
            &id,
            ciphertext,
            expected,
            Utc::now().timestamp(),
        )?;
        match updated {
            Some(version) => {
                debug!(user_id, vault_id = %id, version, "Vault updated");
                Ok(version as u64)
            }
            None => match VaultRepository::get(&conn, user_id, &id)? {
                Some(stored) if !stored.is_deleted => Err(VaultError::Conflict),
                _ => Err(VaultError::NotFound),
            },
        }
    }

    /// Soft-delete gated by the same version match. No matching row is a
    /// conflict.
    pub fn delete(&self, user_id: &str, id: &str, expected: u64) -> Result<(), VaultError> {
        let id = parse_id(id)?;
        let expected = to_db_version(expected)?;
        let conn = self.storage.conn()?;

        let affected =
            VaultRepository::soft_delete(&conn, user_id, &id, expected, Utc::now().timestamp())?;
        if affected == 0 {
            return Err(VaultError::Conflict);
        }
        debug!(user_id, vault_id = %id, "Vault deleted");
        Ok(())
    }

    /// Records newer than the client's manifest, plus live records the
    /// manifest does not list. Deleted records the client never knew about
    /// are left out.
    pub fn load_delta(
        &self,
        user_id: &str,
        manifest: &[(String, u64)],
    ) -> Result<Vec<StoredVault>, VaultError> {
        let known: HashMap<&str, u64> = manifest
            .iter()
            .map(|(id, version)| (id.as_str(), *version))
            .collect();

        let conn = self.storage.conn()?;
        let delta: Vec<StoredVault> = VaultRepository::list_for_user(&conn, user_id)?
            .into_iter()
            .filter(|vault| match known.get(vault.id.as_str()) {
                Some(seen) => vault.version as u64 > *seen,
                None => !vault.is_deleted,
            })
            .collect();

        debug!(user_id, manifest = manifest.len(), delta = delta.len(), "Delta computed");
        Ok(delta)
    }
}
