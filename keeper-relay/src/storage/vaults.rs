//! Versioned vault rows.
//!
//! `version` is the only concurrency token. Every write is one conditional
//! statement, so the compare and the increment are a single atomic step
//! under SQLite's row-level write serialization.

use rusqlite::{params, Connection, OptionalExtension, Row};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVault {
    pub id: String,
    pub user_id: String,
    /// Empty once the record is deleted.
    pub ciphertext: Vec<u8>,
    pub version: i64,
    pub is_deleted: bool,
    pub blob_url: Option<String>,
}

impl StoredVault {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            ciphertext: row.get::<_, Option<Vec<u8>>>(2)?.unwrap_or_default(),
            version: row.get(3)?,
            is_deleted: row.get(4)?,
            blob_url: row.get(5)?,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, user_id, ciphertext, version, is_deleted, blob_url FROM vaults";

pub struct VaultRepository;

impl VaultRepository {
    /// Insert a fresh record at version 0.
    pub fn insert(
        conn: &Connection,
        id: &str,
        user_id: &str,
        ciphertext: &[u8],
        blob_url: Option<&str>,
        now: i64,
    ) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO vaults (id, user_id, ciphertext, version, is_deleted, blob_url, updated_at)
             VALUES (?1, ?2, ?3, 0, 0, ?4, ?5)",
            params![id, user_id, ciphertext, blob_url, now],
        )?;
        Ok(())
    }

    /// Replace the ciphertext of a live record whose version equals
    /// `expected`, returning the incremented version. `None` when no row
    /// matched.
    pub fn compare_and_update(
        conn: &Connection,
        user_id: &str,
        id: &str,
        ciphertext: &[u8],
        expected: i64,
        now: i64,
    ) -> rusqlite::Result<Option<i64>> {
        conn.query_row(
            "UPDATE vaults SET ciphertext = ?1, version = version + 1, updated_at = ?2
             WHERE id = ?3 AND user_id = ?4 AND version = ?5 AND is_deleted = 0
             RETURNING version",
            params![ciphertext, now, id, user_id, expected],
            |row| row.get(0),
        )
        .optional()
    }

    /// Soft-delete a live record whose version equals `expected`. The
    /// version is bumped so the deletion shows up in delta feeds. Returns
    /// the number of rows affected.
    pub fn soft_delete(
        conn: &Connection,
        user_id: &str,
        id: &str,
        expected: i64,
        now: i64,
    ) -> rusqlite::Result<usize> {
        conn.execute(
            "UPDATE vaults SET ciphertext = NULL, is_deleted = 1, version = version + 1, updated_at = ?1
             WHERE id = ?2 AND user_id = ?3 AND version = ?4 AND is_deleted = 0",
            params![now, id, user_id, expected],
        )
    }

    pub fn get(conn: &Connection, user_id: &str, id: &str) -> rusqlite::Result<Option<StoredVault>> {
        conn.query_row(
            &format!("{} WHERE id = ?1 AND user_id = ?2", SELECT_COLUMNS),
            params![id, user_id],
            StoredVault::from_row,
        )
        .optional()
    }

    /// Every record of the user, deleted ones included.
    pub fn list_for_user(conn: &Connection, user_id: &str) -> rusqlite::Result<Vec<StoredVault>> {
        let mut stmt = conn.prepare(&format!("{} WHERE user_id = ?1 ORDER BY rowid", SELECT_COLUMNS))?;
        let rows = stmt.query_map([user_id], StoredVault::from_row)?;
        rows.collect()
    }
}
