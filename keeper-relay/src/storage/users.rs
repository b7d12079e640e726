//! User account rows.

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::error::UserError;

#[derive(Debug, Clone)]
pub struct StoredUser {
    pub id: String,
    pub login: String,
    pub password_hash: String,
}

pub struct UserRepository;

impl UserRepository {
    pub fn find_by_login(conn: &Connection, login: &str) -> rusqlite::Result<Option<StoredUser>> {
        conn.query_row(
            "SELECT id, login, password_hash FROM users WHERE login = ?1",
            [login],
            |row| {
                Ok(StoredUser {
                    id: row.get(0)?,
                    login: row.get(1)?,
                    password_hash: row.get(2)?,
                })
            },
        )
        .optional()
    }

    /// Insert a user; a taken login surfaces as
    /// [`UserError::LoginAlreadyExists`].
    pub fn insert(conn: &Connection, user: &StoredUser, now: i64) -> Result<(), UserError> {
        conn.execute(
            "INSERT INTO users (id, login, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user.id, user.login, user.password_hash, now],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == ErrorCode::ConstraintViolation =>
            {
                UserError::LoginAlreadyExists
            }
            other => UserError::Database(other),
        })?;
        Ok(())
    }
}
