//! User accounts: login is find-or-create.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use rand::RngCore;
use tracing::info;
use uuid::Uuid;

use crate::error::UserError;
use crate::storage::{RelayStorage, StoredUser, UserRepository};

#[derive(Clone)]
pub struct UserService {
    storage: RelayStorage,
}

fn hash_password(password: &str) -> Result<String, UserError> {
    let mut salt = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt).map_err(|e| UserError::Hash(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| UserError::Hash(e.to_string()))
}

fn verify_password(password: &str, stored: &str) -> Result<(), UserError> {
    let parsed = PasswordHash::new(stored).map_err(|e| UserError::Hash(e.to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| UserError::InvalidCredentials)
}

impl UserService {
    pub fn new(storage: RelayStorage) -> Self {
        Self { storage }
    }

    /// Authenticate `login`, creating the account on first use. Returns the
    /// user id.
    pub fn login(&self, login: &str, password: &str) -> Result<String, UserError> {
        if login.is_empty() {
            return Err(UserError::InvalidCredentials);
        }

        if let Some(user) = self.find(login)? {
            verify_password(password, &user.password_hash)?;
            return Ok(user.id);
        }

        let user = StoredUser {
            id: Uuid::new_v4().to_string(),
            login: login.to_string(),
            password_hash: hash_password(password)?,
        };
        let inserted = {
            let conn = self.storage.conn()?;
            UserRepository::insert(&conn, &user, Utc::now().timestamp())
        };

        match inserted {
            Ok(()) => {
                info!(user_id = %user.id, "Account created");
                Ok(user.id)
            }
            // Lost a race with a concurrent first login.
            Err(UserError::LoginAlreadyExists) => {
                let existing = self.find(login)?.ok_or(UserError::InvalidCredentials)?;
                verify_password(password, &existing.password_hash)?;
                Ok(existing.id)
            }
            Err(e) => Err(e),
        }
    }

    fn find(&self, login: &str) -> Result<Option<StoredUser>, UserError> {
        let conn = self.storage.conn()?;
        Ok(UserRepository::find_by_login(&conn, login)?)
    }
}
