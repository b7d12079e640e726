//! Argon2id key derivation for the session master key.
//!
//! The user's login acts as the salt, so the same (login, password) pair
//! always yields the same key on every device. Argon2 needs at least
//! 8 salt bytes, so the login is stretched through SHA-256 first.
//!
//! Default parameters target roughly 100ms on a laptop:
//! - Memory cost: 19 MiB (19,456 KiB)
//! - Time cost: 2 iterations
//! - Parallelism: 1 lane
//! - Output length: 32 bytes

use crate::crypto::{CryptoError, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Salt length fed to Argon2 (derived from the login).
const SALT_LEN: usize = 16;

/// Tunable Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub mem_cost: u32,
    /// Number of iterations
    pub time_cost: u32,
    /// Number of lanes
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost: 19_456,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Verify that parameters are within acceptable ranges
    pub fn validate(&self) -> Result<()> {
        if self.mem_cost < 8 * self.parallelism.max(1) {
            return Err(CryptoError::KdfFailed("Memory cost too low".to_string()));
        }
        if self.time_cost < 1 {
            return Err(CryptoError::KdfFailed(
                "Time cost too low (minimum: 1)".to_string(),
            ));
        }
        if self.parallelism < 1 {
            return Err(CryptoError::KdfFailed(
                "Parallelism too low (minimum: 1)".to_string(),
            ));
        }
        Ok(())
    }
}

fn login_salt(login: &str) -> [u8; SALT_LEN] {
    let digest = Sha256::digest(login.as_bytes());
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&digest[..SALT_LEN]);
    salt
}

/// Derive the 32-byte master key from a login and password.
///
/// Deterministic for the same inputs and parameters. The returned buffer
/// is zeroized when dropped; callers must never log or persist it.
pub fn derive_master_key(
    login: &str,
    password: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; 32]>> {
    params.validate()?;

    let params_obj = Params::new(
        params.mem_cost,
        params.time_cost,
        params.parallelism,
        Some(32),
    )
    .map_err(|e| CryptoError::KdfFailed(format!("Invalid parameters: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params_obj);

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password, &login_salt(login), &mut key[..])
        .map_err(|e| CryptoError::KdfFailed(format!("Hashing failed: {}", e)))?;

    Ok(key)
}
