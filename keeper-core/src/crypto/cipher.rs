//! AES-256-GCM encryption for vault blobs and key wrapping.
//!
//! Wire format for every sealed blob: `nonce(12) || ciphertext || auth_tag(16)`.
//! Each call draws a fresh random nonce, so sealing the same plaintext
//! twice never yields the same bytes.

use crate::crypto::kdf::{derive_master_key, KdfParams};
use crate::crypto::{CryptoError, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use std::sync::{PoisonError, RwLock};
use zeroize::{Zeroize, ZeroizeOnDrop};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// The session master key derived from login + password.
///
/// Never serialized, never logged. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; 32],
}

impl MasterKey {
    /// Derive the master key with the given Argon2id parameters.
    pub fn derive(login: &str, password: &[u8], params: &KdfParams) -> Result<Self> {
        let key = derive_master_key(login, password, params)?;
        Ok(Self { key: *key })
    }

    /// Create a key from raw bytes (use with caution)
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// A random per-file key for the streaming cipher.
///
/// Stored only in wrapped form (sealed with the master key) inside
/// the file record's payload.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct FileKey {
    key: [u8; 32],
}

impl FileKey {
    /// Generate a new random file key
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        Self { key: key.into() }
    }

    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl std::fmt::Debug for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FileKey([REDACTED])")
    }
}

fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext_with_tag = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut result = Vec::with_capacity(NONCE_LEN + ciphertext_with_tag.len());
    result.extend_from_slice(nonce.as_slice());
    result.extend_from_slice(&ciphertext_with_tag);
    Ok(result)
}

fn open(key: &[u8; 32], blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::DecryptionFailed("Blob too short".to_string()));
    }

    let (nonce_bytes, ciphertext_with_tag) = blob.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(key.into());

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext_with_tag)
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// Encrypt a blob with the master key.
///
/// Returns `nonce(12) || ciphertext || auth_tag(16)`.
pub fn encrypt_blob(key: &MasterKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    seal(key.as_bytes(), plaintext)
}

/// Decrypt a blob sealed by [`encrypt_blob`].
///
/// Any tampering, truncation or wrong key fails with
/// [`CryptoError::AuthenticationFailed`]; wrong plaintext is never returned.
pub fn decrypt_blob(key: &MasterKey, blob: &[u8]) -> Result<Vec<u8>> {
    open(key.as_bytes(), blob)
}

/// Session holder for the master key.
///
/// Every operation fails with [`CryptoError::NoKey`] until
/// [`VaultCipher::set_master_key`] (or [`VaultCipher::install`]) has run.
#[derive(Default)]
pub struct VaultCipher {
    key: RwLock<Option<MasterKey>>,
    params: KdfParams,
}

impl VaultCipher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use non-default KDF parameters for [`VaultCipher::set_master_key`].
    pub fn with_params(params: KdfParams) -> Self {
        Self {
            key: RwLock::new(None),
            params,
        }
    }

    /// Derive the master key from the user's credentials and make it current.
    pub fn set_master_key(&self, login: &str, password: &str) -> Result<()> {
        let key = MasterKey::derive(login, password.as_bytes(), &self.params)?;
        self.install(key);
        Ok(())
    }

    /// Make an already derived key current.
    pub fn install(&self, key: MasterKey) {
        *self.key.write().unwrap_or_else(PoisonError::into_inner) = Some(key);
    }

    /// Drop the current key (zeroized on drop).
    pub fn clear(&self) {
        self.key.write().unwrap_or_else(PoisonError::into_inner).take();
    }

    pub fn is_ready(&self) -> bool {
        self.key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn with_key<T>(&self, f: impl FnOnce(&MasterKey) -> Result<T>) -> Result<T> {
        let guard = self.key.read().unwrap_or_else(PoisonError::into_inner);
        let key = guard.as_ref().ok_or(CryptoError::NoKey)?;
        f(key)
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.with_key(|key| encrypt_blob(key, plaintext))
    }

    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>> {
        self.with_key(|key| decrypt_blob(key, blob))
    }

    /// Seal a per-file key with the master key.
    pub fn wrap_file_key(&self, file_key: &FileKey) -> Result<Vec<u8>> {
        self.with_key(|key| encrypt_blob(key, file_key.as_bytes()))
    }

    /// Recover a per-file key sealed by [`VaultCipher::wrap_file_key`].
    pub fn unwrap_file_key(&self, wrapped: &[u8]) -> Result<FileKey> {
        let raw = zeroize::Zeroizing::new(self.decrypt(wrapped)?);
        let bytes: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: 32,
                got: raw.len(),
            })?;
        Ok(FileKey::from_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> KdfParams {
        KdfParams {
            mem_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    fn ready_cipher(login: &str, password: &str) -> VaultCipher {
        let cipher = VaultCipher::with_params(fast_params());
        cipher.set_master_key(login, password).unwrap();
        cipher
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let cipher = ready_cipher("alice", "correct horse");
        for plaintext in [&b""[..], b"x", b"Hello, World! This is a test."] {
            let sealed = cipher.encrypt(plaintext).unwrap();
            assert_eq!(cipher.decrypt(&sealed).unwrap(), plaintext);
        }
    }

    #[test]
    fn no_key_fails_closed() {
        let cipher = VaultCipher::new();
        assert!(!cipher.is_ready());
        assert!(matches!(cipher.encrypt(b"data"), Err(CryptoError::NoKey)));
        assert!(matches!(cipher.decrypt(&[0u8; 40]), Err(CryptoError::NoKey)));
        assert!(matches!(
            cipher.wrap_file_key(&FileKey::generate()),
            Err(CryptoError::NoKey)
        ));
    }

    #[test]
    fn clear_removes_key() {
        let cipher = ready_cipher("alice", "pw");
        assert!(cipher.is_ready());
        cipher.clear();
        assert!(matches!(cipher.encrypt(b"data"), Err(CryptoError::NoKey)));
    }

    #[test]
    fn different_password_fails_to_decrypt() {
        let alice = ready_cipher("alice", "correct horse");
        let wrong = ready_cipher("alice", "battery staple");

        let sealed = alice.encrypt(b"secret").unwrap();
        assert!(matches!(
            wrong.decrypt(&sealed),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn same_credentials_share_key() {
        let first = ready_cipher("alice", "pw");
        let second = ready_cipher("alice", "pw");
        let sealed = first.encrypt(b"portable").unwrap();
        assert_eq!(second.decrypt(&sealed).unwrap(), b"portable");
    }

    #[test]
    fn tampering_detected() {
        let cipher = ready_cipher("alice", "pw");
        let sealed = cipher.encrypt(b"Original data").unwrap();

        for index in [0, NONCE_LEN + 1, sealed.len() - 1] {
            let mut tampered = sealed.clone();
            tampered[index] ^= 0xFF;
            assert!(cipher.decrypt(&tampered).is_err());
        }

        assert!(cipher.decrypt(&sealed[..sealed.len() - 3]).is_err());
        assert!(cipher.decrypt(&[0u8; 27]).is_err());
    }

    #[test]
    fn unique_nonces_across_encryptions() {
        let cipher = ready_cipher("alice", "pw");
        let enc1 = cipher.encrypt(b"same data").unwrap();
        let enc2 = cipher.encrypt(b"same data").unwrap();
        assert_ne!(&enc1[..NONCE_LEN], &enc2[..NONCE_LEN]);
        assert_ne!(enc1, enc2);
    }

    #[test]
    fn file_key_wrap_roundtrip() {
        let cipher = ready_cipher("alice", "pw");
        let file_key = FileKey::generate();
        let wrapped = cipher.wrap_file_key(&file_key).unwrap();
        let unwrapped = cipher.unwrap_file_key(&wrapped).unwrap();
        assert_eq!(file_key.as_bytes(), unwrapped.as_bytes());

        let other = ready_cipher("mallory", "pw");
        assert!(other.unwrap_file_key(&wrapped).is_err());
    }
}
