//! Cryptographic primitives for the vault.
//!
//! This module provides:
//! - Argon2id master key derivation from login + password
//! - AES-256-GCM encryption/decryption of small blobs
//! - Chunked AES-256-GCM streaming for file bodies
//! - Per-file key generation and wrapping

pub mod cipher;
pub mod kdf;
pub mod stream;

pub use cipher::{decrypt_blob, encrypt_blob, FileKey, MasterKey, VaultCipher};
pub use kdf::{derive_master_key, KdfParams};
pub use stream::{decrypt_copy, encrypt_copy, StreamDecryptor, StreamEncryptor};

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("No master key set for this session")]
    NoKey,

    #[error("Key derivation failed: {0}")]
    KdfFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Authentication failed - data may have been tampered with")]
    AuthenticationFailed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;
