//! Keeper Relay
//!
//! Authoritative, versioned vault store for keeper clients. The relay
//! stores only opaque ciphertexts: it never holds encryption keys or
//! plaintext data.

pub mod auth;
pub mod blobs;
pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod services;
pub mod storage;

pub use config::RelayConfig;
pub use error::{RelayError, UserError, VaultError};
pub use server::{build_router, AppState};
pub use storage::RelayStorage;
