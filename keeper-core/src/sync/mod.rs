//! Client/server vault synchronization.
//!
//! - Versioned, master-key encrypted vault blobs over HTTP
//! - Push local creates, deletes and updates, then pull the server delta
//! - Optimistic concurrency on the server version; racing edits are
//!   flagged as conflicts, never merged
//! - Streamed, per-file encrypted transfer of file bodies

pub mod client;
pub mod conflict;
pub mod engine;
#[cfg(test)]
pub(crate) mod memory;
pub mod models;
pub mod transfer;

pub use client::{BlobReader, HttpVaultClient, RemoteError, RemoteVault};
pub use conflict::{ConflictNotice, Resolution};
pub use engine::{SyncEngine, SyncError, SyncReport};
pub use models::{Envelope, VaultBlob, VersionEntry};
pub use transfer::FileTransfer;
