//! Versioned vault handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::RelayError;
use crate::server::AppState;
use crate::storage::StoredVault;

#[derive(Deserialize)]
pub struct CreateVaultRequest {
    pub ciphertext: String, // base64
    pub blob_url: Option<String>,
}

#[derive(Serialize)]
pub struct CreateVaultResponse {
    pub id: String,
    pub version: u64,
}

#[derive(Deserialize)]
pub struct UpdateVaultRequest {
    pub version: u64,
    pub ciphertext: String, // base64
}

#[derive(Serialize)]
pub struct UpdateVaultResponse {
    pub version: u64,
}

#[derive(Deserialize)]
pub struct DeleteQuery {
    pub version: u64,
}

#[derive(Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub version: u64,
}

#[derive(Deserialize)]
pub struct SyncRequest {
    pub manifest: Vec<ManifestEntry>,
}

#[derive(Serialize)]
pub struct VaultEntry {
    pub id: String,
    pub version: u64,
    pub is_deleted: bool,
    pub ciphertext: String, // base64
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_url: Option<String>,
}

impl From<StoredVault> for VaultEntry {
    fn from(vault: StoredVault) -> Self {
        Self {
            id: vault.id,
            version: vault.version as u64,
            is_deleted: vault.is_deleted,
            ciphertext: STANDARD.encode(vault.ciphertext),
            blob_url: vault.blob_url,
        }
    }
}

#[derive(Serialize)]
pub struct SyncResponse {
    pub vaults: Vec<VaultEntry>,
}

fn decode_ciphertext(encoded: &str) -> Result<Vec<u8>, RelayError> {
    let ciphertext = STANDARD
        .decode(encoded)
        .map_err(|e| RelayError::BadRequest(format!("Invalid ciphertext: {}", e)))?;
    if ciphertext.is_empty() {
        return Err(RelayError::BadRequest("Empty ciphertext".to_string()));
    }
    Ok(ciphertext)
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateVaultRequest>,
) -> Result<Json<CreateVaultResponse>, RelayError> {
    let ciphertext = decode_ciphertext(&req.ciphertext)?;
    let (id, version) = state
        .vaults
        .create(&user.user_id, &ciphertext, req.blob_url.as_deref())?;
    Ok(Json(CreateVaultResponse { id, version }))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<UpdateVaultRequest>,
) -> Result<Json<UpdateVaultResponse>, RelayError> {
    let ciphertext = decode_ciphertext(&req.ciphertext)?;
    let version = state
        .vaults
        .update(&user.user_id, &id, &ciphertext, req.version)?;
    Ok(Json(UpdateVaultResponse { version }))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode, RelayError> {
    state.vaults.delete(&user.user_id, &id, query.version)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn sync(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, RelayError> {
    let manifest: Vec<(String, u64)> = req
        .manifest
        .into_iter()
        .map(|entry| (entry.id, entry.version))
        .collect();
    let vaults = state
        .vaults
        .load_delta(&user.user_id, &manifest)?
        .into_iter()
        .map(VaultEntry::from)
        .collect();
    Ok(Json(SyncResponse { vaults }))
}
