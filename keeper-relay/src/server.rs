//! Axum router setup.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use rand::RngCore;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::{auth_middleware, TokenSigner};
use crate::blobs::BlobStore;
use crate::config::RelayConfig;
use crate::handlers::{auth, blobs, vaults};
use crate::services::{UserService, VaultService};
use crate::storage::RelayStorage;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub users: UserService,
    pub vaults: VaultService,
    pub tokens: Arc<TokenSigner>,
    pub blobs: BlobStore,
}

impl AppState {
    pub fn new(storage: RelayStorage, config: &RelayConfig) -> Self {
        let secret = if config.token_secret.is_empty() {
            warn!("No token_secret configured; sessions will not survive a restart");
            let mut secret = vec![0u8; 32];
            rand::rngs::OsRng.fill_bytes(&mut secret);
            secret
        } else {
            config.token_secret.as_bytes().to_vec()
        };

        Self {
            users: UserService::new(storage.clone()),
            vaults: VaultService::new(storage),
            tokens: Arc::new(TokenSigner::new(&secret, config.token_ttl_secs)),
            blobs: BlobStore::new(&config.blob_dir, &config.public_url),
        }
    }
}

pub fn build_router(state: AppState, config: &RelayConfig) -> Router {
    let auth_layer = middleware::from_fn_with_state(state.clone(), auth_middleware);

    // Authenticated routes
    let vault_routes = Router::new()
        .route("/api/v1/auth/check", get(auth::check))
        .route("/api/v1/vaults", post(vaults::create))
        .route(
            "/api/v1/vaults/{id}",
            put(vaults::update).delete(vaults::delete),
        )
        .route("/api/v1/vaults/sync", post(vaults::sync))
        .layer(auth_layer.clone())
        .layer(RequestBodyLimitLayer::new(config.max_payload_size));

    let blob_routes = Router::new()
        .route("/api/v1/blobs", put(blobs::upload))
        .route("/api/v1/blobs/{name}", get(blobs::download))
        .layer(auth_layer)
        .layer(RequestBodyLimitLayer::new(config.max_blob_size));

    // Unauthenticated routes
    let public = Router::new()
        .route("/api/v1/auth/login", post(auth::login))
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(config.max_payload_size));

    Router::new()
        .merge(vault_routes)
        .merge(blob_routes)
        .merge(public)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
