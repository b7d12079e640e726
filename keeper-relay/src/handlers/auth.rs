//! Login and session check handlers.

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::AuthUser;
use crate::error::RelayError;
use crate::server::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Serialize)]
pub struct SessionInfo {
    pub user_id: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, RelayError> {
    let user_id = state.users.login(&req.login, &req.password)?;
    let token = state.tokens.issue(&user_id)?;
    info!(user_id = %user_id, "Session issued");
    Ok(Json(LoginResponse { token }))
}

pub async fn check(Extension(user): Extension<AuthUser>) -> Json<SessionInfo> {
    Json(SessionInfo {
        user_id: user.user_id,
    })
}
