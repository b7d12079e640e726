//! Blob upload/download handlers.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::error::RelayError;
use crate::server::AppState;

#[derive(Serialize)]
pub struct UploadResponse {
    pub url: String,
}

pub async fn upload(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Body,
) -> Result<Json<UploadResponse>, RelayError> {
    let (url, _) = state
        .blobs
        .save(&user.user_id, body.into_data_stream())
        .await?;
    Ok(Json(UploadResponse { url }))
}

pub async fn download(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(name): Path<String>,
) -> Result<Response, RelayError> {
    let stream = state.blobs.open(&user.user_id, &name).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Body::from_stream(stream),
    )
        .into_response())
}
