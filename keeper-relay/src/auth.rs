//! Session tokens and the auth middleware for the relay server.
//!
//! A token is `base64url(user_id:expiry) . base64url(HMAC-SHA256)`; the
//! relay keeps no session table.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::RelayError;
use crate::server::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Authenticated caller, inserted into request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
}

pub struct TokenSigner {
    secret: Vec<u8>,
    ttl_secs: i64,
}

impl TokenSigner {
    pub fn new(secret: &[u8], ttl_secs: u64) -> Self {
        Self {
            secret: secret.to_vec(),
            ttl_secs: i64::try_from(ttl_secs).unwrap_or(i64::MAX),
        }
    }

    fn mac(&self) -> Result<HmacSha256, RelayError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| RelayError::Internal("Invalid token secret".to_string()))
    }

    pub fn issue(&self, user_id: &str) -> Result<String, RelayError> {
        self.issue_at(user_id, Utc::now().timestamp())
    }

    pub fn issue_at(&self, user_id: &str, now: i64) -> Result<String, RelayError> {
        let claims = format!("{}:{}", user_id, now.saturating_add(self.ttl_secs));
        let mut mac = self.mac()?;
        mac.update(claims.as_bytes());
        let tag = mac.finalize().into_bytes();
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(claims),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// Check signature and expiry, returning the user id.
    pub fn verify(&self, token: &str) -> Result<String, RelayError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    pub fn verify_at(&self, token: &str, now: i64) -> Result<String, RelayError> {
        let invalid = || RelayError::Auth("Invalid session token".to_string());

        let (claims_b64, tag_b64) = token.split_once('.').ok_or_else(invalid)?;
        let claims = URL_SAFE_NO_PAD.decode(claims_b64).map_err(|_| invalid())?;
        let tag = URL_SAFE_NO_PAD.decode(tag_b64).map_err(|_| invalid())?;

        let mut mac = self.mac()?;
        mac.update(&claims);
        mac.verify_slice(&tag).map_err(|_| invalid())?;

        let claims = String::from_utf8(claims).map_err(|_| invalid())?;
        let (user_id, expiry) = claims.rsplit_once(':').ok_or_else(invalid)?;
        let expiry: i64 = expiry.parse().map_err(|_| invalid())?;
        if now > expiry {
            return Err(RelayError::Auth("Session expired".to_string()));
        }
        Ok(user_id.to_string())
    }
}

/// Auth middleware: verifies the bearer token on every authenticated request.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, RelayError> {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| RelayError::Auth("Missing Authorization header".to_string()))?
        .strip_prefix("Bearer ")
        .ok_or_else(|| RelayError::Auth("Invalid auth scheme".to_string()))?;

    let user_id = state.tokens.verify(token)?;
    request.extensions_mut().insert(AuthUser { user_id });

    Ok(next.run(request).await)
}
