//! Admin token check and rate limiting for the moderation endpoints

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::app::AppState;

/// Extract the token from an `Authorization: Bearer ...` header
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

/// Compare two tokens without short-circuiting on the first mismatch
fn tokens_match(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Moderation access errors
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("Missing authorization header")]
    MissingHeader,

    #[error("Invalid authorization header format")]
    InvalidFormat,

    #[error("Invalid admin token")]
    InvalidToken,

    #[error("Too many requests")]
    RateLimited,
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self {
            AdminError::MissingHeader => StatusCode::UNAUTHORIZED,
            AdminError::InvalidFormat => StatusCode::BAD_REQUEST,
            AdminError::InvalidToken => StatusCode::UNAUTHORIZED,
            AdminError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        };

        (status, self.to_string()).into_response()
    }
}

/// Rate limit moderation requests and require the admin token when one is configured
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AdminError> {
    if !state.admin_limiter.check() {
        warn!("Moderation request rate limited");
        return Err(AdminError::RateLimited);
    }

    if let Some(expected) = state.config.admin_token.as_deref() {
        let auth_header = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AdminError::MissingHeader)?;

        let token = extract_bearer_token(auth_header).ok_or(AdminError::InvalidFormat)?;
        if !tokens_match(token, expected) {
            warn!("Rejected moderation request with invalid token");
            return Err(AdminError::InvalidToken);
        }
    }

    Ok(next.run(request).await)
}
