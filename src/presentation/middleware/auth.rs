//! Authentication Middleware
//!
//! JWT validation for the socket upgrade and the chat REST routes. The
//! token comes from the `Authorization: Bearer` header or, for browser
//! socket clients that cannot set headers, the `token` query parameter.

use axum::{
    extract::{Query, Request, State},
    http::{header::AUTHORIZATION, HeaderMap, Uri},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;
use crate::startup::AppState;

/// JWT claims structure
///
/// Issuers differ on where the user id lives; `user_id` wins over `sub`.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Claims {
    /// Subject (user ID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at time (Unix timestamp)
    #[serde(default)]
    pub iat: i64,
}

impl Claims {
    pub fn subject(&self) -> Option<&str> {
        [self.user_id.as_deref(), self.sub.as_deref()]
            .into_iter()
            .flatten()
            .find(|id| !id.trim().is_empty())
    }
}

/// Authenticated user extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Bearer header first, then the `token` query parameter.
pub fn extract_token(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let from_header = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = from_header {
        return Some(token.to_string());
    }

    Query::<TokenQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|t| !t.is_empty())
}

/// Decode and validate a token, returning the user it was issued to.
pub fn verify_token(token: &str, secret: &str) -> Result<AuthUser, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::Unauthorized("Token expired".into())
        }
        _ => AppError::Unauthorized("Invalid token".into()),
    })?;

    let user_id = token_data
        .claims
        .subject()
        .ok_or_else(|| AppError::Unauthorized("Invalid token claims".into()))?
        .to_string();

    Ok(AuthUser { user_id })
}

/// Authentication middleware that validates JWT tokens
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(request.headers(), request.uri())
        .ok_or_else(|| AppError::Unauthorized("Missing authentication token".into()))?;

    let user = verify_token(&token, &state.settings.jwt.secret)?;
    tracing::debug!(user_id = %user.user_id, "Authenticated request");

    // Insert authenticated user into request extensions
    request.extensions_mut().insert(user);

    // Continue to the next handler
    Ok(next.run(request).await)
}
