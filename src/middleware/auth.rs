use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use chrono::Utc;
use std::sync::Arc;

use crate::{error::AppError, models::User, routes::AppState};

/// Token from an `Authorization: Bearer …` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// The signed-in user behind a request
///
/// Rejects missing, invalid or expired session tokens, and tokens of deleted
/// accounts, with 401.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
    pub fn id(&self) -> uuid::Uuid {
        self.0.id
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

        let claims = state.accounts.sessions().verify(token, Utc::now())?;
        let user = state.accounts.current_user(claims.sub).await?;

        Ok(AuthUser(user))
    }
}
