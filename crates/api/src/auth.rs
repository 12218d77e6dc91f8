//! Bearer-token authentication.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use domain::{DomainError, UserProfile};
use store::Store;

use crate::error::ApiError;
use crate::state::AppState;

const SCHEME: &str = "token";

/// The authenticated caller, resolved from `Authorization: Token <key>`.
///
/// Handlers taking this extractor reject unauthenticated requests with 401
/// before running.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserProfile);

impl<S: Store> FromRequestParts<Arc<AppState<S>>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(token_key)
            .ok_or(DomainError::Unauthenticated)?;

        let user = state.identity.authenticate(key).await?;
        tracing::debug!(user_id = %user.id, "Authenticated request");
        Ok(AuthUser(user))
    }
}

/// Extracts the key from a `Token <key>` header value. The scheme is
/// matched case-insensitively.
fn token_key(header: &str) -> Option<&str> {
    let (scheme, key) = header.trim().split_once(' ')?;
    let key = key.trim();
    if !scheme.eq_ignore_ascii_case(SCHEME) || key.is_empty() || key.contains(' ') {
        return None;
    }
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_key_parsing() {
        assert_eq!(token_key("Token abc123"), Some("abc123"));
        assert_eq!(token_key("token abc123"), Some("abc123"));
        assert_eq!(token_key("TOKEN   abc123 "), Some("abc123"));
        assert_eq!(token_key("Bearer abc123"), None);
        assert_eq!(token_key("Token"), None);
        assert_eq!(token_key("Token "), None);
        assert_eq!(token_key("Token a b"), None);
    }
}
