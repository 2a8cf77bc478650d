/**
 * Bearer Token Extraction
 *
 * Pulls the token out of `Authorization: Bearer <token>` so REST handlers
 * can hand it to the [`Authenticator`](crate::backend::auth::Authenticator)
 * together with the user they act for.
 */

use std::convert::Infallible;

use axum::http::{header::AUTHORIZATION, request::Parts, HeaderMap};

/// Bearer token of the request, if any
#[derive(Clone, Debug, Default)]
pub struct BearerToken(pub Option<String>);

impl BearerToken {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// Token from an `Authorization` header
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    match header.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Some(token.trim().to_string()),
        _ => {
            tracing::debug!("[Auth] Ignoring malformed Authorization header");
            None
        }
    }
}

impl<S> axum::extract::FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(BearerToken(bearer_token(&parts.headers)))
    }
}
