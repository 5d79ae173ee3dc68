//! Shared-token authentication for gate routes.

use std::fmt;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use subtle::ConstantTimeEq;
use tracing::warn;

use super::service::ErrorResponse;
use crate::error::{GateError, Result};

const BEARER_PREFIX: &str = "Bearer ";

/// The token callers must present in the `Authorization` header.
#[derive(Clone)]
pub struct AuthToken(Arc<str>);

impl AuthToken {
    /// Wrap a configured token. Blank tokens are rejected.
    pub fn new(token: impl AsRef<str>) -> Result<Self> {
        let token = token.as_ref().trim();
        if token.is_empty() {
            return Err(GateError::Config("auth token must not be empty".to_string()));
        }
        Ok(Self(Arc::from(token)))
    }

    /// Check an `Authorization` header value, raw or with a `Bearer ` prefix.
    pub fn verify(&self, header: Option<&str>) -> bool {
        let Some(value) = header else {
            return false;
        };
        let presented = value.strip_prefix(BEARER_PREFIX).unwrap_or(value).trim();
        presented.as_bytes().ct_eq(self.0.as_bytes()).into()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

/// Reject requests whose `Authorization` header does not carry the token.
pub async fn require_token(
    State(token): State<AuthToken>,
    request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if !token.verify(header) {
        warn!(
            path = %request.uri().path(),
            has_header = header.is_some(),
            "Rejected unauthenticated request"
        );
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Unauthorized".to_string(),
            }),
        )
            .into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_token_rejected() {
        assert!(AuthToken::new("").is_err());
        assert!(AuthToken::new("  ").is_err());
    }

    #[test]
    fn test_verify_raw_and_bearer() {
        let token = AuthToken::new("s3cret").unwrap();
        assert!(token.verify(Some("s3cret")));
        assert!(token.verify(Some("Bearer s3cret")));
    }

    #[test]
    fn test_verify_rejects_mismatch() {
        let token = AuthToken::new("s3cret").unwrap();
        assert!(!token.verify(None));
        assert!(!token.verify(Some("")));
        assert!(!token.verify(Some("s3cre")));
        assert!(!token.verify(Some("Bearer wrong")));
        assert!(!token.verify(Some("s3cret-and-more")));
    }

    #[test]
    fn test_debug_redacts() {
        let token = AuthToken::new("s3cret").unwrap();
        assert!(!format!("{:?}", token).contains("s3cret"));
    }
}
