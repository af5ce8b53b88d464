//! Bearer-token extractor wired through [`AppState`]'s [`JwtService`].
//!
//! Grounded in the teacher's `auth/middleware.rs` stub (same file, same
//! intent — "validate once, extract identity") now that `AppState` exists
//! to resolve against, plus `axum`'s `FromRequestParts` idiom used
//! throughout `handlers/` for typed extractors.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use edtech_core::auth::jwt::{Claims, TokenType};
use edtech_core::error::ApiError;
use edtech_core::model::Role;
use uuid::Uuid;

use crate::state::AppState;

/// Authenticated caller identity, extracted from a validated access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Authentication("missing Authorization header".into()))?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Authentication("Authorization header must be a Bearer token".into()))
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = state.jwt.validate_expecting(token, TokenType::Access)?;
        Ok(claims.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};

    fn parts_with_header(value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(v) = value {
            builder = builder.header(AUTHORIZATION, HeaderValue::from_str(v).unwrap());
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        parts
    }

    #[test]
    fn missing_header_is_rejected() {
        let parts = parts_with_header(None);
        assert!(bearer_token(&parts).is_err());
    }

    #[test]
    fn non_bearer_scheme_is_rejected() {
        let parts = parts_with_header(Some("Basic dXNlcjpwYXNz"));
        assert!(bearer_token(&parts).is_err());
    }

    #[test]
    fn bearer_token_is_extracted() {
        let parts = parts_with_header(Some("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&parts).unwrap(), "abc.def.ghi");
    }
}
