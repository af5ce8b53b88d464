//! `/auth/register`, `/auth/login`, `/auth/refresh` (spec §6).
//!
//! Grounded in the teacher's `handlers/chat.rs` request/response Json
//! shape and `services/llm_service.rs`-style error mapping, now backed by
//! `edtech_core::auth::{jwt, password}` rather than a bespoke scheme.

use axum::extract::State;
use axum::Json;
use edtech_core::auth::jwt::TokenType;
use edtech_core::auth::password::{hash_password, verify_password};
use edtech_core::error::{ApiError, ApiResult};
use edtech_core::model::Role;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

fn issue_token_pair(state: &AppState, user: &edtech_core::model::User) -> ApiResult<TokenPair> {
    Ok(TokenPair {
        access_token: state.jwt.issue_access_token(user.id, &user.email, user.role)?,
        refresh_token: state.jwt.issue_refresh_token(user.id, &user.email, user.role)?,
    })
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<TokenPair>> {
    if req.email.trim().is_empty() || !req.email.contains('@') {
        return Err(ApiError::Validation("a valid email is required".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation("password must be at least 8 characters".into()));
    }
    if req.full_name.trim().is_empty() {
        return Err(ApiError::Validation("full name is required".into()));
    }

    let credential_hash = hash_password(&req.password)?;
    let user = state
        .repository
        .create_user(&req.email, &req.full_name, req.role, &credential_hash)
        .await?;
    Ok(Json(issue_token_pair(&state, &user)?))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<TokenPair>> {
    let user = state
        .repository
        .get_user_by_email(&req.email)
        .await?
        .ok_or_else(|| ApiError::Authentication("invalid email or password".into()))?;

    if !verify_password(&req.password, &user.credential_hash)? {
        return Err(ApiError::Authentication("invalid email or password".into()));
    }

    Ok(Json(issue_token_pair(&state, &user)?))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let claims = state.jwt.validate_expecting(&req.refresh_token, TokenType::Refresh)?;
    let user = state
        .repository
        .get_user_by_id(claims.sub)
        .await?
        .ok_or_else(|| ApiError::InvalidToken("user no longer exists".into()))?;
    Ok(Json(issue_token_pair(&state, &user)?))
}
