//! `/query/{doc_id}`, `/query/{doc_id}/complete`, `/query/global/complete`,
//! `/query/{doc_id}/popular` (spec §6). Generalizes the teacher's
//! `handlers/search.rs` response shape onto `RetrievalService`.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use edtech_core::error::ApiResult;
use edtech_core::model::SourceAttribution;
use edtech_core::prompt::stream_error_tail;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GlobalAskRequest {
    pub question: String,
    #[serde(default)]
    pub selected_doc_ids: Vec<Uuid>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub sources: Vec<SourceAttribution>,
    pub cached: bool,
    pub not_yet_completed: Vec<Uuid>,
}

/// `POST /query/{doc_id}` — streamed plain-text answer.
pub async fn query_stream(
    State(state): State<AppState>,
    user: AuthUser,
    Path(document_id): Path<Uuid>,
    Json(req): Json<AskRequest>,
) -> ApiResult<Response> {
    state.rate_limiter.check_user(user.user_id).await?;
    state.rate_limiter.check_global().await?;

    let document = state
        .document_auth
        .load_authorized(user.user_id, user.role, document_id)
        .await?;

    let stream = state
        .retrieval
        .query_stream(&document, &req.question, user.user_id, req.session_id)
        .await?;

    let body_stream = stream.map(|chunk| match chunk {
        Ok(text) => Ok::<_, std::io::Error>(text.into_bytes()),
        Err(_) => Ok(stream_error_tail().as_bytes().to_vec()),
    });

    Ok(Response::builder()
        .header("content-type", "text/plain; charset=utf-8")
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|_| Response::new(Body::empty())))
}

/// `POST /query/{doc_id}/complete` — full answer with source attribution.
pub async fn query_complete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(document_id): Path<Uuid>,
    Json(req): Json<AskRequest>,
) -> ApiResult<Json<AnswerResponse>> {
    state.rate_limiter.check_user(user.user_id).await?;
    state.rate_limiter.check_global().await?;

    let document = state
        .document_auth
        .load_authorized(user.user_id, user.role, document_id)
        .await?;

    let answer = state
        .retrieval
        .query_complete(&document, &req.question, user.user_id, req.session_id)
        .await?;

    Ok(Json(AnswerResponse {
        answer: answer.answer,
        sources: answer.sources,
        cached: answer.cached,
        not_yet_completed: answer.not_yet_completed,
    }))
}

/// `POST /query/global/complete`.
pub async fn query_global(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<GlobalAskRequest>,
) -> ApiResult<Json<AnswerResponse>> {
    state.rate_limiter.check_user(user.user_id).await?;
    state.rate_limiter.check_global().await?;

    let answer = state
        .retrieval
        .query_global(user.user_id, user.role, &req.question, req.selected_doc_ids, req.session_id)
        .await?;

    Ok(Json(AnswerResponse {
        answer: answer.answer,
        sources: answer.sources,
        cached: answer.cached,
        not_yet_completed: answer.not_yet_completed,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PopularQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    10
}

#[derive(Debug, Serialize)]
pub struct PopularQuestion {
    pub question: String,
    pub frequency: i64,
    pub is_cached: bool,
}

/// `GET /query/{doc_id}/popular`.
pub async fn popular_questions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(document_id): Path<Uuid>,
    Query(query): Query<PopularQuery>,
) -> ApiResult<Json<Vec<PopularQuestion>>> {
    // Require the same access as asking a question of this document.
    state
        .document_auth
        .load_authorized(user.user_id, user.role, document_id)
        .await?;

    let rows = state
        .repository
        .popular_questions(document_id, query.limit, query.offset)
        .await?;

    Ok(Json(
        rows.into_iter()
            .map(|(question, frequency, is_cached)| PopularQuestion {
                question,
                frequency,
                is_cached,
            })
            .collect(),
    ))
}
