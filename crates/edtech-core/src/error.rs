use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// The full error taxonomy surfaced at the HTTP boundary.
///
/// Every downstream error (database, bus, vector index, embedder, LLM)
/// is re-wrapped into one of these kinds before it crosses a service
/// boundary; `details` carries the originating component's name.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    FileValidation(String),

    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    InvalidToken(String),

    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    NotFound(String),

    #[error("rate limit exceeded")]
    RateLimit,

    #[error("question matches a blocked pattern")]
    PromptInjection,

    #[error("{service} unreachable: {message}")]
    ExternalService { service: String, message: String },

    #[error("{0}")]
    Queue(String),

    #[error("{0}")]
    Parsing(String),

    #[error("{0}")]
    Chunking(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation",
            ApiError::FileValidation(_) => "file-validation",
            ApiError::Authentication(_) => "authentication",
            ApiError::InvalidToken(_) => "invalid-token",
            ApiError::Authorization(_) => "authorization",
            ApiError::NotFound(_) => "not-found",
            ApiError::RateLimit => "rate-limit",
            ApiError::PromptInjection => "prompt-injection",
            ApiError::ExternalService { .. } => "external-service",
            ApiError::Queue(_) => "queue",
            ApiError::Parsing(_) => "parsing",
            ApiError::Chunking(_) => "chunking",
            ApiError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::FileValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            ApiError::Authorization(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ApiError::PromptInjection => StatusCode::BAD_REQUEST,
            ApiError::ExternalService { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Parsing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Chunking(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Value {
        match self {
            ApiError::ExternalService { service, .. } => Value::String(service.clone()),
            _ => Value::Null,
        }
    }

    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: &'static str,
    message: String,
    status_code: u16,
    details: Value,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Internal(msg) => tracing::error!(error = %msg, "internal error"),
            ApiError::ExternalService { service, message } => {
                tracing::error!(service = %service, error = %message, "external service error")
            }
            ApiError::Authorization(msg) | ApiError::Authentication(msg) => {
                tracing::warn!(error = %msg, "auth rejection")
            }
            _ => tracing::debug!(error = %self, "request rejected"),
        }

        let envelope = ErrorEnvelope {
            error: self.kind(),
            message: self.to_string(),
            status_code: status.as_u16(),
            details: self.details(),
        };

        (status, Json(envelope)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
