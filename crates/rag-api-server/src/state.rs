use std::sync::Arc;

use edtech_core::auth::jwt::JwtService;
use edtech_core::traits::{Embedder, LlmProvider, MessageBus, ProgressPublisher, ResponseCache, VectorIndex};

use crate::config::Settings;
use crate::database::Repository;
use crate::security::{DocumentAuthorization, RateLimiter};
use crate::services::{IngestionService, RetrievalService};

/// Application state shared across handlers. Generalizes the teacher's
/// `AppState` (a flat bag of `Arc<...Service>` handles plus `FromRef`
/// impls for axum extractors) onto the new pluggable-backend
/// architecture: every external dependency is stored behind its
/// `edtech_core::traits` interface so a handler never talks to Postgres,
/// Redis, RabbitMQ, or an HTTP embedder/LLM directly.
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub repository: Arc<Repository>,
    pub jwt: Arc<JwtService>,
    pub document_auth: Arc<DocumentAuthorization>,
    pub rate_limiter: Arc<RateLimiter>,
    pub bus: Arc<dyn MessageBus>,
    pub cache: Arc<dyn ResponseCache>,
    pub progress: Arc<dyn ProgressPublisher>,
    pub vector_index: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn LlmProvider>,
    pub ingestion: Arc<IngestionService>,
    pub retrieval: Arc<RetrievalService>,
}
