use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use chrono::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::info;

use edtech_core::auth::jwt::JwtService;
use rag_api_server::bus::AmqpBus;
use rag_api_server::cache::{RedisCache, RedisProgressPublisher};
use rag_api_server::config::{self, Settings};
use rag_api_server::database::{DbPool, Repository};
use rag_api_server::embedding_client::HttpEmbedder;
use rag_api_server::handlers;
use rag_api_server::llm_client::HttpLlmClient;
use rag_api_server::security::{DocumentAuthorization, RateLimiter};
use rag_api_server::services::{IngestionService, RetrievalService};
use rag_api_server::state::AppState;
use rag_api_server::vector_index::PineconeIndex;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,rag_api_server=debug".to_string()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .init();

    info!("starting rag-api-server");

    let settings = Settings::load()?;
    info!("configuration loaded");

    let db_pool = DbPool::new(&settings.database).await?;
    let repository = Arc::new(Repository::new(db_pool));
    repository.run_migrations().await?;
    info!("database ready");

    let jwt = Arc::new(JwtService::new(
        &settings.jwt.secret,
        Duration::minutes(settings.jwt.access_expiry_minutes),
        Duration::days(settings.jwt.refresh_expiry_days),
    ));

    let document_auth = Arc::new(DocumentAuthorization::new(repository.clone()));

    let redis_cache = RedisCache::connect(&settings.cache)?;
    let redis_pool = redis_cache.pool();
    let cache: Arc<dyn edtech_core::traits::ResponseCache> = Arc::new(redis_cache);
    let progress: Arc<dyn edtech_core::traits::ProgressPublisher> =
        Arc::new(RedisProgressPublisher::new(redis_pool.clone()));
    let rate_limiter = Arc::new(RateLimiter::new(redis_pool, settings.rate_limit.clone()));

    let bus: Arc<dyn edtech_core::traits::MessageBus> =
        Arc::new(AmqpBus::connect(settings.bus.clone()).await?);
    info!("message bus connected");

    let vector_index: Arc<dyn edtech_core::traits::VectorIndex> =
        Arc::new(PineconeIndex::new(settings.vector_index.clone()));
    let embedder: Arc<dyn edtech_core::traits::Embedder> =
        Arc::new(HttpEmbedder::new(settings.embedding.clone()));
    let llm: Arc<dyn edtech_core::traits::LlmProvider> =
        Arc::new(HttpLlmClient::new(settings.llm.clone()));

    let ingestion = Arc::new(IngestionService::new(
        repository.clone(),
        bus.clone(),
        llm.clone(),
        vector_index.clone(),
        cache.clone(),
        progress.clone(),
        settings.rag.clone(),
        settings.max_file_size_bytes(),
    ));

    let retrieval = Arc::new(RetrievalService::new(
        repository.clone(),
        embedder.clone(),
        llm.clone(),
        vector_index.clone(),
        cache.clone(),
        settings.rag.clone(),
        settings.cache.frequency_threshold,
        settings.cache.cache_ttl_seconds,
    ));

    let cors = build_cors(&settings.cors);
    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));
    let body_limit = settings.max_file_size_bytes() as usize;

    let state = AppState {
        settings,
        repository,
        jwt,
        document_auth,
        rate_limiter,
        bus,
        cache,
        progress,
        vector_index,
        embedder,
        llm,
        ingestion,
        retrieval,
    };

    let app = build_router(state, cors, body_limit);

    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

fn build_cors(config: &config::CorsConfig) -> CorsLayer {
    if config.allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<_> = config
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

fn build_router(state: AppState, cors: CorsLayer, body_limit: usize) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh));

    let protected_routes = Router::new()
        .route("/content/upload", post(handlers::content::upload))
        .route("/content/{id}", delete(handlers::content::delete))
        .route("/content/user/{id}", get(handlers::content::list_user_documents))
        .route("/query/global/complete", post(handlers::query::query_global))
        .route("/query/{doc_id}", post(handlers::query::query_stream))
        .route("/query/{doc_id}/complete", post(handlers::query::query_complete))
        .route("/query/{doc_id}/popular", get(handlers::query::popular_questions))
        .route("/ws/document/{id}/status", get(handlers::ws::document_status));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default().include_headers(true)))
        .layer(DefaultBodyLimit::max(body_limit))
}
