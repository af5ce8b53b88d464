//! Pluggable capability interfaces (spec §9 "Pluggable embedder/LLM/
//! vector-index"). Concrete HTTP/AMQP/Redis/Postgres implementations are
//! wired up by each binary crate at startup and injected as `Arc<dyn ...>`
//! handles, exactly as the teacher's `main.rs` constructs and injects
//! `Arc`-wrapped services via `State`/`Extension`. Keeping the core
//! testable against in-memory stubs is the point: nothing in
//! `rag-api-server::services` or `rag-embedding-worker` should depend on a
//! concrete provider type.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::model::ProgressEvent;
use crate::prompt::ChatMessage;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> ApiResult<Vec<f32>>;
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
    ) -> ApiResult<BoxStream<'static, ApiResult<String>>>;

    async fn generate_complete(&self, messages: &[ChatMessage]) -> ApiResult<(String, LlmUsage)>;
}

#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub vector_id: String,
    pub score: f32,
    pub metadata: Value,
}

/// Vector-id scheme shared by the worker's upsert and the api-server's
/// retrieval parse (spec §3: `{document-id}_{chunk-index}`). A UUID
/// contains no `_`, so splitting on it to recover the trailing
/// chunk-index is unambiguous.
pub fn vector_id(document_id: Uuid, chunk_index: i64) -> String {
    format!("{document_id}_{chunk_index}")
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(
        &self,
        namespace: Uuid,
        vector_id: &str,
        embedding: Vec<f32>,
        metadata: Value,
    ) -> ApiResult<()>;

    async fn query(&self, namespace: Uuid, vector: &[f32], top_k: usize) -> ApiResult<Vec<VectorMatch>>;

    async fn delete_namespace(&self, namespace: Uuid) -> ApiResult<()>;
}

/// Message-bus payload per spec §6: one JSON object per chunk.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChunkJob {
    pub document_id: Uuid,
    pub chunk_index: i64,
    pub text: String,
    pub token_count: usize,
    pub metadata: Value,
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish_chunk_job(&self, job: &ChunkJob) -> ApiResult<()>;
}

#[async_trait]
pub trait ProgressPublisher: Send + Sync {
    async fn publish(&self, document_id: Uuid, event: &ProgressEvent) -> ApiResult<()>;
}

#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Increment `frequency(doc, question_key)`, attaching a 24h TTL on
    /// the first increment. Returns the updated count.
    async fn bump_frequency(&self, doc: Uuid, question_key: &str) -> ApiResult<u64>;

    async fn get_cached(&self, doc: Uuid, question_key: &str) -> ApiResult<Option<String>>;

    async fn set_cached(
        &self,
        doc: Uuid,
        question_key: &str,
        answer: &str,
        ttl_seconds: u64,
    ) -> ApiResult<()>;

    /// Removes every cache/frequency key prefixed by `doc` (spec §4.7
    /// deletion cascade: "remove cache/frequency entries whose key begins
    /// with the document-id"). Returns the number of keys removed.
    async fn delete_document_keys(&self, doc: Uuid) -> ApiResult<u64>;
}

/// LLM-observability side channel (spec §9): best-effort, never blocks the
/// user-facing path. Callers MUST wrap every invocation in
/// [`safe_trace`] rather than calling `trace` directly.
pub trait TraceSink: Send + Sync {
    fn trace(&self, name: &str, metadata: Value);
}

/// No-op sink that only logs via `tracing`; the non-blocking default.
pub struct LoggingTraceSink;

impl TraceSink for LoggingTraceSink {
    fn trace(&self, name: &str, metadata: Value) {
        tracing::debug!(trace_name = name, %metadata, "trace event");
    }
}

/// Invoke `sink.trace(..)` behind a panic-safe guard: a panicking or
/// misbehaving trace sink must never take down the request path.
pub fn safe_trace(sink: &dyn TraceSink, name: &str, metadata: Value) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        sink.trace(name, metadata);
    }));
    if result.is_err() {
        tracing::warn!(trace_name = name, "trace sink panicked, ignoring");
    }
}
