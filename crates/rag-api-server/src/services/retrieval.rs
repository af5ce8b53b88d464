//! Query pipelines (spec §4.10/§4.11): per-document streaming query,
//! per-document non-streaming "complete" query, and the cross-document
//! global query.
//!
//! Grounded in `services/rag_service.rs`'s `retrieve`/`retrieve_with_embedding`
//! shape (embed-then-search-then-compose) generalized onto the vector-index
//! trait and the frequency-gated cache / diversification this spec adds,
//! itself grounded in `original_source/services/rag-query/` and
//! `global_query_service.py`.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, BoxStream, StreamExt};
use tracing::warn;
use uuid::Uuid;

use edtech_core::access::filter_selected;
use edtech_core::error::{ApiError, ApiResult};
use edtech_core::hash::question_key;
use edtech_core::model::{
    Document, QuestionLogEntry, Role, SourceAttribution, RetrievedChunk,
};
use edtech_core::prompt::{
    build_global_prompt, build_per_document_prompt, contains_leak_marker, no_content_message,
    no_searchable_content_message, sources_to_attribution,
};
use edtech_core::security::classifier::classify_question;
use edtech_core::security::prompt_injection::{validate_question, ValidationOutcome};
use edtech_core::traits::{Embedder, LlmProvider, ResponseCache, VectorIndex};
use edtech_core::diversify::diversify;

use crate::config::RagConfig;
use crate::database::Repository;

const CACHE_TTL_SECONDS: u64 = 3600;
const CACHE_FREQUENCY_THRESHOLD: u64 = 5;
const CACHE_STREAM_CHUNK_SIZE: usize = 50;

pub struct QueryAnswer {
    pub answer: String,
    pub sources: Vec<SourceAttribution>,
    pub cached: bool,
    pub not_yet_completed: Vec<Uuid>,
}

pub struct RetrievalService {
    repository: Arc<Repository>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LlmProvider>,
    vector_index: Arc<dyn VectorIndex>,
    cache: Arc<dyn ResponseCache>,
    config: RagConfig,
    cache_frequency_threshold: u64,
    cache_ttl_seconds: u64,
}

impl RetrievalService {
    pub fn new(
        repository: Arc<Repository>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LlmProvider>,
        vector_index: Arc<dyn VectorIndex>,
        cache: Arc<dyn ResponseCache>,
        config: RagConfig,
        cache_frequency_threshold: u64,
        cache_ttl_seconds: u64,
    ) -> Self {
        Self {
            repository,
            embedder,
            llm,
            vector_index,
            cache,
            config,
            cache_frequency_threshold: if cache_frequency_threshold == 0 {
                CACHE_FREQUENCY_THRESHOLD
            } else {
                cache_frequency_threshold
            },
            cache_ttl_seconds: if cache_ttl_seconds == 0 {
                CACHE_TTL_SECONDS
            } else {
                cache_ttl_seconds
            },
        }
    }

    fn sanitize(&self, question: &str) -> ApiResult<String> {
        match validate_question(question, self.config.max_question_length) {
            ValidationOutcome::Ok(q) => Ok(q),
            ValidationOutcome::Empty => Err(ApiError::Validation("question must not be empty".into())),
            ValidationOutcome::TooLong => Err(ApiError::Validation(format!(
                "question exceeds {} characters",
                self.config.max_question_length
            ))),
            ValidationOutcome::Injection => Err(ApiError::PromptInjection),
        }
    }

    /// Per-document streaming query (spec §4.10 steps 1-10), returning a
    /// stream of answer fragments. The question-log entry is written once
    /// the stream is fully drained (including the cache-hit and
    /// no-results short-circuit paths).
    pub async fn query_stream(
        &self,
        document: &Document,
        question: &str,
        asker_id: Uuid,
        session_id: Option<String>,
    ) -> ApiResult<BoxStream<'static, ApiResult<String>>> {
        let sanitized = self.sanitize(question)?;
        let qkey = question_key(&sanitized);
        let frequency = self.cache.bump_frequency(document.id, &qkey).await?;

        if frequency >= self.cache_frequency_threshold {
            if let Some(cached) = self.cache.get_cached(document.id, &qkey).await? {
                self.log_question(
                    Some(document.id),
                    asker_id,
                    session_id,
                    &sanitized,
                    &cached,
                    0,
                    None,
                    true,
                    false,
                    Vec::new(),
                )
                .await;
                let chunks: Vec<ApiResult<String>> = cached
                    .as_bytes()
                    .chunks(CACHE_STREAM_CHUNK_SIZE)
                    .map(|b| Ok(String::from_utf8_lossy(b).to_string()))
                    .collect();
                return Ok(Box::pin(stream::iter(chunks)));
            }
        }

        let query_vector = self.embedder.embed(&sanitized).await?;
        let matches = self
            .vector_index
            .query(document.id, &query_vector, self.config.retrieval_top_k)
            .await?;

        if matches.is_empty() {
            let message = no_content_message(!document.is_complete());
            self.log_question(
                Some(document.id),
                asker_id,
                session_id,
                &sanitized,
                &message,
                0,
                None,
                false,
                false,
                Vec::new(),
            )
            .await;
            return Ok(Box::pin(stream::once(async move { Ok(message) })));
        }

        let sources = matches_to_chunks(document, &matches);
        let prompt = build_per_document_prompt(&sources, &sanitized);

        let started = Instant::now();
        let llm_stream = self.llm.generate_stream(&prompt).await?;

        let repository = self.repository.clone();
        let cache = self.cache.clone();
        let document_id = document.id;
        let threshold = self.cache_frequency_threshold;
        let ttl = self.cache_ttl_seconds;
        let sanitized_for_log = sanitized.clone();

        let collected = Arc::new(tokio::sync::Mutex::new(String::new()));
        let collected_for_stream = collected.clone();

        let tagged_stream = llm_stream.then(move |chunk| {
            let collected = collected_for_stream.clone();
            async move {
                if let Ok(text) = &chunk {
                    collected.lock().await.push_str(text);
                }
                chunk
            }
        });

        let searched_document_ids = vec![document_id];
        // Runs once the caller has drained every chunk from `tagged_stream`
        // (`chain` polls its first stream to exhaustion before touching
        // this one). Yields no chunk of its own — `filter_map` below drops
        // its `()` result so callers never see it as an answer fragment.
        let finalize = stream::once(async move {
            let final_answer = collected.lock().await.clone();
            let duration_ms = started.elapsed().as_millis() as u64;
            let safe_to_cache = frequency >= threshold && !contains_leak_marker(&final_answer);
            if safe_to_cache {
                if let Err(e) = cache.set_cached(document_id, &qkey, &final_answer, ttl).await {
                    warn!(document_id = %document_id, error = %e, "failed to admit answer to cache");
                }
            }
            let (question_type, confidence) = classify_question(&sanitized_for_log);
            let entry = QuestionLogEntry {
                question_id: Uuid::new_v4(),
                document_id: Some(document_id),
                session_id,
                asker_id,
                question: sanitized_for_log,
                answer: final_answer,
                duration_ms,
                tokens_used: None,
                cached: false,
                question_type,
                classification_confidence: confidence,
                is_global: false,
                searched_document_ids,
                created_at: chrono::Utc::now(),
            };
            if let Err(e) = repository.insert_question_log(&entry).await {
                warn!(error = %e, "failed to persist question log entry");
            }
        });

        let combined = tagged_stream
            .map(Some)
            .chain(finalize.map(|_| None))
            .filter_map(|item| futures::future::ready(item));

        Ok(Box::pin(combined))
    }

    /// Non-streaming per-document query (`/query/{doc_id}/complete`).
    pub async fn query_complete(
        &self,
        document: &Document,
        question: &str,
        asker_id: Uuid,
        session_id: Option<String>,
    ) -> ApiResult<QueryAnswer> {
        let sanitized = self.sanitize(question)?;
        let qkey = question_key(&sanitized);
        let frequency = self.cache.bump_frequency(document.id, &qkey).await?;

        if frequency >= self.cache_frequency_threshold {
            if let Some(cached) = self.cache.get_cached(document.id, &qkey).await? {
                self.log_question(
                    Some(document.id),
                    asker_id,
                    session_id,
                    &sanitized,
                    &cached,
                    0,
                    None,
                    true,
                    false,
                    Vec::new(),
                )
                .await;
                return Ok(QueryAnswer {
                    answer: cached,
                    sources: Vec::new(),
                    cached: true,
                    not_yet_completed: Vec::new(),
                });
            }
        }

        let query_vector = self.embedder.embed(&sanitized).await?;
        let matches = self
            .vector_index
            .query(document.id, &query_vector, self.config.retrieval_top_k)
            .await?;

        if matches.is_empty() {
            let message = no_content_message(!document.is_complete());
            self.log_question(
                Some(document.id),
                asker_id,
                session_id,
                &sanitized,
                &message,
                0,
                None,
                false,
                false,
                Vec::new(),
            )
            .await;
            return Ok(QueryAnswer {
                answer: message,
                sources: Vec::new(),
                cached: false,
                not_yet_completed: Vec::new(),
            });
        }

        let sources = matches_to_chunks(document, &matches);
        let prompt = build_per_document_prompt(&sources, &sanitized);
        let attribution = sources_to_attribution(&sources);

        let started = Instant::now();
        // Non-streaming endpoint: a generation failure returns the error
        // envelope, unlike `query_stream`'s explanatory tail appended to
        // an already-started stream.
        let (answer, usage) = self.llm.generate_complete(&prompt).await?;
        let duration_ms = started.elapsed().as_millis() as u64;

        let safe_to_cache = frequency >= self.cache_frequency_threshold && !contains_leak_marker(&answer);
        if safe_to_cache {
            if let Err(e) = self.cache.set_cached(document.id, &qkey, &answer, self.cache_ttl_seconds).await {
                warn!(document_id = %document.id, error = %e, "failed to admit answer to cache");
            }
        }

        let (question_type, confidence) = classify_question(&sanitized);
        self.log_question(
            Some(document.id),
            asker_id,
            session_id,
            &sanitized,
            &answer,
            duration_ms,
            Some(usage.total_tokens),
            false,
            false,
            vec![document.id],
        )
        .await;
        let _ = (question_type, confidence);

        Ok(QueryAnswer {
            answer,
            sources: attribution,
            cached: false,
            not_yet_completed: Vec::new(),
        })
    }

    /// Global query (spec §4.10 "Global flow"). `selected_doc_ids`, if
    /// non-empty, narrows the candidate set before the single-selected-
    /// document fast path check.
    pub async fn query_global(
        &self,
        user_id: Uuid,
        role: Role,
        question: &str,
        selected_doc_ids: Vec<Uuid>,
        session_id: Option<String>,
    ) -> ApiResult<QueryAnswer> {
        let sanitized = self.sanitize(question)?;

        let accessible = match role {
            Role::Teacher => self.repository.list_documents_for_teacher(user_id).await?,
            Role::Student => self.repository.list_documents_for_student(user_id).await?,
        };

        let owner_is_teacher_cache: std::collections::HashMap<Uuid, bool> = {
            let mut map = std::collections::HashMap::new();
            for doc in &accessible {
                if !map.contains_key(&doc.owner_id) {
                    map.insert(doc.owner_id, self.repository.is_teacher(doc.owner_id).await?);
                }
            }
            map
        };
        let owner_is_teacher = |owner_id: Uuid| *owner_is_teacher_cache.get(&owner_id).unwrap_or(&false);

        let selection = if selected_doc_ids.is_empty() {
            edtech_core::access::SelectionFilterResult {
                accessible_completed_ids: edtech_core::access::accessible_namespaces(
                    user_id, role, &accessible, owner_is_teacher,
                ),
                not_yet_completed: Vec::new(),
            }
        } else {
            filter_selected(user_id, role, &selected_doc_ids, &accessible, owner_is_teacher)
        };

        // Single-selected-document fast path (spec §4.10): exactly one
        // explicitly-selected id delegates to the per-document flow.
        if selected_doc_ids.len() == 1 {
            if let Some(doc) = accessible.iter().find(|d| d.id == selected_doc_ids[0]) {
                if self.access_allows(user_id, role, doc, owner_is_teacher(doc.owner_id)) {
                    let answer = self
                        .query_complete(doc, &sanitized, user_id, session_id)
                        .await?;
                    return Ok(QueryAnswer {
                        not_yet_completed: selection.not_yet_completed,
                        ..answer
                    });
                }
            }
        }

        let namespaces = selection.accessible_completed_ids.clone();
        if namespaces.is_empty() {
            let message = no_searchable_content_message();
            self.log_question(
                None,
                user_id,
                session_id,
                &sanitized,
                &message,
                0,
                None,
                false,
                true,
                Vec::new(),
            )
            .await;
            return Ok(QueryAnswer {
                answer: message,
                sources: Vec::new(),
                cached: false,
                not_yet_completed: selection.not_yet_completed,
            });
        }

        let query_vector = self.embedder.embed(&sanitized).await?;
        let by_doc: std::collections::HashMap<Uuid, &Document> =
            accessible.iter().map(|d| (d.id, d)).collect();

        let per_namespace_k = self.config.retrieval_top_k.div_ceil(namespaces.len().max(1)) + 1;
        let mut pooled = self
            .gather(&namespaces, &query_vector, per_namespace_k, &by_doc)
            .await;
        pooled.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let mut diverse = diversify(pooled, self.config.max_per_doc, self.config.max_total_sources);

        if diverse.is_empty() {
            // Second pass: query each namespace directly for 2 chunks.
            let fallback_pool = self.gather(&namespaces, &query_vector, 2, &by_doc).await;
            diverse = diversify(fallback_pool, self.config.max_per_doc, self.config.max_total_sources);
        }

        if diverse.is_empty() {
            let message = no_searchable_content_message();
            self.log_question(
                None,
                user_id,
                session_id,
                &sanitized,
                &message,
                0,
                None,
                false,
                true,
                namespaces.clone(),
            )
            .await;
            return Ok(QueryAnswer {
                answer: message,
                sources: Vec::new(),
                cached: false,
                not_yet_completed: selection.not_yet_completed,
            });
        }

        let documents_searched = namespaces.len();
        let prompt = build_global_prompt(&diverse, &sanitized, documents_searched);
        let attribution = sources_to_attribution(&diverse);

        let started = Instant::now();
        let (answer, usage) = self.llm.generate_complete(&prompt).await?;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (question_type, confidence) = classify_question(&sanitized);
        self.log_question(
            None,
            user_id,
            session_id,
            &sanitized,
            &answer,
            duration_ms,
            Some(usage.total_tokens),
            false,
            true,
            namespaces,
        )
        .await;
        let _ = (question_type, confidence);

        Ok(QueryAnswer {
            answer,
            sources: attribution,
            cached: false,
            not_yet_completed: selection.not_yet_completed,
        })
    }

    fn access_allows(&self, user_id: Uuid, role: Role, doc: &Document, owner_is_teacher: bool) -> bool {
        edtech_core::access::is_accessible(user_id, role, doc, &|_| owner_is_teacher)
    }

    async fn gather(
        &self,
        namespaces: &[Uuid],
        query_vector: &[f32],
        top_k: usize,
        by_doc: &std::collections::HashMap<Uuid, &Document>,
    ) -> Vec<RetrievedChunk> {
        let mut pooled = Vec::new();
        for namespace in namespaces {
            let Some(doc) = by_doc.get(namespace).copied() else { continue };
            match self.vector_index.query(*namespace, query_vector, top_k).await {
                Ok(matches) => pooled.extend(matches_to_chunks(doc, &matches)),
                Err(e) => warn!(namespace = %namespace, error = %e, "namespace query failed during global retrieval"),
            }
        }
        pooled
    }

    #[allow(clippy::too_many_arguments)]
    async fn log_question(
        &self,
        document_id: Option<Uuid>,
        asker_id: Uuid,
        session_id: Option<String>,
        question: &str,
        answer: &str,
        duration_ms: u64,
        tokens_used: Option<u32>,
        cached: bool,
        is_global: bool,
        searched_document_ids: Vec<Uuid>,
    ) {
        let (question_type, confidence) = classify_question(question);
        let entry = QuestionLogEntry {
            question_id: Uuid::new_v4(),
            document_id,
            session_id,
            asker_id,
            question: question.to_string(),
            answer: answer.to_string(),
            duration_ms,
            tokens_used,
            cached,
            question_type,
            classification_confidence: confidence,
            is_global,
            searched_document_ids,
            created_at: chrono::Utc::now(),
        };
        if let Err(e) = self.repository.insert_question_log(&entry).await {
            warn!(error = %e, "failed to persist question log entry");
        }
    }
}

fn matches_to_chunks(document: &Document, matches: &[edtech_core::traits::VectorMatch]) -> Vec<RetrievedChunk> {
    matches
        .iter()
        .filter_map(|m| {
            let chunk_index: i64 = m.vector_id.rsplit('_').next()?.parse().ok()?;
            let text = m
                .metadata
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            Some(RetrievedChunk {
                document_id: document.id,
                chunk_index,
                text,
                score: m.score,
                document_title: document.metadata.title.clone().unwrap_or_else(|| document.filename.clone()),
                uploader_name: document.metadata.uploader_name.clone().unwrap_or_default(),
                uploader_id: document.original_uploader_id,
                upload_date: document.created_at,
            })
        })
        .collect()
}
