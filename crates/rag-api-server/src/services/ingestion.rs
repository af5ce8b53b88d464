//! Upload/delete coordinator (spec §4.7).
//!
//! Generalizes the teacher's `document_service.rs::process_upload`
//! (detect → parse → chunk → embed → persist, `report_progress` phase
//! structure) into the dedup-first pipeline this spec requires: the
//! embedding step itself is no longer inline here — it moves to the
//! async worker, this coordinator only parses, chunks, persists metadata,
//! and publishes one bus message per chunk.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use edtech_core::access;
use edtech_core::chunk::{chunk_document, ChunkOptions};
use edtech_core::error::{ApiError, ApiResult};
use edtech_core::hash::content_hash;
use edtech_core::model::{
    Document, DocumentMetadata, DocumentStatus, FileType, ProgressEvent, ProgressStatus, Role,
    UploadRecord,
};
use edtech_core::parser;
use edtech_core::prompt::{ChatMessage, MessageRole};
use edtech_core::suggested_questions::{fallback_for_subject, SuggestedQuestion};
use edtech_core::traits::{ChunkJob, LlmProvider, MessageBus, ProgressPublisher};

use crate::config::RagConfig;
use crate::database::models::DeletionStats;
use crate::database::Repository;

pub struct UploadOutcome {
    pub document_id: Uuid,
    pub total_chunks: i64,
    pub status: DocumentStatus,
    pub is_duplicate: bool,
    pub duplicate_of: Option<Uuid>,
}

pub struct IngestionService {
    repository: Arc<Repository>,
    bus: Arc<dyn MessageBus>,
    llm: Arc<dyn LlmProvider>,
    vector_index: Arc<dyn edtech_core::traits::VectorIndex>,
    cache: Arc<dyn edtech_core::traits::ResponseCache>,
    progress: Arc<dyn ProgressPublisher>,
    config: RagConfig,
    max_file_size_bytes: u64,
}

impl IngestionService {
    pub fn new(
        repository: Arc<Repository>,
        bus: Arc<dyn MessageBus>,
        llm: Arc<dyn LlmProvider>,
        vector_index: Arc<dyn edtech_core::traits::VectorIndex>,
        cache: Arc<dyn edtech_core::traits::ResponseCache>,
        progress: Arc<dyn ProgressPublisher>,
        config: RagConfig,
        max_file_size_bytes: u64,
    ) -> Self {
        Self {
            repository,
            bus,
            llm,
            vector_index,
            cache,
            progress,
            config,
            max_file_size_bytes,
        }
    }

    /// Spec §4.7 steps 1-7. Step 8 (suggested questions) is kicked off as
    /// a detached task by the caller via [`Self::generate_suggested_questions`]
    /// so a slow LLM call never blocks the upload response.
    pub async fn upload(
        &self,
        owner_id: Uuid,
        filename: String,
        file_type: FileType,
        bytes: Vec<u8>,
        metadata: DocumentMetadata,
    ) -> ApiResult<UploadOutcome> {
        if bytes.len() as u64 > self.max_file_size_bytes {
            return Err(ApiError::FileValidation(format!(
                "file exceeds the {}-byte limit",
                self.max_file_size_bytes
            )));
        }

        let parsed = parser::parse(&bytes, file_type)?;
        let content_hash = content_hash(&parsed.content);

        let upload_record = UploadRecord {
            user_id: owner_id,
            user_name: metadata.uploader_name.clone().unwrap_or_default(),
            timestamp: chrono::Utc::now(),
            filename: filename.clone(),
            content_hash: content_hash.clone(),
        };

        // Step 4: dedup by hash, atomically, via the repository's
        // insert-with-history-append primitive.
        let mut document = Document {
            id: Uuid::new_v4(),
            filename,
            file_type,
            owner_id,
            created_at: upload_record.timestamp,
            content_hash: content_hash.clone(),
            original_uploader_id: owner_id,
            upload_history: Vec::new(),
            status: DocumentStatus::Processing,
            total_chunks: 0,
            processed_chunks: 0,
            processed_chunk_indices: Vec::new(),
            tags: metadata_tags(&metadata),
            metadata: with_page_count(metadata, parsed.metadata.page_count),
        };

        let opts = ChunkOptions {
            max_tokens: self.config.chunk_max_tokens,
            chunk_overlap: self.config.chunk_overlap,
            merge_peers: self.config.merge_peers,
        };
        let chunks = chunk_document(
            &parsed.content,
            &parsed.structure,
            opts,
            document.id,
            document.metadata.clone(),
        );
        document.total_chunks = chunks.len() as i64;
        // Empty document → zero chunks → completed immediately (spec §4.6
        // edge case).
        if chunks.is_empty() {
            document.status = DocumentStatus::Completed;
        }

        let is_new = self.repository.insert_new_document(&document, &upload_record).await?;

        if !is_new {
            let existing = self
                .repository
                .find_document_by_hash(&content_hash)
                .await?
                .ok_or_else(|| ApiError::Internal("document vanished after dedup insert".into()))?;
            return Ok(UploadOutcome {
                document_id: existing.id,
                total_chunks: existing.total_chunks,
                status: existing.status,
                is_duplicate: true,
                duplicate_of: Some(existing.id),
            });
        }

        // Step 7: announce the document on its pub/sub channel before
        // chunk jobs start landing, so a WS subscriber connecting right
        // after upload sees something before the worker's first `%5`
        // event.
        if document.status == DocumentStatus::Completed {
            if let Err(e) = self
                .progress
                .publish(
                    document.id,
                    &ProgressEvent {
                        status: ProgressStatus::Completed,
                        progress: 100,
                        processed_chunks: 0,
                        total_chunks: 0,
                        message: "empty document, nothing to embed".to_string(),
                    },
                )
                .await
            {
                warn!(document_id = %document.id, error = %e, "failed to publish completion event");
            }
        } else if let Err(e) = self
            .progress
            .publish(
                document.id,
                &ProgressEvent {
                    status: ProgressStatus::Processing,
                    progress: 0,
                    processed_chunks: 0,
                    total_chunks: document.total_chunks,
                    message: "document accepted, queuing chunks for embedding".to_string(),
                },
            )
            .await
        {
            warn!(document_id = %document.id, error = %e, "failed to publish processing event");
        }

        // Step 6: publish one message per chunk.
        for chunk in &chunks {
            let job = ChunkJob {
                document_id: chunk.document_id,
                chunk_index: chunk.chunk_index,
                text: chunk.contextualized_text.clone(),
                token_count: chunk.token_count,
                metadata: serde_json::json!({
                    "section_title": chunk.section_title,
                    "title": chunk.metadata.title,
                    "subject": chunk.metadata.subject,
                    "uploader_name": chunk.metadata.uploader_name,
                    "text": chunk.text,
                }),
            };
            if let Err(e) = self.bus.publish_chunk_job(&job).await {
                warn!(document_id = %document.id, chunk_index = chunk.chunk_index, error = %e, "failed to publish chunk job");
                return Err(e);
            }
        }

        info!(document_id = %document.id, total_chunks = document.total_chunks, "ingestion accepted upload");

        Ok(UploadOutcome {
            document_id: document.id,
            total_chunks: document.total_chunks,
            status: document.status,
            is_duplicate: false,
            duplicate_of: None,
        })
    }

    /// Spec §4.7 step 8: up to 5 LLM-generated study questions, falling
    /// back to a deterministic subject-keyed template set on failure.
    /// Intended to be spawned via `tokio::spawn` so it never blocks the
    /// upload response.
    pub async fn generate_suggested_questions(&self, document_id: Uuid, subject: Option<String>) {
        let questions = match self.llm_suggested_questions(subject.as_deref()).await {
            Ok(qs) if !qs.is_empty() => qs,
            Ok(_) => fallback_for_subject(subject.as_deref()),
            Err(e) => {
                warn!(document_id = %document_id, error = %e, "suggested-question generation failed, using fallback");
                fallback_for_subject(subject.as_deref())
            }
        };
        if let Err(e) = self.repository.insert_suggested_questions(document_id, &questions).await {
            warn!(document_id = %document_id, error = %e, "failed to persist suggested questions");
        }
    }

    async fn llm_suggested_questions(&self, subject: Option<&str>) -> ApiResult<Vec<SuggestedQuestion>> {
        let prompt = format!(
            "Generate up to 5 short study questions (one per line, no numbering) for a student \
             studying {}. Cover a mix of definition, explanation, comparison, procedure, and \
             application questions.",
            subject.unwrap_or("this subject")
        );
        let messages = [ChatMessage {
            role: MessageRole::User,
            content: prompt,
        }];
        let (text, _usage) = self.llm.generate_complete(&messages).await?;
        Ok(text
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .take(5)
            .map(|l| SuggestedQuestion {
                question: l.trim_start_matches(['-', '*', '•']).trim().to_string(),
                category: "general",
                difficulty: "medium",
            })
            .collect())
    }

    /// Spec §4.7 "Deletion operation": requires owner, teacher role, or
    /// upload-history membership. Best-effort cascade; each sub-step's
    /// failure is collected rather than aborting the whole operation.
    pub async fn delete_document(
        &self,
        caller_id: Uuid,
        caller_role: Role,
        document_id: Uuid,
    ) -> ApiResult<DeletionStats> {
        let document = self
            .repository
            .get_document(document_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("document {document_id} not found")))?;

        let allowed = document.owner_id == caller_id
            || caller_role == Role::Teacher
            || document.upload_history.iter().any(|h| h.user_id == caller_id);
        if !allowed {
            return Err(ApiError::Authorization(
                "only the owner, a teacher, or an uploader may delete this document".into(),
            ));
        }

        let mut stats = self.repository.delete_document_cascade(document_id).await?;

        match self.vector_index.delete_namespace(document_id).await {
            Ok(()) => stats.vector_namespace_removed = true,
            Err(e) => stats.errors.push(format!("vector-index: {e}")),
        }

        match self.cache.delete_document_keys(document_id).await {
            Ok(n) => stats.cache_entries_removed = n,
            Err(e) => stats.errors.push(format!("cache: {e}")),
        }

        Ok(stats)
    }

    pub async fn access_check(
        &self,
        user_id: Uuid,
        role: Role,
        document: &Document,
    ) -> ApiResult<bool> {
        let owner_is_teacher = self.repository.is_teacher(document.owner_id).await?;
        Ok(access::is_accessible(user_id, role, document, &|_| owner_is_teacher))
    }
}

fn metadata_tags(metadata: &DocumentMetadata) -> Vec<String> {
    metadata
        .subject
        .clone()
        .into_iter()
        .collect::<Vec<_>>()
}

fn with_page_count(mut metadata: DocumentMetadata, page_count: Option<u32>) -> DocumentMetadata {
    if metadata.page_count.is_none() {
        metadata.page_count = page_count;
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_tags_from_subject() {
        let metadata = DocumentMetadata {
            subject: Some("Biology".to_string()),
            ..Default::default()
        };
        assert_eq!(metadata_tags(&metadata), vec!["Biology".to_string()]);
    }
}
