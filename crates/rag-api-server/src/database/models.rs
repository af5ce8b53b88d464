//! Postgres row shapes for the `users`, `content`, `questions` and
//! `suggested_questions` collections (spec §6 "Persisted state layout").
//! `upload_history`, `tags` and `metadata` are stored as JSONB so the
//! relational schema doesn't force a rigid shape onto those fields (see
//! DESIGN.md Open Question 4).

use chrono::{DateTime, Utc};
use edtech_core::model::{
    Document, DocumentMetadata, DocumentStatus, FileType, QuestionLogEntry, QuestionType, Role,
    UploadRecord, User,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub credential_hash: String,
    pub created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            role: if row.role == "teacher" { Role::Teacher } else { Role::Student },
            credential_hash: row.credential_hash,
            display_name: row.full_name,
            email: row.email,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ContentRow {
    pub id: Uuid,
    pub filename: String,
    pub file_type: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub content_hash: String,
    pub original_uploader_id: Uuid,
    pub upload_history: serde_json::Value,
    pub status: String,
    pub total_chunks: i64,
    pub processed_chunks: i64,
    pub processed_chunk_indices: serde_json::Value,
    pub tags: serde_json::Value,
    pub metadata: serde_json::Value,
}

impl ContentRow {
    pub fn into_document(self) -> Document {
        let upload_history: Vec<UploadRecord> =
            serde_json::from_value(self.upload_history).unwrap_or_default();
        let tags: Vec<String> = serde_json::from_value(self.tags).unwrap_or_default();
        let metadata: DocumentMetadata = serde_json::from_value(self.metadata).unwrap_or_default();
        let processed_chunk_indices: Vec<i64> =
            serde_json::from_value(self.processed_chunk_indices).unwrap_or_default();
        Document {
            id: self.id,
            filename: self.filename,
            file_type: FileType::from_extension(&self.file_type).unwrap_or(FileType::Txt),
            owner_id: self.owner_id,
            created_at: self.created_at,
            content_hash: self.content_hash,
            original_uploader_id: self.original_uploader_id,
            upload_history,
            status: status_from_str(&self.status),
            total_chunks: self.total_chunks,
            processed_chunks: self.processed_chunks,
            processed_chunk_indices,
            tags,
            metadata,
        }
    }
}

pub fn status_from_str(s: &str) -> DocumentStatus {
    match s {
        "completed" => DocumentStatus::Completed,
        "failed" => DocumentStatus::Failed,
        _ => DocumentStatus::Processing,
    }
}

pub fn status_to_str(s: DocumentStatus) -> &'static str {
    match s {
        DocumentStatus::Processing => "processing",
        DocumentStatus::Completed => "completed",
        DocumentStatus::Failed => "failed",
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct QuestionRow {
    pub question_id: Uuid,
    pub document_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub asker_id: Uuid,
    pub question: String,
    pub answer: String,
    pub duration_ms: i64,
    pub tokens_used: Option<i32>,
    pub cached: bool,
    pub question_type: String,
    pub classification_confidence: f32,
    pub is_global: bool,
    pub searched_document_ids: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<QuestionRow> for QuestionLogEntry {
    fn from(row: QuestionRow) -> Self {
        let searched_document_ids: Vec<Uuid> =
            serde_json::from_value(row.searched_document_ids).unwrap_or_default();
        QuestionLogEntry {
            question_id: row.question_id,
            document_id: row.document_id,
            session_id: row.session_id,
            asker_id: row.asker_id,
            question: row.question,
            answer: row.answer,
            duration_ms: row.duration_ms.max(0) as u64,
            tokens_used: row.tokens_used.map(|t| t.max(0) as u32),
            cached: row.cached,
            question_type: question_type_from_str(&row.question_type),
            classification_confidence: row.classification_confidence,
            is_global: row.is_global,
            searched_document_ids,
            created_at: row.created_at,
        }
    }
}

pub fn question_type_from_str(s: &str) -> QuestionType {
    match s {
        "definition" => QuestionType::Definition,
        "explanation" => QuestionType::Explanation,
        "comparison" => QuestionType::Comparison,
        "procedure" => QuestionType::Procedure,
        "application" => QuestionType::Application,
        "evaluation" => QuestionType::Evaluation,
        _ => QuestionType::General,
    }
}

pub fn question_type_to_str(t: QuestionType) -> &'static str {
    match t {
        QuestionType::Definition => "definition",
        QuestionType::Explanation => "explanation",
        QuestionType::Comparison => "comparison",
        QuestionType::Procedure => "procedure",
        QuestionType::Application => "application",
        QuestionType::Evaluation => "evaluation",
        QuestionType::General => "general",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SuggestedQuestionRow {
    pub document_id: Uuid,
    pub question: String,
    pub category: String,
    pub difficulty: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeletionStats {
    pub vector_namespace_removed: bool,
    pub cache_entries_removed: u64,
    pub file_removed: bool,
    pub questions_removed: u64,
    pub document_removed: bool,
    pub errors: Vec<String>,
}
