//! `content` row shape, shared with `rag-api-server::database::models`
//! (same Postgres table, same JSONB layout for `processed_chunk_indices`
//! and `metadata`).

use chrono::{DateTime, Utc};
use edtech_core::model::{Document, DocumentMetadata, DocumentStatus, FileType, UploadRecord};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct ContentRow {
    pub id: Uuid,
    pub filename: String,
    pub file_type: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub content_hash: String,
    pub original_uploader_id: Uuid,
    pub status: String,
    pub total_chunks: i64,
    pub processed_chunks: i64,
    pub processed_chunk_indices: serde_json::Value,
    pub tags: serde_json::Value,
    pub metadata: serde_json::Value,
}

impl ContentRow {
    pub fn into_document(self) -> Document {
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
            upload_history: Vec::<UploadRecord>::new(),
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
