use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Txt,
    Md,
}

impl FileType {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(FileType::Pdf),
            "txt" => Some(FileType::Txt),
            "md" | "markdown" => Some(FileType::Md),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub user_id: Uuid,
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
    pub filename: String,
    pub content_hash: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub uploader_name: Option<String>,
    pub page_count: Option<u32>,
    pub file_size: Option<u64>,
}

/// Metadata-store record. Mutated only by the ingestion coordinator
/// (history append) and the embedding worker (counters, status).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    pub file_type: FileType,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub content_hash: String,
    pub original_uploader_id: Uuid,
    pub upload_history: Vec<UploadRecord>,
    pub status: DocumentStatus,
    pub total_chunks: i64,
    pub processed_chunks: i64,
    /// chunk-indices already counted toward `processed_chunks`; guards the
    /// atomic increment against double-counting a redelivered chunk job.
    pub processed_chunk_indices: Vec<i64>,
    pub tags: Vec<String>,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn is_complete(&self) -> bool {
        self.status == DocumentStatus::Completed
    }

    /// `0 ≤ processed_chunks ≤ total_chunks` and `status = completed ⇔
    /// processed_chunks = total_chunks`.
    pub fn invariant_holds(&self) -> bool {
        let bounded = self.processed_chunks >= 0 && self.processed_chunks <= self.total_chunks;
        let completion_consistent =
            (self.status == DocumentStatus::Completed) == (self.processed_chunks == self.total_chunks && self.total_chunks >= 0);
        bounded && (self.status != DocumentStatus::Completed || completion_consistent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    Hierarchical,
    TokenWindow,
}

/// Transient; dissolves into a `VectorRecord` once embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: Uuid,
    pub chunk_index: i64,
    pub text: String,
    pub contextualized_text: String,
    pub token_count: usize,
    pub section_title: Option<String>,
    pub strategy: ChunkStrategy,
    pub metadata: DocumentMetadata,
}

impl Chunk {
    pub fn vector_id(&self) -> String {
        format!("{}_{}", self.document_id, self.chunk_index)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub vector_id: String,
    pub namespace: Uuid,
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Definition,
    Explanation,
    Comparison,
    Procedure,
    Application,
    Evaluation,
    General,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionLogEntry {
    pub question_id: Uuid,
    /// `None` denotes the "global" sentinel document scope.
    pub document_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub asker_id: Uuid,
    pub question: String,
    pub answer: String,
    pub duration_ms: u64,
    pub tokens_used: Option<u32>,
    pub cached: bool,
    pub question_type: QuestionType,
    pub classification_confidence: f32,
    pub is_global: bool,
    pub searched_document_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub role: Role,
    /// Argon2 PHC string; self-describing salt, no separate column needed.
    pub credential_hash: String,
    pub display_name: String,
    pub email: String,
}

/// A single retrieved chunk, carried from the vector index through
/// diversification into the composed prompt / sources list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub document_id: Uuid,
    pub chunk_index: i64,
    pub text: String,
    pub score: f32,
    pub document_title: String,
    pub uploader_name: String,
    pub uploader_id: Uuid,
    pub upload_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceAttribution {
    pub source_id: u32,
    pub document_title: String,
    pub uploader_name: String,
    pub uploader_id: Uuid,
    pub upload_date: DateTime<Utc>,
    pub chunk_index: i64,
    pub similarity_score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Processing,
    Vectorizing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    pub progress: u8,
    pub processed_chunks: i64,
    pub total_chunks: i64,
    pub message: String,
}
