//! Generalizes the teacher's `database/repository.rs` (thin `Arc`-free
//! wrapper over `sqlx` queries) onto the atomic per-chunk bookkeeping
//! spec §4.8 requires: a single `UPDATE ... RETURNING` round trip plays
//! the role of the original's `find_one_and_update`.

use edtech_core::error::{ApiError, ApiResult};
use edtech_core::model::Document;
use tracing::debug;
use uuid::Uuid;

use super::models::ContentRow;
use super::DbPool;

pub struct Repository {
    pool: DbPool,
}

fn db_err(e: sqlx::Error) -> ApiError {
    ApiError::Internal(format!("database error: {e}"))
}

const SELECT_COLUMNS: &str = "id, filename, file_type, owner_id, created_at, content_hash, \
     original_uploader_id, status, total_chunks, processed_chunks, processed_chunk_indices, \
     tags, metadata";

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get_document(&self, id: Uuid) -> ApiResult<Option<Document>> {
        let row = sqlx::query_as::<_, ContentRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM content WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.get_pool())
        .await
        .map_err(db_err)?;
        Ok(row.map(ContentRow::into_document))
    }

    /// Atomically appends `chunk_index` to `processed_chunk_indices` and
    /// bumps `processed_chunks` — but only if that index hasn't already
    /// been counted, so a redelivered chunk job is a no-op. Single
    /// `UPDATE ... RETURNING` round trip.
    pub async fn record_chunk_processed(
        &self,
        document_id: Uuid,
        chunk_index: i64,
    ) -> ApiResult<Document> {
        let row = sqlx::query_as::<_, ContentRow>(&format!(
            "UPDATE content SET \
               processed_chunks = CASE WHEN processed_chunk_indices @> to_jsonb($2::bigint) \
                 THEN processed_chunks ELSE processed_chunks + 1 END, \
               processed_chunk_indices = CASE WHEN processed_chunk_indices @> to_jsonb($2::bigint) \
                 THEN processed_chunk_indices ELSE processed_chunk_indices || to_jsonb($2::bigint) END \
             WHERE id = $1 \
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(document_id)
        .bind(chunk_index)
        .fetch_one(self.pool.get_pool())
        .await
        .map_err(db_err)?;
        debug!(%document_id, chunk_index, "recorded chunk progress");
        Ok(row.into_document())
    }

    /// Conditional `status -> completed` transition, gated on `status <>
    /// 'completed'` so it fires exactly once under re-delivery and
    /// worker crashes. Returns whether this call performed the
    /// transition (i.e. whether the final event should be published).
    pub async fn mark_completed_if_done(&self, document_id: Uuid) -> ApiResult<bool> {
        let result = sqlx::query(
            "UPDATE content SET status = 'completed' \
             WHERE id = $1 AND status <> 'completed' AND processed_chunks >= total_chunks",
        )
        .bind(document_id)
        .execute(self.pool.get_pool())
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }
}
