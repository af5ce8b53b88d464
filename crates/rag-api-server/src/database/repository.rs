//! Postgres-backed metadata store. Generalizes the teacher's
//! `database/repository.rs` (thin `Arc<Repository>` wrapper over `sqlx`
//! queries, `tracing::debug!` on the hot path) from a pgvector-search
//! repository into the `users` / `content` / `questions` /
//! `suggested_questions` collections of spec §6.

use chrono::Utc;
use edtech_core::error::{ApiError, ApiResult};
use edtech_core::model::{
    Document, DocumentMetadata, DocumentStatus, QuestionLogEntry, Role, UploadRecord, User,
};
use serde_json::json;
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use super::models::{
    question_type_to_str, status_to_str, ContentRow, DeletionStats, SuggestedQuestionRow, UserRow,
};
use super::DbPool;

pub struct Repository {
    pool: DbPool,
}

fn db_err(e: sqlx::Error) -> ApiError {
    ApiError::Internal(format!("database error: {e}"))
}

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> ApiResult<()> {
        sqlx::migrate!("./migrations")
            .run(self.pool.get_pool())
            .await
            .map_err(|e| ApiError::Internal(format!("migration failed: {e}")))
    }

    // ---------------------------------------------------------------- users

    pub async fn create_user(
        &self,
        email: &str,
        full_name: &str,
        role: Role,
        credential_hash: &str,
    ) -> ApiResult<User> {
        let role_str = if role == Role::Teacher { "teacher" } else { "student" };
        let row = sqlx::query_as::<_, UserRow>(
            r#"INSERT INTO users (id, email, full_name, role, credential_hash, created_at)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING id, email, full_name, role, credential_hash, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(full_name)
        .bind(role_str)
        .bind(credential_hash)
        .bind(Utc::now())
        .fetch_one(self.pool.get_pool())
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return ApiError::Validation("email already registered".to_string());
                }
            }
            db_err(e)
        })?;
        Ok(row.into())
    }

    pub async fn get_user_by_email(&self, email: &str) -> ApiResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, full_name, role, credential_hash, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(self.pool.get_pool())
        .await
        .map_err(db_err)?;
        Ok(row.map(Into::into))
    }

    pub async fn get_user_by_id(&self, id: Uuid) -> ApiResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, full_name, role, credential_hash, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool.get_pool())
        .await
        .map_err(db_err)?;
        Ok(row.map(Into::into))
    }

    pub async fn is_teacher(&self, user_id: Uuid) -> ApiResult<bool> {
        let role: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(self.pool.get_pool())
            .await
            .map_err(db_err)?;
        Ok(role.as_deref() == Some("teacher"))
    }

    // ------------------------------------------------------------- content

    pub async fn find_document_by_hash(&self, content_hash: &str) -> ApiResult<Option<Document>> {
        let row = sqlx::query_as::<_, ContentRow>(
            "SELECT id, filename, file_type, owner_id, created_at, content_hash, \
             original_uploader_id, '[]'::jsonb AS upload_history, status, total_chunks, \
             processed_chunks, processed_chunk_indices, tags, metadata FROM content \
             WHERE content_hash = $1",
        )
        .bind(content_hash)
        .fetch_optional(self.pool.get_pool())
        .await
        .map_err(db_err)?;
        let Some(row) = row else { return Ok(None) };
        let doc_id = row.id;
        let mut document = row.into_document();
        document.upload_history = self.fetch_upload_history(doc_id).await?;
        Ok(Some(document))
    }

    pub async fn get_document(&self, id: Uuid) -> ApiResult<Option<Document>> {
        let row = sqlx::query_as::<_, ContentRow>(
            "SELECT id, filename, file_type, owner_id, created_at, content_hash, \
             original_uploader_id, '[]'::jsonb AS upload_history, status, total_chunks, \
             processed_chunks, processed_chunk_indices, tags, metadata FROM content WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool.get_pool())
        .await
        .map_err(db_err)?;
        let Some(row) = row else { return Ok(None) };
        let mut document = row.into_document();
        document.upload_history = self.fetch_upload_history(id).await?;
        Ok(Some(document))
    }

    async fn fetch_upload_history(&self, document_id: Uuid) -> ApiResult<Vec<UploadRecord>> {
        let rows = sqlx::query(
            "SELECT user_id, user_name, timestamp, filename, content_hash FROM upload_history \
             WHERE document_id = $1 ORDER BY timestamp ASC",
        )
        .bind(document_id)
        .fetch_all(self.pool.get_pool())
        .await
        .map_err(db_err)?;
        Ok(rows
            .into_iter()
            .map(|r| UploadRecord {
                user_id: r.get("user_id"),
                user_name: r.get("user_name"),
                timestamp: r.get("timestamp"),
                filename: r.get("filename"),
                content_hash: r.get("content_hash"),
            })
            .collect())
    }

    /// Atomic dedup + history-append primitive (spec §4.7 step 4): a
    /// `content_hash` unique index makes the insert a no-op on conflict,
    /// and the history row is always appended inside the same
    /// transaction, so two concurrent uploads of identical content
    /// serialize into "one chunker run, one history append".
    pub async fn insert_new_document(
        &self,
        document: &Document,
        initial_upload: &UploadRecord,
    ) -> ApiResult<bool> {
        let mut tx = self.pool.get_pool().begin().await.map_err(db_err)?;
        let inserted = sqlx::query(
            r#"INSERT INTO content
               (id, filename, file_type, owner_id, created_at, content_hash,
                original_uploader_id, status, total_chunks, processed_chunks,
                processed_chunk_indices, tags, metadata)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
               ON CONFLICT (content_hash) DO NOTHING"#,
        )
        .bind(document.id)
        .bind(&document.filename)
        .bind(format!("{:?}", document.file_type).to_lowercase())
        .bind(document.owner_id)
        .bind(document.created_at)
        .bind(&document.content_hash)
        .bind(document.original_uploader_id)
        .bind(status_to_str(document.status))
        .bind(document.total_chunks)
        .bind(document.processed_chunks)
        .bind(json!(document.processed_chunk_indices))
        .bind(json!(document.tags))
        .bind(json!(document.metadata))
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let is_new = inserted.rows_affected() == 1;
        let target_id: Uuid = if is_new {
            document.id
        } else {
            sqlx::query_scalar("SELECT id FROM content WHERE content_hash = $1 FOR UPDATE")
                .bind(&document.content_hash)
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err)?
        };

        sqlx::query(
            "INSERT INTO upload_history (document_id, user_id, user_name, timestamp, filename, content_hash) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(target_id)
        .bind(initial_upload.user_id)
        .bind(&initial_upload.user_name)
        .bind(initial_upload.timestamp)
        .bind(&initial_upload.filename)
        .bind(&initial_upload.content_hash)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        debug!(document_id = %target_id, is_new, "upsert_document_with_history");
        Ok(is_new)
    }

    pub async fn list_documents_for_teacher(&self, owner_id: Uuid) -> ApiResult<Vec<Document>> {
        let rows = sqlx::query_as::<_, ContentRow>(
            "SELECT id, filename, file_type, owner_id, created_at, content_hash, \
             original_uploader_id, '[]'::jsonb AS upload_history, status, total_chunks, \
             processed_chunks, processed_chunk_indices, tags, metadata FROM content \
             WHERE status = 'completed' OR owner_id = $1",
        )
        .bind(owner_id)
        .fetch_all(self.pool.get_pool())
        .await
        .map_err(db_err)?;
        self.hydrate_histories(rows).await
    }

    pub async fn list_documents_for_student(&self, student_id: Uuid) -> ApiResult<Vec<Document>> {
        let rows = sqlx::query_as::<_, ContentRow>(
            r#"SELECT c.id, c.filename, c.file_type, c.owner_id, c.created_at, c.content_hash,
                      c.original_uploader_id, '[]'::jsonb AS upload_history, c.status,
                      c.total_chunks, c.processed_chunks, c.processed_chunk_indices, c.tags,
                      c.metadata
               FROM content c
               LEFT JOIN users owner ON owner.id = c.owner_id
               WHERE (c.status = 'completed' AND owner.role = 'teacher')
                  OR EXISTS (SELECT 1 FROM upload_history h WHERE h.document_id = c.id AND h.user_id = $1)"#,
        )
        .bind(student_id)
        .fetch_all(self.pool.get_pool())
        .await
        .map_err(db_err)?;
        self.hydrate_histories(rows).await
    }

    async fn hydrate_histories(&self, rows: Vec<ContentRow>) -> ApiResult<Vec<Document>> {
        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            let mut document = row.into_document();
            document.upload_history = self.fetch_upload_history(id).await?;
            documents.push(document);
        }
        Ok(documents)
    }

    /// `GET /content/user/{id}` listing with `filter`/`search`/pagination.
    pub async fn list_user_documents(
        &self,
        user_id: Uuid,
        role: Role,
        filter: &str,
        search: Option<&str>,
        page: i64,
        limit: i64,
    ) -> ApiResult<(Vec<Document>, i64)> {
        let mut all = match role {
            Role::Teacher => self.list_documents_for_teacher(user_id).await?,
            Role::Student => self.list_documents_for_student(user_id).await?,
        };

        all.retain(|d| match filter {
            "owned" => d.owner_id == user_id,
            "shared" => d.owner_id != user_id,
            _ => true,
        });

        if let Some(needle) = search {
            let needle = needle.to_lowercase();
            all.retain(|d| {
                d.filename.to_lowercase().contains(&needle)
                    || d.metadata.title.as_deref().unwrap_or("").to_lowercase().contains(&needle)
            });
        }

        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = all.len() as i64;
        let start = ((page.max(1) - 1) * limit.max(1)) as usize;
        let page_items = all.into_iter().skip(start).take(limit.max(1) as usize).collect();
        Ok((page_items, total))
    }

    pub async fn update_document_metadata(
        &self,
        document_id: Uuid,
        metadata: &DocumentMetadata,
        tags: &[String],
    ) -> ApiResult<()> {
        sqlx::query("UPDATE content SET metadata = $2, tags = $3 WHERE id = $1")
            .bind(document_id)
            .bind(json!(metadata))
            .bind(json!(tags))
            .execute(self.pool.get_pool())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn delete_document_cascade(&self, document_id: Uuid) -> ApiResult<DeletionStats> {
        let mut stats = DeletionStats::default();
        let mut tx = self.pool.get_pool().begin().await.map_err(db_err)?;

        match sqlx::query("DELETE FROM questions WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
        {
            Ok(r) => stats.questions_removed = r.rows_affected(),
            Err(e) => stats.errors.push(format!("questions: {e}")),
        }

        if let Err(e) = sqlx::query("DELETE FROM suggested_questions WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
        {
            stats.errors.push(format!("suggested_questions: {e}"));
        }

        if let Err(e) = sqlx::query("DELETE FROM upload_history WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
        {
            stats.errors.push(format!("upload_history: {e}"));
        }

        let content_deleted = sqlx::query("DELETE FROM content WHERE id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await;
        match content_deleted {
            Ok(r) => stats.document_removed = r.rows_affected() == 1,
            Err(e) => stats.errors.push(format!("content: {e}")),
        }

        tx.commit().await.map_err(db_err)?;
        Ok(stats)
    }

    pub async fn document_owner_or_in_history(
        &self,
        document_id: Uuid,
        user_id: Uuid,
    ) -> ApiResult<bool> {
        let doc = self.get_document(document_id).await?;
        let Some(doc) = doc else { return Ok(false) };
        Ok(doc.owner_id == user_id || doc.upload_history.iter().any(|h| h.user_id == user_id))
    }

    // ----------------------------------------------------------- questions

    pub async fn insert_question_log(&self, entry: &QuestionLogEntry) -> ApiResult<()> {
        sqlx::query(
            r#"INSERT INTO questions
               (question_id, document_id, session_id, asker_id, question, answer, duration_ms,
                tokens_used, cached, question_type, classification_confidence, is_global,
                searched_document_ids, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"#,
        )
        .bind(entry.question_id)
        .bind(entry.document_id)
        .bind(&entry.session_id)
        .bind(entry.asker_id)
        .bind(&entry.question)
        .bind(&entry.answer)
        .bind(entry.duration_ms as i64)
        .bind(entry.tokens_used.map(|t| t as i32))
        .bind(entry.cached)
        .bind(question_type_to_str(entry.question_type))
        .bind(entry.classification_confidence)
        .bind(entry.is_global)
        .bind(json!(entry.searched_document_ids))
        .bind(entry.created_at)
        .execute(self.pool.get_pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Derives "popularity" from the immutable question log rather than
    /// the TTL-bounded Redis frequency counter, since a document's full
    /// asking history outlives any single counter's 24h window.
    pub async fn popular_questions(
        &self,
        document_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> ApiResult<Vec<(String, i64, bool)>> {
        let rows = sqlx::query(
            r#"SELECT LOWER(question) AS q, COUNT(*) AS frequency,
                      BOOL_OR(cached) AS is_cached
               FROM questions
               WHERE document_id = $1
               GROUP BY LOWER(question)
               ORDER BY frequency DESC
               LIMIT $2 OFFSET $3"#,
        )
        .bind(document_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.get_pool())
        .await
        .map_err(db_err)?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get("q"), r.get("frequency"), r.get("is_cached")))
            .collect())
    }

    // ---------------------------------------------------- suggested qs

    pub async fn insert_suggested_questions(
        &self,
        document_id: Uuid,
        questions: &[edtech_core::suggested_questions::SuggestedQuestion],
    ) -> ApiResult<()> {
        for q in questions {
            sqlx::query(
                "INSERT INTO suggested_questions (document_id, question, category, difficulty) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(document_id)
            .bind(&q.question)
            .bind(q.category)
            .bind(q.difficulty)
            .execute(self.pool.get_pool())
            .await
            .map_err(db_err)?;
        }
        Ok(())
    }

    pub async fn get_suggested_questions(
        &self,
        document_id: Uuid,
    ) -> ApiResult<Vec<SuggestedQuestionRow>> {
        let rows = sqlx::query_as::<_, SuggestedQuestionRow>(
            "SELECT document_id, question, category, difficulty FROM suggested_questions WHERE document_id = $1",
        )
        .bind(document_id)
        .fetch_all(self.pool.get_pool())
        .await
        .map_err(db_err)?;
        Ok(rows)
    }
}
