//! `/content/upload`, `DELETE /content/{id}`, `GET /content/user/{id}`
//! (spec §6). Generalizes the teacher's `handlers/upload.rs` multipart
//! parsing loop onto `IngestionService`.

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use edtech_core::error::{ApiError, ApiResult};
use edtech_core::model::{DocumentMetadata, FileType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::database::models::DeletionStats;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub document_id: Uuid,
    pub total_chunks: i64,
    pub status: String,
    pub is_duplicate: bool,
    pub duplicate_of: Option<Uuid>,
}

pub async fn upload(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    state.rate_limiter.check_user(user.user_id).await?;
    state.rate_limiter.check_global().await?;

    let mut filename: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;
    let mut subject: Option<String> = None;
    let mut title: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or("").to_string().as_str() {
            "file" => {
                filename = field.file_name().map(str::to_string);
                bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::Validation(format!("could not read file field: {e}")))?
                        .to_vec(),
                );
            }
            "subject" => {
                subject = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::Validation(format!("invalid subject field: {e}")))?,
                );
            }
            "title" => {
                title = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::Validation(format!("invalid title field: {e}")))?,
                );
            }
            _ => {}
        }
    }

    let filename = filename.ok_or_else(|| ApiError::FileValidation("file field is required".into()))?;
    let bytes = bytes.ok_or_else(|| ApiError::FileValidation("file field is required".into()))?;
    let extension = filename.rsplit('.').next().unwrap_or("");
    let file_type = FileType::from_extension(extension)
        .ok_or_else(|| ApiError::FileValidation(format!("unsupported file extension: {extension}")))?;

    let metadata = DocumentMetadata {
        title,
        subject: subject.clone(),
        uploader_name: Some(user.email.clone()),
        page_count: None,
        file_size: Some(bytes.len() as u64),
    };

    let outcome = state
        .ingestion
        .upload(user.user_id, filename, file_type, bytes, metadata)
        .await?;

    if !outcome.is_duplicate {
        let document_id = outcome.document_id;
        let ingestion = state.ingestion.clone();
        tokio::spawn(async move {
            ingestion.generate_suggested_questions(document_id, subject).await;
        });
    }

    Ok(Json(UploadResponse {
        document_id: outcome.document_id,
        total_chunks: outcome.total_chunks,
        status: format!("{:?}", outcome.status).to_lowercase(),
        is_duplicate: outcome.is_duplicate,
        duplicate_of: outcome.duplicate_of,
    }))
}

pub async fn delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(document_id): Path<Uuid>,
) -> ApiResult<Json<DeletionStats>> {
    let stats = state
        .ingestion
        .delete_document(user.user_id, user.role, document_id)
        .await?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    #[serde(default = "default_filter")]
    pub filter: String,
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_filter() -> String {
    "all".to_string()
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
pub struct ListDocumentsResponse {
    pub documents: Vec<edtech_core::model::Document>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

pub async fn list_user_documents(
    State(state): State<AppState>,
    user: AuthUser,
    Path(requested_user_id): Path<Uuid>,
    Query(query): Query<ListDocumentsQuery>,
) -> ApiResult<Json<ListDocumentsResponse>> {
    if requested_user_id != user.user_id && user.role != edtech_core::model::Role::Teacher {
        return Err(ApiError::Authorization(
            "only the account owner or a teacher may list these documents".into(),
        ));
    }

    let (documents, total) = state
        .repository
        .list_user_documents(
            requested_user_id,
            user.role,
            &query.filter,
            query.search.as_deref(),
            query.page,
            query.limit,
        )
        .await?;

    Ok(Json(ListDocumentsResponse {
        documents,
        total,
        page: query.page,
        limit: query.limit,
    }))
}
