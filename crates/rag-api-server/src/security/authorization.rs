//! Thin DB-backed wrapper around `edtech_core::access` (spec §4.9).
//!
//! Generalizes the teacher's `DocumentAuthorization::check_access` /
//! `require_access` pair (fetch, check, `warn!` on denial) onto the new
//! `Document`/`Role` model: resolve the document and the owner's role
//! from the repository, then defer the actual rule to the pure domain
//! function.

use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use edtech_core::access::is_accessible;
use edtech_core::error::{ApiError, ApiResult};
use edtech_core::model::{Document, Role};

use crate::database::Repository;

pub struct DocumentAuthorization {
    repository: Arc<Repository>,
}

impl DocumentAuthorization {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }

    async fn owner_is_teacher(&self, owner_id: Uuid) -> ApiResult<bool> {
        self.repository.is_teacher(owner_id).await
    }

    pub async fn check_access(&self, user_id: Uuid, role: Role, document: &Document) -> ApiResult<bool> {
        let owner_teacher = self.owner_is_teacher(document.owner_id).await?;
        let allowed = is_accessible(user_id, role, document, &|_| owner_teacher);
        if allowed {
            debug!(%user_id, document_id = %document.id, "access granted");
        } else {
            warn!(%user_id, document_id = %document.id, "access denied");
        }
        Ok(allowed)
    }

    pub async fn require_access(&self, user_id: Uuid, role: Role, document: &Document) -> ApiResult<()> {
        if !self.check_access(user_id, role, document).await? {
            return Err(ApiError::Authorization(format!(
                "access denied to document {}",
                document.id
            )));
        }
        Ok(())
    }

    /// Fetches the document and enforces access in one step, returning
    /// `ApiError::NotFound` for both a missing document and an
    /// inaccessible one, so callers can't distinguish "doesn't exist"
    /// from "exists but you can't see it".
    pub async fn load_authorized(
        &self,
        user_id: Uuid,
        role: Role,
        document_id: Uuid,
    ) -> ApiResult<Document> {
        let document = self
            .repository
            .get_document(document_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("document {document_id} not found")))?;
        if !self.check_access(user_id, role, &document).await? {
            return Err(ApiError::NotFound(format!("document {document_id} not found")));
        }
        Ok(document)
    }
}
