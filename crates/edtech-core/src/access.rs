//! Access-control resolver (spec §4.9).
//!
//! Pure domain logic, generalized from the teacher's
//! `security/authorization.rs` (`DocumentAuthorization::check_access`,
//! a thin DB-backed wrapper) into functions over an in-memory document
//! set; the DB-backed lookup lives in `rag-api-server::services::ingestion`
//! / `::retrieval`, which fetch the candidate set and then call through
//! here. Since `Document` carries only the owner's user-id, callers supply
//! `owner_is_teacher` to resolve the owner's role (one extra users-table
//! lookup at the call site, not modeled in this crate).

use std::collections::HashMap;
use uuid::Uuid;

use crate::model::{Document, Role};

/// Per spec.md §4.9: teachers see every completed document plus everything
/// they own in any status; students see every completed document uploaded
/// by any teacher plus everything they appear in upload-history for.
pub fn is_accessible(
    user_id: Uuid,
    role: Role,
    doc: &Document,
    owner_is_teacher: &impl Fn(Uuid) -> bool,
) -> bool {
    match role {
        Role::Teacher => doc.is_complete() || doc.owner_id == user_id,
        Role::Student => {
            (doc.is_complete() && owner_is_teacher(doc.owner_id))
                || doc.upload_history.iter().any(|h| h.user_id == user_id)
        }
    }
}

pub fn accessible_documents<'a>(
    user_id: Uuid,
    role: Role,
    documents: &'a [Document],
    owner_is_teacher: impl Fn(Uuid) -> bool,
) -> Vec<&'a Document> {
    documents
        .iter()
        .filter(|d| is_accessible(user_id, role, d, &owner_is_teacher))
        .collect()
}

/// The subset of accessible documents usable as retrieval namespaces:
/// global queries only ever search namespaces with vectors, i.e. completed
/// documents.
pub fn accessible_namespaces(
    user_id: Uuid,
    role: Role,
    documents: &[Document],
    owner_is_teacher: impl Fn(Uuid) -> bool,
) -> Vec<Uuid> {
    documents
        .iter()
        .filter(|d| d.is_complete() && is_accessible(user_id, role, d, &owner_is_teacher))
        .map(|d| d.id)
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct SelectionFilterResult {
    /// Caller-selected ids that are both accessible and completed.
    pub accessible_completed_ids: Vec<Uuid>,
    /// Caller-selected ids that are accessible but not yet completed —
    /// dropped from retrieval but surfaced in caller diagnostics.
    pub not_yet_completed: Vec<Uuid>,
}

/// Filter a caller-supplied document-id list down to the accessible,
/// completed subset. An id that's inaccessible (or unknown) is silently
/// dropped; an accessible-but-not-completed id is dropped from retrieval
/// and reported via `not_yet_completed`.
pub fn filter_selected(
    user_id: Uuid,
    role: Role,
    selected: &[Uuid],
    documents: &[Document],
    owner_is_teacher: impl Fn(Uuid) -> bool,
) -> SelectionFilterResult {
    let by_id: HashMap<Uuid, &Document> = documents.iter().map(|d| (d.id, d)).collect();
    let mut result = SelectionFilterResult::default();
    for id in selected {
        let Some(doc) = by_id.get(id) else { continue };
        if !is_accessible(user_id, role, doc, &owner_is_teacher) {
            continue;
        }
        if doc.is_complete() {
            result.accessible_completed_ids.push(*id);
        } else {
            result.not_yet_completed.push(*id);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentMetadata, DocumentStatus, FileType};
    use chrono::Utc;

    fn doc(owner_id: Uuid, status: DocumentStatus, history_user: Option<Uuid>) -> Document {
        let mut history = Vec::new();
        if let Some(uid) = history_user {
            history.push(crate::model::UploadRecord {
                user_id: uid,
                user_name: "x".into(),
                timestamp: Utc::now(),
                filename: "f.pdf".into(),
                content_hash: "h".into(),
            });
        }
        Document {
            id: Uuid::new_v4(),
            filename: "f.pdf".into(),
            file_type: FileType::Pdf,
            owner_id,
            created_at: Utc::now(),
            content_hash: "h".into(),
            original_uploader_id: owner_id,
            upload_history: history,
            status,
            total_chunks: 1,
            processed_chunks: if status == DocumentStatus::Completed { 1 } else { 0 },
            processed_chunk_indices: vec![],
            tags: vec![],
            metadata: DocumentMetadata::default(),
        }
    }

    #[test]
    fn student_sees_completed_teacher_docs() {
        let teacher_id = Uuid::new_v4();
        let student_id = Uuid::new_v4();
        let d = doc(teacher_id, DocumentStatus::Completed, None);
        assert!(is_accessible(student_id, Role::Student, &d, &|_| true));
    }

    #[test]
    fn student_does_not_see_incomplete_doc_they_did_not_upload() {
        let teacher_id = Uuid::new_v4();
        let student_id = Uuid::new_v4();
        let d = doc(teacher_id, DocumentStatus::Processing, None);
        assert!(!is_accessible(student_id, Role::Student, &d, &|_| true));
    }

    #[test]
    fn student_reaches_own_incomplete_upload_via_history() {
        let teacher_id = Uuid::new_v4();
        let student_id = Uuid::new_v4();
        let d = doc(teacher_id, DocumentStatus::Processing, Some(student_id));
        assert!(is_accessible(student_id, Role::Student, &d, &|_| true));
    }

    #[test]
    fn teacher_sees_own_incomplete_doc_but_not_in_namespaces() {
        let teacher_id = Uuid::new_v4();
        let d = doc(teacher_id, DocumentStatus::Processing, None);
        assert!(is_accessible(teacher_id, Role::Teacher, &d, &|_| true));
        let ns = accessible_namespaces(teacher_id, Role::Teacher, std::slice::from_ref(&d), |_| true);
        assert!(ns.is_empty());
    }

    #[test]
    fn selection_filter_drops_inaccessible_silently_and_flags_incomplete() {
        let teacher_id = Uuid::new_v4();
        let student_id = Uuid::new_v4();
        let completed = doc(teacher_id, DocumentStatus::Completed, None);
        let processing = doc(teacher_id, DocumentStatus::Processing, Some(student_id));
        let other_teacher_processing = doc(Uuid::new_v4(), DocumentStatus::Processing, None);
        let docs = vec![completed.clone(), processing.clone(), other_teacher_processing.clone()];
        let result = filter_selected(
            student_id,
            Role::Student,
            &[completed.id, processing.id, other_teacher_processing.id],
            &docs,
            |_| true,
        );
        assert_eq!(result.accessible_completed_ids, vec![completed.id]);
        assert_eq!(result.not_yet_completed, vec![processing.id]);
    }
}
