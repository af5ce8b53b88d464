//! Round-robin diversification across documents for global queries.
//!
//! Grounded almost line-for-line in
//! `global_query_service.py::GlobalQueryService._diversify`: group by
//! namespace in insertion order, then repeatedly pop the next
//! highest-scoring remaining chunk per namespace until the per-document and
//! total caps are hit.

use std::collections::HashMap;
use uuid::Uuid;

use crate::model::RetrievedChunk;

/// `results` is assumed already sorted by score descending within each
/// namespace (the vector index returns top-k by score). Namespace
/// iteration order is the order namespaces first appear in `results`,
/// making the output deterministic given input ordering.
pub fn diversify(
    results: Vec<RetrievedChunk>,
    max_per_doc: usize,
    max_total: usize,
) -> Vec<RetrievedChunk> {
    let mut order: Vec<Uuid> = Vec::new();
    let mut by_doc: HashMap<Uuid, Vec<RetrievedChunk>> = HashMap::new();
    for chunk in results {
        if !by_doc.contains_key(&chunk.document_id) {
            order.push(chunk.document_id);
        }
        by_doc.entry(chunk.document_id).or_default().push(chunk);
    }

    let mut diverse = Vec::new();
    let mut per_doc_count: HashMap<Uuid, usize> = HashMap::new();

    loop {
        if diverse.len() >= max_total {
            break;
        }
        let mut progressed = false;
        for doc_id in &order {
            if diverse.len() >= max_total {
                break;
            }
            let count = per_doc_count.entry(*doc_id).or_insert(0);
            if *count >= max_per_doc {
                continue;
            }
            if let Some(bucket) = by_doc.get_mut(doc_id) {
                if !bucket.is_empty() {
                    diverse.push(bucket.remove(0));
                    *count += 1;
                    progressed = true;
                }
            }
        }
        if !progressed {
            break;
        }
    }

    diverse.truncate(max_total);
    diverse
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn chunk(doc: Uuid, idx: i64, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            document_id: doc,
            chunk_index: idx,
            text: format!("chunk {idx}"),
            score,
            document_title: "t".into(),
            uploader_name: "u".into(),
            uploader_id: Uuid::new_v4(),
            upload_date: Utc::now(),
        }
    }

    #[test]
    fn caps_per_document_and_total() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let d = Uuid::new_v4();
        let mut results = Vec::new();
        for doc in [a, b, c, d] {
            for i in 0..5 {
                results.push(chunk(doc, i, 0.9 - i as f32 * 0.1));
            }
        }
        let diverse = diversify(results, 2, 8);
        assert_eq!(diverse.len(), 8);
        let mut counts: HashMap<Uuid, usize> = HashMap::new();
        for r in &diverse {
            *counts.entry(r.document_id).or_insert(0) += 1;
        }
        for (_, count) in counts {
            assert!(count <= 2);
        }
    }

    #[test]
    fn preserves_highest_score_first_within_document() {
        let a = Uuid::new_v4();
        let results = vec![chunk(a, 0, 0.9), chunk(a, 1, 0.8), chunk(a, 2, 0.7)];
        let diverse = diversify(results, 2, 8);
        assert_eq!(diverse.len(), 2);
        assert_eq!(diverse[0].chunk_index, 0);
        assert_eq!(diverse[1].chunk_index, 1);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(diversify(Vec::new(), 2, 8).is_empty());
    }
}
