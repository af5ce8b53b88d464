//! Pinecone-style HTTP vector index client implementing
//! `edtech_core::traits::VectorIndex`. Duplicated from
//! `rag-api-server::vector_index` — the worker only ever calls `upsert`,
//! but keeps the full trait impl so it stays a drop-in `Arc<dyn
//! VectorIndex>` like every other binding of this interface.
//!
//! Grounded in `original_source/services/vectorization/vector_store/
//! pinecone_client.py`: one namespace per document, idempotent upsert
//! keyed by vector-id.

use async_trait::async_trait;
use edtech_core::error::{ApiError, ApiResult};
use edtech_core::traits::{VectorIndex, VectorMatch};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

use crate::config::VectorIndexConfig;

pub struct PineconeIndex {
    client: Client,
    config: VectorIndexConfig,
}

impl PineconeIndex {
    pub fn new(config: VectorIndexConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(
        &self,
        namespace: Uuid,
        vector_id: &str,
        embedding: Vec<f32>,
        metadata: Value,
    ) -> ApiResult<()> {
        let mut metadata = metadata;
        if let Some(text) = metadata.get("text").and_then(|v| v.as_str()) {
            let truncated: String = text.chars().take(self.config.metadata_text_limit).collect();
            metadata["text"] = Value::String(truncated);
        }

        let body = json!({
            "vectors": [{ "id": vector_id, "values": embedding, "metadata": metadata }],
            "namespace": namespace.to_string(),
        });

        let response = self
            .client
            .post(self.url("/vectors/upsert"))
            .header("Api-Key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::external("vector-index", e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::external(
                "vector-index",
                format!("upsert failed with status {}", response.status()),
            ));
        }
        Ok(())
    }

    async fn query(&self, namespace: Uuid, vector: &[f32], top_k: usize) -> ApiResult<Vec<VectorMatch>> {
        let body = json!({
            "namespace": namespace.to_string(),
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "includeValues": false,
        });

        let response = self
            .client
            .post(self.url("/query"))
            .header("Api-Key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::external("vector-index", e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::external(
                "vector-index",
                format!("query failed with status {}", response.status()),
            ));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| ApiError::external("vector-index", e.to_string()))?;

        let matches = parsed
            .get("matches")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(matches
            .into_iter()
            .filter_map(|m| {
                Some(VectorMatch {
                    vector_id: m.get("id")?.as_str()?.to_string(),
                    score: m.get("score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
                    metadata: m.get("metadata").cloned().unwrap_or(Value::Null),
                })
            })
            .collect())
    }

    async fn delete_namespace(&self, namespace: Uuid) -> ApiResult<()> {
        let body = json!({ "deleteAll": true, "namespace": namespace.to_string() });
        let response = self
            .client
            .post(self.url("/vectors/delete"))
            .header("Api-Key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::external("vector-index", e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::external(
                "vector-index",
                format!("delete_namespace failed with status {}", response.status()),
            ));
        }
        Ok(())
    }
}
