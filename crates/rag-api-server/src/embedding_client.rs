//! Embedding HTTP client implementing `edtech_core::traits::Embedder`.
//! Generalizes the teacher's `services/embedding_service.rs` (reqwest
//! client posting `{input, model}`, idempotent-read retry).

use async_trait::async_trait;
use edtech_core::error::{ApiError, ApiResult};
use edtech_core::traits::Embedder;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::EmbeddingConfig;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct HttpEmbedder {
    client: Client,
    config: EmbeddingConfig,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, config }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> ApiResult<Vec<f32>> {
        let body = EmbeddingRequest {
            input: text,
            model: &self.config.model,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut builder = self
                .client
                .post(format!("{}/v1/embeddings", self.config.base_url))
                .json(&body);
            if let Some(key) = &self.config.api_key {
                builder = builder.bearer_auth(key);
            }

            match builder.send().await {
                Ok(response) if response.status().is_success() => {
                    let parsed: EmbeddingResponse = response
                        .json()
                        .await
                        .map_err(|e| ApiError::external("embedder", e.to_string()))?;
                    let embedding = parsed
                        .data
                        .into_iter()
                        .next()
                        .map(|d| d.embedding)
                        .ok_or_else(|| ApiError::external("embedder", "empty embedding response"))?;
                    return Ok(embedding);
                }
                Ok(response) if attempt >= 3 => {
                    return Err(ApiError::external(
                        "embedder",
                        format!("request failed with status {}", response.status()),
                    ))
                }
                Err(e) if attempt >= 3 => return Err(ApiError::external("embedder", e.to_string())),
                _ => {
                    let backoff = Duration::from_millis(200 * 2u64.pow(attempt - 1));
                    debug!(attempt, "embedding request failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}
