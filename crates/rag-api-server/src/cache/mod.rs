//! Redis-backed frequency counter, answer cache, and progress pub/sub.
//!
//! Grounded in `original_source/services/rag-query/cache/redis_cache.py`
//! (`rag_cache:{doc}:{hash}` / `rag_frequency:{doc}:{hash}` key scheme,
//! 24h frequency TTL set only on the first increment) and the
//! `document:status:{document-id}` pub/sub channel naming of spec §6.

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use edtech_core::error::{ApiError, ApiResult};
use edtech_core::model::ProgressEvent;
use edtech_core::traits::{ProgressPublisher, ResponseCache};
use redis::AsyncCommands;
use uuid::Uuid;

use crate::config::CacheConfig;

pub struct RedisCache {
    pool: Pool,
}

fn cache_key(doc: Uuid, question_key: &str) -> String {
    format!("rag_cache:{doc}:{question_key}")
}

fn frequency_key(doc: Uuid, question_key: &str) -> String {
    format!("rag_frequency:{doc}:{question_key}")
}

pub fn progress_channel(document_id: Uuid) -> String {
    format!("document:status:{document_id}")
}

impl RedisCache {
    pub fn connect(config: &CacheConfig) -> ApiResult<Self> {
        let pool = PoolConfig::from_url(&config.url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| ApiError::external("redis", e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> Pool {
        self.pool.clone()
    }
}

#[async_trait]
impl ResponseCache for RedisCache {
    async fn bump_frequency(&self, doc: Uuid, question_key: &str) -> ApiResult<u64> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| ApiError::external("redis", e.to_string()))?;
        let key = frequency_key(doc, question_key);
        let count: u64 = conn
            .incr(&key, 1)
            .await
            .map_err(|e| ApiError::external("redis", e.to_string()))?;
        if count == 1 {
            let _: () = conn
                .expire(&key, 86_400)
                .await
                .map_err(|e| ApiError::external("redis", e.to_string()))?;
        }
        Ok(count)
    }

    async fn get_cached(&self, doc: Uuid, question_key: &str) -> ApiResult<Option<String>> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| ApiError::external("redis", e.to_string()))?;
        let value: Option<String> = conn
            .get(cache_key(doc, question_key))
            .await
            .map_err(|e| ApiError::external("redis", e.to_string()))?;
        Ok(value)
    }

    async fn set_cached(
        &self,
        doc: Uuid,
        question_key: &str,
        answer: &str,
        ttl_seconds: u64,
    ) -> ApiResult<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| ApiError::external("redis", e.to_string()))?;
        let _: () = conn
            .set_ex(cache_key(doc, question_key), answer, ttl_seconds)
            .await
            .map_err(|e| ApiError::external("redis", e.to_string()))?;
        Ok(())
    }

    async fn delete_document_keys(&self, doc: Uuid) -> ApiResult<u64> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| ApiError::external("redis", e.to_string()))?;
        let mut removed = 0u64;
        for pattern in [format!("rag_cache:{doc}:*"), format!("rag_frequency:{doc}:*")] {
            let keys: Vec<String> = conn
                .keys(&pattern)
                .await
                .map_err(|e| ApiError::external("redis", e.to_string()))?;
            if !keys.is_empty() {
                removed += conn
                    .del::<_, u64>(&keys)
                    .await
                    .map_err(|e| ApiError::external("redis", e.to_string()))?;
            }
        }
        Ok(removed)
    }
}

pub struct RedisProgressPublisher {
    pool: Pool,
}

impl RedisProgressPublisher {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressPublisher for RedisProgressPublisher {
    async fn publish(&self, document_id: Uuid, event: &ProgressEvent) -> ApiResult<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| ApiError::external("redis", e.to_string()))?;
        let payload = serde_json::to_string(event).map_err(|e| ApiError::Internal(e.to_string()))?;
        let _: () = conn
            .publish(progress_channel(document_id), payload)
            .await
            .map_err(|e| ApiError::external("redis", e.to_string()))?;
        Ok(())
    }
}
