//! Redis progress pub/sub, shared channel naming with
//! `rag-api-server::cache`. The worker has no need for the answer cache
//! or frequency counters, so only the publisher side is duplicated here.

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use edtech_core::error::{ApiError, ApiResult};
use edtech_core::model::ProgressEvent;
use edtech_core::traits::ProgressPublisher;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::config::CacheConfig;

pub fn progress_channel(document_id: Uuid) -> String {
    format!("document:status:{document_id}")
}

pub struct RedisProgressPublisher {
    pool: Pool,
}

impl RedisProgressPublisher {
    pub fn connect(config: &CacheConfig) -> ApiResult<Self> {
        let pool = PoolConfig::from_url(&config.url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| ApiError::external("redis", e.to_string()))?;
        Ok(Self { pool })
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
