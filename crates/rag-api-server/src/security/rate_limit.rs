//! Sliding-window rate limiter backed by Redis sorted sets.
//!
//! Grounded in `original_source/services/api-gateway/middleware/
//! rate_limiter.py` (`RateLimiter.check_rate_limit`): evict entries older
//! than the window via `ZREMRANGEBYSCORE`, count the remainder via
//! `ZCARD`, reject once the count reaches the configured limit, otherwise
//! record the current request with `ZADD` and bound the key's lifetime
//! with `EXPIRE`.
//!
//! Per spec §5 the limiter MUST fail closed: any error reaching the
//! backing store (pool exhaustion, connection refused, command failure)
//! is itself treated as a rate-limit rejection rather than being allowed
//! through.

use deadpool_redis::Pool;
use edtech_core::error::{ApiError, ApiResult};
use redis::AsyncCommands;
use uuid::Uuid;

use crate::config::RateLimitConfig;

pub struct RateLimiter {
    pool: Pool,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(pool: Pool, config: RateLimitConfig) -> Self {
        Self { pool, config }
    }

    /// Per-user sliding window keyed on the caller's id.
    pub async fn check_user(&self, user_id: Uuid) -> ApiResult<()> {
        self.check_window(
            &format!("rate:user:{user_id}"),
            self.config.per_user_limit,
            self.config.per_user_window_seconds,
        )
        .await
    }

    /// Global sliding window shared by all callers, independent of the
    /// per-user one (spec §5 "per-user AND global" limiting).
    pub async fn check_global(&self) -> ApiResult<()> {
        self.check_window(
            "rate:global",
            self.config.global_limit,
            self.config.global_window_seconds,
        )
        .await
    }

    async fn check_window(&self, key: &str, limit: u32, window_seconds: u64) -> ApiResult<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|_| ApiError::RateLimit)?;

        let now_millis = current_millis()?;
        let window_start = now_millis.saturating_sub(window_seconds * 1000);

        let _: () = conn
            .zrembyscore(key, 0, window_start as f64)
            .await
            .map_err(|_| ApiError::RateLimit)?;

        let count: u64 = conn.zcard(key).await.map_err(|_| ApiError::RateLimit)?;

        if count >= limit as u64 {
            return Err(ApiError::RateLimit);
        }

        let member = format!("{now_millis}-{}", Uuid::new_v4());
        let _: () = conn
            .zadd(key, member, now_millis as f64)
            .await
            .map_err(|_| ApiError::RateLimit)?;
        let _: () = conn
            .expire(key, window_seconds as i64)
            .await
            .map_err(|_| ApiError::RateLimit)?;

        Ok(())
    }
}

/// `SystemTime` rather than `Instant` since the timestamp is stored as the
/// sorted-set score and must be comparable across process restarts.
fn current_millis() -> ApiResult<u64> {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_millis_is_monotonic_enough() {
        let a = current_millis().unwrap();
        let b = current_millis().unwrap();
        assert!(b >= a);
    }
}
