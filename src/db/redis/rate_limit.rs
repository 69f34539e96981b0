use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::time::Duration;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::error::AppResult;

/// Backing store for sliding-window request logs
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Records one request for `key` at `now_ms` and returns how many requests
    /// fall inside the trailing `window`, including this one. A request that
    /// pushes the count past `limit` is not kept in the log.
    async fn record_hit(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
        limit: u64,
    ) -> AppResult<u64>;
}

/// Sliding-window log in a Redis sorted set, one member per request
#[derive(Clone)]
pub struct RedisRateLimitStore {
    redis_client: Client,
    manager: OnceCell<ConnectionManager>,
}

impl RedisRateLimitStore {
    pub fn new(redis_client: Client) -> Self {
        Self {
            redis_client,
            manager: OnceCell::new(),
        }
    }

    /// Shared connection, established on first use and reconnected by the manager
    async fn connection(&self) -> AppResult<ConnectionManager> {
        let manager = self
            .manager
            .get_or_try_init(|| ConnectionManager::new(self.redis_client.clone()))
            .await?;
        Ok(manager.clone())
    }
}

#[async_trait::async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn record_hit(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
        limit: u64,
    ) -> AppResult<u64> {
        let window_ms = window.as_millis() as i64;
        let member = format!("{}-{}", now_ms, Uuid::new_v4().simple());
        let mut conn = self.connection().await?;

        let (_, _, count, _): (i64, i64, u64, i64) = redis::pipe()
            .atomic()
            .zrembyscore(key, 0, now_ms - window_ms)
            .zadd(key, &member, now_ms)
            .zcard(key)
            .pexpire(key, window_ms)
            .query_async(&mut conn)
            .await?;

        if count > limit {
            let _: i64 = conn.zrem(key, &member).await?;
        }

        Ok(count)
    }
}
