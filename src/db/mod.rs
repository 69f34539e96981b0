pub mod postgres;
pub mod redis;
pub mod repository;

pub use postgres::{create_pool, run_migrations, PgStore};
pub use redis::create_redis_client;
pub use redis::{Cache, CacheKey, CacheWriterHandle};
pub use redis::{RateLimitStore, RedisRateLimitStore};
pub use repository::{
    BlacklistRepository, TagRepository, TelemetryRepository, UserRepository, WatchlistRepository,
};
