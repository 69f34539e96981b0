pub mod cache;
pub mod rate_limit;

mod macros;

pub use cache::create_redis_client;
pub use cache::Cache;
pub use cache::CacheKey;
pub use cache::CacheWriterHandle;
pub use rate_limit::RateLimitStore;
pub use rate_limit::RedisRateLimitStore;
