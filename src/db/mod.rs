pub mod postgres;
pub mod redis;

pub use postgres::create_pool;
pub use postgres::PgCatalog;
pub use postgres::PgRecommendationLog;
pub use self::redis::create_redis_client;
pub use self::redis::Cache;
pub use self::redis::CacheKey;
pub use self::redis::CacheWriterHandle;
