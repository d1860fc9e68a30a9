pub mod backend;
pub mod invalidation;
pub mod keys;
pub mod metrics;
pub mod service;
pub mod ttl;

pub use backend::{CacheBackend, CacheError, MemoryCacheBackend, RedisCacheBackend};
pub use invalidation::{CacheInvalidator, InvalidationEvent, InvalidationStrategy, OperationType};
pub use keys::EntityType;
pub use metrics::{CacheMetrics, CacheStats, EntityStats};
pub use service::CacheService;
pub use ttl::TtlCache;
