// quota/mod.rs - Per-principal quotas, their cache and the rate limiters built on them

pub mod addon_limiter;
pub mod cache;
pub mod clock;
pub mod counter;
pub mod memory;
pub mod postgres;
pub mod rate_limit;
pub mod store;
pub mod types;
pub mod validation;
pub mod webhook_limiter;

pub use addon_limiter::{AddonRateLimiter, AddonUsage};
pub use cache::QuotaCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::{CounterError, MemoryRateCounter, RateCounter, RedisRateCounter};
pub use memory::InMemoryQuotaStore;
pub use postgres::PgQuotaStore;
pub use rate_limit::{ApiRateLimiter, QuotaExceeded, RateLimitDecision, RateLimitInfo};
pub use store::{QuotaStore, QuotaStoreError};
pub use types::{
    AddonInvocationQuota, AddonInvocationQuotaUpdate, QuotaRecord, QuotaUpdate, UserApiQuota,
    UserApiQuotaUpdate, WebhookQuota, WebhookQuotaUpdate,
};
pub use validation::{QuotaField, QuotaValidationError};
pub use webhook_limiter::{SubscriptionRateInfo, WebhookRateLimiter, WindowUsage};
