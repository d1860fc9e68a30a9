// state.rs - Shared application services handed to every handler

use std::sync::Arc;

use crate::cache::{CacheBackend, CacheInvalidator, CacheService, MemoryCacheBackend, RedisCacheBackend};
use crate::collab::SessionHub;
use crate::config::AppConfig;
use crate::database::DatabaseManager;
use crate::quota::{
    AddonInvocationQuota, AddonRateLimiter, ApiRateLimiter, Clock, InMemoryQuotaStore, MemoryRateCounter,
    PgQuotaStore, QuotaCache, QuotaStore, RateCounter, RedisRateCounter, SystemClock, UserApiQuota, WebhookQuota,
    WebhookRateLimiter,
};
use crate::store::{InMemorySubResourceStore, SubResourceStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub database: Option<DatabaseManager>,
    pub user_api_quotas: Arc<dyn QuotaStore<UserApiQuota>>,
    pub webhook_quotas: Arc<dyn QuotaStore<WebhookQuota>>,
    pub addon_quotas: Arc<dyn QuotaStore<AddonInvocationQuota>>,
    pub quota_cache: Arc<QuotaCache>,
    pub api_rate_limiter: Arc<ApiRateLimiter>,
    pub webhook_rate_limiter: Arc<WebhookRateLimiter>,
    pub addon_rate_limiter: Arc<AddonRateLimiter>,
    pub cache_backend: Arc<dyn CacheBackend>,
    pub cache: CacheService,
    pub invalidator: CacheInvalidator,
    pub sub_resources: Arc<dyn SubResourceStore>,
    pub sessions: SessionHub,
    memory_cache: Option<Arc<MemoryCacheBackend>>,
}

/// Storage choices resolved before wiring the services together.
struct Backends {
    database: Option<DatabaseManager>,
    user_api_quotas: Arc<dyn QuotaStore<UserApiQuota>>,
    webhook_quotas: Arc<dyn QuotaStore<WebhookQuota>>,
    addon_quotas: Arc<dyn QuotaStore<AddonInvocationQuota>>,
    cache_backend: Arc<dyn CacheBackend>,
    memory_cache: Option<Arc<MemoryCacheBackend>>,
    counter: Arc<dyn RateCounter>,
}

impl AppState {
    /// PostgreSQL when a database URL is configured, Redis when a Redis URL is
    /// configured, memory for whatever is missing.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let (database, user_api_quotas, webhook_quotas, addon_quotas): (
            Option<DatabaseManager>,
            Arc<dyn QuotaStore<UserApiQuota>>,
            Arc<dyn QuotaStore<WebhookQuota>>,
            Arc<dyn QuotaStore<AddonInvocationQuota>>,
        ) = match &config.database.url {
            Some(url) => {
                let db = DatabaseManager::connect(url, &config.database).await?;
                let pool = db.pool().clone();
                (
                    Some(db),
                    Arc::new(PgQuotaStore::<UserApiQuota>::new(pool.clone())),
                    Arc::new(PgQuotaStore::<WebhookQuota>::new(pool.clone())),
                    Arc::new(PgQuotaStore::<AddonInvocationQuota>::new(pool)),
                )
            }
            None => {
                tracing::info!("DATABASE_URL not set, quota stores are in memory");
                (
                    None,
                    Arc::new(InMemoryQuotaStore::<UserApiQuota>::new()),
                    Arc::new(InMemoryQuotaStore::<WebhookQuota>::new()),
                    Arc::new(InMemoryQuotaStore::<AddonInvocationQuota>::new()),
                )
            }
        };

        let (cache_backend, memory_cache, counter): (Arc<dyn CacheBackend>, _, Arc<dyn RateCounter>) =
            match &config.cache.redis_url {
                Some(url) => {
                    let redis = RedisCacheBackend::connect(url, config.cache.redis_pool_size, config.cache.redis_timeout())
                        .await?;
                    let counter = Arc::new(RedisRateCounter::new(redis.pool().clone()));
                    (Arc::new(redis), None, counter)
                }
                None => {
                    tracing::info!("REDIS_URL not set, cache and rate counters are in memory");
                    let memory = Arc::new(MemoryCacheBackend::new(config.cache.sweep_interval()));
                    let counter = Arc::new(MemoryRateCounter::new(clock.clone()));
                    (memory.clone(), Some(memory), counter)
                }
            };

        Ok(Self::assemble(
            config,
            Backends {
                database,
                user_api_quotas,
                webhook_quotas,
                addon_quotas,
                cache_backend,
                memory_cache,
                counter,
            },
            clock,
        ))
    }

    /// Everything in memory, with the given clock driving rate windows.
    pub fn in_memory(config: AppConfig, clock: Arc<dyn Clock>) -> Self {
        let counter = Arc::new(MemoryRateCounter::new(clock.clone()));
        Self::in_memory_with_counter(config, clock, counter)
    }

    /// In-memory state counting requests with `counter`.
    pub fn in_memory_with_counter(config: AppConfig, clock: Arc<dyn Clock>, counter: Arc<dyn RateCounter>) -> Self {
        let memory = Arc::new(MemoryCacheBackend::new(config.cache.sweep_interval()));
        let backends = Backends {
            database: None,
            user_api_quotas: Arc::new(InMemoryQuotaStore::<UserApiQuota>::new()),
            webhook_quotas: Arc::new(InMemoryQuotaStore::<WebhookQuota>::new()),
            addon_quotas: Arc::new(InMemoryQuotaStore::<AddonInvocationQuota>::new()),
            cache_backend: memory.clone(),
            memory_cache: Some(memory),
            counter,
        };
        Self::assemble(config, backends, clock)
    }

    fn assemble(config: AppConfig, backends: Backends, clock: Arc<dyn Clock>) -> Self {
        let quota_cache = Arc::new(QuotaCache::new(config.cache.quota_ttl(), config.cache.sweep_interval()));
        let counter = Some(backends.counter);

        let api_rate_limiter = Arc::new(ApiRateLimiter::new(
            counter.clone(),
            quota_cache.clone(),
            backends.user_api_quotas.clone(),
            clock.clone(),
        ));
        let webhook_rate_limiter = Arc::new(WebhookRateLimiter::new(
            counter.clone(),
            quota_cache.clone(),
            backends.webhook_quotas.clone(),
            clock.clone(),
        ));
        let addon_rate_limiter = Arc::new(AddonRateLimiter::new(
            counter,
            quota_cache.clone(),
            backends.addon_quotas.clone(),
            clock,
        ));

        let cache = CacheService::new(backends.cache_backend.clone());
        let invalidator = CacheInvalidator::new(cache.clone());
        let sessions = SessionHub::new(config.collaboration.session_settings());

        Self {
            config: Arc::new(config),
            database: backends.database,
            user_api_quotas: backends.user_api_quotas,
            webhook_quotas: backends.webhook_quotas,
            addon_quotas: backends.addon_quotas,
            quota_cache,
            api_rate_limiter,
            webhook_rate_limiter,
            addon_rate_limiter,
            cache_backend: backends.cache_backend,
            cache,
            invalidator,
            sub_resources: Arc::new(InMemorySubResourceStore::new()),
            sessions,
            memory_cache: backends.memory_cache,
        }
    }

    /// Stop background work: collaboration sessions, TTL sweepers, pools.
    pub async fn shutdown(&self) {
        self.sessions.shutdown().await;
        self.quota_cache.stop();
        if let Some(memory) = &self.memory_cache {
            memory.stop();
        }
        if let Some(database) = &self.database {
            database.close().await;
        }
        tracing::info!("Application state shut down");
    }
}
