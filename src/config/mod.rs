use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::collab::SessionSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub api: ApiConfig,
    pub collaboration: CollaborationConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Quota stores use PostgreSQL when set, memory otherwise.
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Distributed cache and rate counters use Redis when set, memory otherwise.
    pub redis_url: Option<String>,
    pub redis_pool_size: usize,
    pub redis_timeout_ms: u64,
    pub quota_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub invalidation_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enable_rate_limiting: bool,
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationConfig {
    pub session_idle_secs: u64,
    pub cleanup_interval_secs: u64,
    pub client_buffer: usize,
    pub read_timeout_secs: u64,
    pub ping_interval_secs: u64,
    pub max_message_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    #[serde(skip_serializing, default)]
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v).filter(|s| !s.is_empty());
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Cache overrides
        if let Ok(v) = env::var("REDIS_URL") {
            self.cache.redis_url = Some(v).filter(|s| !s.is_empty());
        }
        if let Ok(v) = env::var("REDIS_POOL_SIZE") {
            self.cache.redis_pool_size = v.parse().unwrap_or(self.cache.redis_pool_size);
        }
        if let Ok(v) = env::var("REDIS_TIMEOUT_MS") {
            self.cache.redis_timeout_ms = v.parse().unwrap_or(self.cache.redis_timeout_ms);
        }
        if let Ok(v) = env::var("CACHE_QUOTA_TTL_SECS") {
            self.cache.quota_ttl_secs = v.parse().unwrap_or(self.cache.quota_ttl_secs);
        }
        if let Ok(v) = env::var("CACHE_SWEEP_INTERVAL_SECS") {
            self.cache.sweep_interval_secs = v.parse().unwrap_or(self.cache.sweep_interval_secs);
        }
        if let Ok(v) = env::var("CACHE_INVALIDATION_TIMEOUT_MS") {
            self.cache.invalidation_timeout_ms = v.parse().unwrap_or(self.cache.invalidation_timeout_ms);
        }

        // API overrides
        if let Ok(v) = env::var("API_ENABLE_RATE_LIMITING") {
            self.api.enable_rate_limiting = v.parse().unwrap_or(self.api.enable_rate_limiting);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Collaboration overrides
        if let Ok(v) = env::var("COLLAB_SESSION_IDLE_SECS") {
            self.collaboration.session_idle_secs = v.parse().unwrap_or(self.collaboration.session_idle_secs);
        }
        if let Ok(v) = env::var("COLLAB_CLEANUP_INTERVAL_SECS") {
            self.collaboration.cleanup_interval_secs = v.parse().unwrap_or(self.collaboration.cleanup_interval_secs);
        }
        if let Ok(v) = env::var("COLLAB_CLIENT_BUFFER") {
            self.collaboration.client_buffer = v.parse().unwrap_or(self.collaboration.client_buffer);
        }
        if let Ok(v) = env::var("COLLAB_MAX_MESSAGE_BYTES") {
            self.collaboration.max_message_bytes = v.parse().unwrap_or(self.collaboration.max_message_bytes);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            cache: CacheConfig {
                redis_url: None,
                redis_pool_size: 8,
                redis_timeout_ms: 2_000,
                quota_ttl_secs: 60,
                sweep_interval_secs: 60,
                invalidation_timeout_ms: 2_000,
            },
            api: ApiConfig {
                enable_rate_limiting: true,
                enable_request_logging: true,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            collaboration: CollaborationConfig::default(),
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:4200".to_string(), "http://localhost:5173".to_string()],
                jwt_secret: "development-secret-change-me".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 10,
            },
            cache: CacheConfig {
                redis_url: None,
                redis_pool_size: 16,
                redis_timeout_ms: 1_000,
                quota_ttl_secs: 60,
                sweep_interval_secs: 60,
                invalidation_timeout_ms: 1_000,
            },
            api: ApiConfig {
                enable_rate_limiting: true,
                enable_request_logging: true,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
            collaboration: CollaborationConfig::default(),
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
            cache: CacheConfig {
                redis_url: None,
                redis_pool_size: 32,
                redis_timeout_ms: 500,
                quota_ttl_secs: 60,
                sweep_interval_secs: 30,
                invalidation_timeout_ms: 500,
            },
            api: ApiConfig {
                enable_rate_limiting: true,
                enable_request_logging: false,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
            },
            collaboration: CollaborationConfig::default(),
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
            },
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

impl CacheConfig {
    pub fn quota_ttl(&self) -> Duration {
        Duration::from_secs(self.quota_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn redis_timeout(&self) -> Duration {
        Duration::from_millis(self.redis_timeout_ms)
    }

    pub fn invalidation_timeout(&self) -> Duration {
        Duration::from_millis(self.invalidation_timeout_ms)
    }
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self {
            session_idle_secs: 15 * 60,
            cleanup_interval_secs: 5 * 60,
            client_buffer: 256,
            read_timeout_secs: 60,
            ping_interval_secs: 30,
            max_message_bytes: 4096,
        }
    }
}

impl CollaborationConfig {
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            idle_timeout: Duration::from_secs(self.session_idle_secs),
            cleanup_interval: Duration::from_secs(self.cleanup_interval_secs),
            client_buffer: self.client_buffer,
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            max_message_size: self.max_message_bytes,
        }
    }
}
