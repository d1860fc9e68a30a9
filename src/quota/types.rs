// quota/types.rs - Quota records, system defaults and hard maxima

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use super::validation::{validate_fields, QuotaField, QuotaValidationError};

// Defaults applied when an owner has no explicit record
pub const DEFAULT_MAX_REQUESTS_PER_MINUTE: i32 = 100;
pub const DEFAULT_MAX_SUBSCRIPTIONS: i32 = 10;
pub const DEFAULT_MAX_EVENTS_PER_MINUTE: i32 = 12;
pub const DEFAULT_MAX_SUBSCRIPTION_REQUESTS_PER_MINUTE: i32 = 10;
pub const DEFAULT_MAX_SUBSCRIPTION_REQUESTS_PER_DAY: i32 = 20;
pub const DEFAULT_MAX_ACTIVE_INVOCATIONS: i32 = 1;
pub const DEFAULT_MAX_INVOCATIONS_PER_HOUR: i32 = 10;

// Hard maxima accepted from administrators
pub const MAX_REQUESTS_PER_MINUTE: i64 = 10_000;
pub const MAX_REQUESTS_PER_HOUR: i64 = 600_000;
pub const MAX_SUBSCRIPTIONS: i64 = 1_000;
pub const MAX_EVENTS_PER_MINUTE: i64 = 10_000;
pub const MAX_SUBSCRIPTION_REQUESTS_PER_MINUTE: i64 = 1_000;
pub const MAX_SUBSCRIPTION_REQUESTS_PER_DAY: i64 = 100_000;
pub const MAX_ACTIVE_INVOCATIONS: i64 = 100;
pub const MAX_INVOCATIONS_PER_HOUR: i64 = 10_000;

/// Shared behaviour of the three quota kinds.
pub trait QuotaRecord: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Human-readable kind, used in logs and errors.
    const KIND: &'static str;

    fn owner_id(&self) -> Uuid;

    /// The system default for an owner without an explicit record.
    fn default_for(owner_id: Uuid) -> Self;

    fn fields(&self) -> Vec<QuotaField>;

    fn validate(&self) -> Result<(), QuotaValidationError> {
        validate_fields(&self.fields())
    }

    fn created_at(&self) -> DateTime<Utc>;

    fn set_timestamps(&mut self, created_at: DateTime<Utc>, modified_at: DateTime<Utc>);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserApiQuota {
    pub user_id: Uuid,
    pub max_requests_per_minute: i32,
    pub max_requests_per_hour: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl QuotaRecord for UserApiQuota {
    const KIND: &'static str = "user API quota";

    fn owner_id(&self) -> Uuid {
        self.user_id
    }

    fn default_for(owner_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            user_id: owner_id,
            max_requests_per_minute: DEFAULT_MAX_REQUESTS_PER_MINUTE,
            max_requests_per_hour: None,
            created_at: now,
            modified_at: now,
        }
    }

    fn fields(&self) -> Vec<QuotaField> {
        let mut fields = vec![QuotaField::new(
            "max_requests_per_minute",
            self.max_requests_per_minute as i64,
            1,
            MAX_REQUESTS_PER_MINUTE,
        )];
        if let Some(per_hour) = self.max_requests_per_hour {
            fields.push(QuotaField::new("max_requests_per_hour", per_hour as i64, 1, MAX_REQUESTS_PER_HOUR));
        }
        fields
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn set_timestamps(&mut self, created_at: DateTime<Utc>, modified_at: DateTime<Utc>) {
        self.created_at = created_at;
        self.modified_at = modified_at;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookQuota {
    pub owner_id: Uuid,
    pub max_subscriptions: i32,
    pub max_events_per_minute: i32,
    pub max_subscription_requests_per_minute: i32,
    pub max_subscription_requests_per_day: i32,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl QuotaRecord for WebhookQuota {
    const KIND: &'static str = "webhook quota";

    fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    fn default_for(owner_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            owner_id,
            max_subscriptions: DEFAULT_MAX_SUBSCRIPTIONS,
            max_events_per_minute: DEFAULT_MAX_EVENTS_PER_MINUTE,
            max_subscription_requests_per_minute: DEFAULT_MAX_SUBSCRIPTION_REQUESTS_PER_MINUTE,
            max_subscription_requests_per_day: DEFAULT_MAX_SUBSCRIPTION_REQUESTS_PER_DAY,
            created_at: now,
            modified_at: now,
        }
    }

    fn fields(&self) -> Vec<QuotaField> {
        vec![
            QuotaField::new("max_subscriptions", self.max_subscriptions as i64, 1, MAX_SUBSCRIPTIONS),
            QuotaField::new("max_events_per_minute", self.max_events_per_minute as i64, 1, MAX_EVENTS_PER_MINUTE),
            QuotaField::new(
                "max_subscription_requests_per_minute",
                self.max_subscription_requests_per_minute as i64,
                1,
                MAX_SUBSCRIPTION_REQUESTS_PER_MINUTE,
            ),
            QuotaField::new(
                "max_subscription_requests_per_day",
                self.max_subscription_requests_per_day as i64,
                1,
                MAX_SUBSCRIPTION_REQUESTS_PER_DAY,
            ),
        ]
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn set_timestamps(&mut self, created_at: DateTime<Utc>, modified_at: DateTime<Utc>) {
        self.created_at = created_at;
        self.modified_at = modified_at;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AddonInvocationQuota {
    pub owner_id: Uuid,
    pub max_active_invocations: i32,
    pub max_invocations_per_hour: i32,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl QuotaRecord for AddonInvocationQuota {
    const KIND: &'static str = "add-on invocation quota";

    fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    fn default_for(owner_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            owner_id,
            max_active_invocations: DEFAULT_MAX_ACTIVE_INVOCATIONS,
            max_invocations_per_hour: DEFAULT_MAX_INVOCATIONS_PER_HOUR,
            created_at: now,
            modified_at: now,
        }
    }

    fn fields(&self) -> Vec<QuotaField> {
        vec![
            QuotaField::new("max_active_invocations", self.max_active_invocations as i64, 1, MAX_ACTIVE_INVOCATIONS),
            QuotaField::new(
                "max_invocations_per_hour",
                self.max_invocations_per_hour as i64,
                1,
                MAX_INVOCATIONS_PER_HOUR,
            ),
        ]
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn set_timestamps(&mut self, created_at: DateTime<Utc>, modified_at: DateTime<Utc>) {
        self.created_at = created_at;
        self.modified_at = modified_at;
    }
}

/// Admin request body for a quota kind.
///
/// Limits arrive as `i64` so out-of-range input is rejected by validation
/// instead of wrapping on conversion.
pub trait QuotaUpdate: DeserializeOwned + Send {
    type Quota: QuotaRecord;

    fn fields(&self) -> Vec<QuotaField>;

    fn validate(&self) -> Result<(), QuotaValidationError> {
        validate_fields(&self.fields())
    }

    /// Build the record. Only call after `validate` succeeded.
    fn into_quota(self, owner_id: Uuid) -> Self::Quota;
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserApiQuotaUpdate {
    pub max_requests_per_minute: i64,
    #[serde(default)]
    pub max_requests_per_hour: Option<i64>,
}

impl QuotaUpdate for UserApiQuotaUpdate {
    type Quota = UserApiQuota;

    fn fields(&self) -> Vec<QuotaField> {
        let mut fields = vec![QuotaField::new(
            "max_requests_per_minute",
            self.max_requests_per_minute,
            1,
            MAX_REQUESTS_PER_MINUTE,
        )];
        if let Some(per_hour) = self.max_requests_per_hour {
            fields.push(QuotaField::new("max_requests_per_hour", per_hour, 1, MAX_REQUESTS_PER_HOUR));
        }
        fields
    }

    fn into_quota(self, owner_id: Uuid) -> UserApiQuota {
        let mut quota = UserApiQuota::default_for(owner_id);
        quota.max_requests_per_minute = self.max_requests_per_minute as i32;
        quota.max_requests_per_hour = self.max_requests_per_hour.map(|v| v as i32);
        quota
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookQuotaUpdate {
    pub max_subscriptions: i64,
    pub max_events_per_minute: i64,
    pub max_subscription_requests_per_minute: i64,
    pub max_subscription_requests_per_day: i64,
}

impl QuotaUpdate for WebhookQuotaUpdate {
    type Quota = WebhookQuota;

    fn fields(&self) -> Vec<QuotaField> {
        vec![
            QuotaField::new("max_subscriptions", self.max_subscriptions, 1, MAX_SUBSCRIPTIONS),
            QuotaField::new("max_events_per_minute", self.max_events_per_minute, 1, MAX_EVENTS_PER_MINUTE),
            QuotaField::new(
                "max_subscription_requests_per_minute",
                self.max_subscription_requests_per_minute,
                1,
                MAX_SUBSCRIPTION_REQUESTS_PER_MINUTE,
            ),
            QuotaField::new(
                "max_subscription_requests_per_day",
                self.max_subscription_requests_per_day,
                1,
                MAX_SUBSCRIPTION_REQUESTS_PER_DAY,
            ),
        ]
    }

    fn into_quota(self, owner_id: Uuid) -> WebhookQuota {
        let mut quota = WebhookQuota::default_for(owner_id);
        quota.max_subscriptions = self.max_subscriptions as i32;
        quota.max_events_per_minute = self.max_events_per_minute as i32;
        quota.max_subscription_requests_per_minute = self.max_subscription_requests_per_minute as i32;
        quota.max_subscription_requests_per_day = self.max_subscription_requests_per_day as i32;
        quota
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddonInvocationQuotaUpdate {
    pub max_active_invocations: i64,
    pub max_invocations_per_hour: i64,
}

impl QuotaUpdate for AddonInvocationQuotaUpdate {
    type Quota = AddonInvocationQuota;

    fn fields(&self) -> Vec<QuotaField> {
        vec![
            QuotaField::new("max_active_invocations", self.max_active_invocations, 1, MAX_ACTIVE_INVOCATIONS),
            QuotaField::new(
                "max_invocations_per_hour",
                self.max_invocations_per_hour,
                1,
                MAX_INVOCATIONS_PER_HOUR,
            ),
        ]
    }

    fn into_quota(self, owner_id: Uuid) -> AddonInvocationQuota {
        let mut quota = AddonInvocationQuota::default_for(owner_id);
        quota.max_active_invocations = self.max_active_invocations as i32;
        quota.max_invocations_per_hour = self.max_invocations_per_hour as i32;
        quota
    }
}
