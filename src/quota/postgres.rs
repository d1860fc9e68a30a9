// quota/postgres.rs - PostgreSQL quota stores

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::QueryAs;
use sqlx::{FromRow, PgPool, Postgres};
use std::marker::PhantomData;
use uuid::Uuid;

use super::store::{QuotaStore, QuotaStoreError};
use super::types::{AddonInvocationQuota, QuotaRecord, UserApiQuota, WebhookQuota};

type PgQueryAs<'q, Q> = QueryAs<'q, Postgres, Q, PgArguments>;

/// Table layout for a quota kind.
pub trait PgQuotaTable: QuotaRecord + for<'r> FromRow<'r, PgRow> + Unpin {
    const TABLE: &'static str;
    const OWNER_COLUMN: &'static str;
    const LIMIT_COLUMNS: &'static [&'static str];
    const DDL: &'static str;

    /// Bind limit values in `LIMIT_COLUMNS` order.
    fn bind_limits<'q>(&self, query: PgQueryAs<'q, Self>) -> PgQueryAs<'q, Self>;
}

impl PgQuotaTable for UserApiQuota {
    const TABLE: &'static str = "user_api_quotas";
    const OWNER_COLUMN: &'static str = "user_id";
    const LIMIT_COLUMNS: &'static [&'static str] = &["max_requests_per_minute", "max_requests_per_hour"];
    const DDL: &'static str = "CREATE TABLE IF NOT EXISTS user_api_quotas (
        user_id UUID PRIMARY KEY,
        max_requests_per_minute INTEGER NOT NULL DEFAULT 100,
        max_requests_per_hour INTEGER,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        modified_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )";

    fn bind_limits<'q>(&self, query: PgQueryAs<'q, Self>) -> PgQueryAs<'q, Self> {
        query
            .bind(self.max_requests_per_minute)
            .bind(self.max_requests_per_hour)
    }
}

impl PgQuotaTable for WebhookQuota {
    const TABLE: &'static str = "webhook_quotas";
    const OWNER_COLUMN: &'static str = "owner_id";
    const LIMIT_COLUMNS: &'static [&'static str] = &[
        "max_subscriptions",
        "max_events_per_minute",
        "max_subscription_requests_per_minute",
        "max_subscription_requests_per_day",
    ];
    const DDL: &'static str = "CREATE TABLE IF NOT EXISTS webhook_quotas (
        owner_id UUID PRIMARY KEY,
        max_subscriptions INTEGER NOT NULL DEFAULT 10,
        max_events_per_minute INTEGER NOT NULL DEFAULT 12,
        max_subscription_requests_per_minute INTEGER NOT NULL DEFAULT 10,
        max_subscription_requests_per_day INTEGER NOT NULL DEFAULT 20,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        modified_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )";

    fn bind_limits<'q>(&self, query: PgQueryAs<'q, Self>) -> PgQueryAs<'q, Self> {
        query
            .bind(self.max_subscriptions)
            .bind(self.max_events_per_minute)
            .bind(self.max_subscription_requests_per_minute)
            .bind(self.max_subscription_requests_per_day)
    }
}

impl PgQuotaTable for AddonInvocationQuota {
    const TABLE: &'static str = "addon_invocation_quotas";
    const OWNER_COLUMN: &'static str = "owner_id";
    const LIMIT_COLUMNS: &'static [&'static str] = &["max_active_invocations", "max_invocations_per_hour"];
    const DDL: &'static str = "CREATE TABLE IF NOT EXISTS addon_invocation_quotas (
        owner_id UUID PRIMARY KEY,
        max_active_invocations INTEGER NOT NULL DEFAULT 1,
        max_invocations_per_hour INTEGER NOT NULL DEFAULT 10,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        modified_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )";

    fn bind_limits<'q>(&self, query: PgQueryAs<'q, Self>) -> PgQueryAs<'q, Self> {
        query
            .bind(self.max_active_invocations)
            .bind(self.max_invocations_per_hour)
    }
}

/// Create the quota tables if they are missing.
pub async fn ensure_quota_tables(pool: &PgPool) -> Result<(), sqlx::Error> {
    for ddl in [UserApiQuota::DDL, WebhookQuota::DDL, AddonInvocationQuota::DDL] {
        sqlx::query(ddl).execute(pool).await?;
    }
    tracing::info!("Quota tables ready");
    Ok(())
}

pub struct PgQuotaStore<Q> {
    pool: PgPool,
    _kind: PhantomData<fn() -> Q>,
}

impl<Q: PgQuotaTable> PgQuotaStore<Q> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _kind: PhantomData,
        }
    }

    fn select_columns() -> String {
        let mut columns = vec![Q::OWNER_COLUMN];
        columns.extend_from_slice(Q::LIMIT_COLUMNS);
        columns.extend_from_slice(&["created_at", "modified_at"]);
        columns.join(", ")
    }

    fn classify(err: sqlx::Error, owner_id: Uuid) -> QuotaStoreError {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                // unique_violation
                Some("23505") => return QuotaStoreError::AlreadyExists { kind: Q::KIND, owner_id },
                // foreign_key_violation
                Some("23503") => return QuotaStoreError::UnknownOwner(owner_id),
                _ => {}
            }
        }
        QuotaStoreError::Database(err)
    }
}

#[async_trait]
impl<Q: PgQuotaTable> QuotaStore<Q> for PgQuotaStore<Q> {
    async fn get(&self, owner_id: Uuid) -> Result<Q, QuotaStoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1",
            Self::select_columns(),
            Q::TABLE,
            Q::OWNER_COLUMN
        );

        sqlx::query_as::<_, Q>(&sql)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(QuotaStoreError::NotFound { kind: Q::KIND, owner_id })
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<Q>, QuotaStoreError> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY created_at DESC, {} ASC LIMIT $1 OFFSET $2",
            Self::select_columns(),
            Q::TABLE,
            Q::OWNER_COLUMN
        );

        let rows = sqlx::query_as::<_, Q>(&sql)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn count(&self) -> Result<usize, QuotaStoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", Q::TABLE);
        let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok(count.max(0) as usize)
    }

    async fn create(&self, quota: Q) -> Result<Q, QuotaStoreError> {
        let owner_id = quota.owner_id();
        let now = Utc::now();
        let limit_count = Q::LIMIT_COLUMNS.len();
        let placeholders: Vec<String> = (0..limit_count + 3).map(|i| format!("${}", i + 1)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            Q::TABLE,
            Self::select_columns(),
            placeholders.join(", "),
            Self::select_columns()
        );

        let query = sqlx::query_as::<_, Q>(&sql).bind(owner_id);
        quota
            .bind_limits(query)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Self::classify(e, owner_id))
    }

    async fn update(&self, quota: Q) -> Result<Q, QuotaStoreError> {
        let owner_id = quota.owner_id();
        let assignments: Vec<String> = Q::LIMIT_COLUMNS
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ${}", column, i + 2))
            .collect();
        let sql = format!(
            "UPDATE {} SET {}, modified_at = ${} WHERE {} = $1 RETURNING {}",
            Q::TABLE,
            assignments.join(", "),
            Q::LIMIT_COLUMNS.len() + 2,
            Q::OWNER_COLUMN,
            Self::select_columns()
        );

        let query = sqlx::query_as::<_, Q>(&sql).bind(owner_id);
        quota
            .bind_limits(query)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::classify(e, owner_id))?
            .ok_or(QuotaStoreError::NotFound { kind: Q::KIND, owner_id })
    }

    async fn delete(&self, owner_id: Uuid) -> Result<(), QuotaStoreError> {
        let sql = format!("DELETE FROM {} WHERE {} = $1", Q::TABLE, Q::OWNER_COLUMN);
        let result = sqlx::query(&sql).bind(owner_id).execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(QuotaStoreError::NotFound { kind: Q::KIND, owner_id });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_columns_follow_table_layout() {
        assert_eq!(
            PgQuotaStore::<UserApiQuota>::select_columns(),
            "user_id, max_requests_per_minute, max_requests_per_hour, created_at, modified_at"
        );
        assert_eq!(
            PgQuotaStore::<AddonInvocationQuota>::select_columns(),
            "owner_id, max_active_invocations, max_invocations_per_hour, created_at, modified_at"
        );
    }
}
