// quota/store.rs - Quota persistence contract

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::types::QuotaRecord;

#[derive(Debug, Error)]
pub enum QuotaStoreError {
    #[error("{kind} not found for owner {owner_id}")]
    NotFound { kind: &'static str, owner_id: Uuid },

    #[error("{kind} already exists for owner {owner_id}")]
    AlreadyExists { kind: &'static str, owner_id: Uuid },

    /// The owner does not exist (foreign-key violation).
    #[error("owner {0} does not exist")]
    UnknownOwner(Uuid),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl QuotaStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, QuotaStoreError::NotFound { .. })
    }
}

/// Source of truth for one quota kind.
///
/// `get_or_default` never writes: an absent owner gets a computed default
/// that stays unpersisted until an administrator sets a value.
#[async_trait]
pub trait QuotaStore<Q: QuotaRecord>: Send + Sync {
    async fn get(&self, owner_id: Uuid) -> Result<Q, QuotaStoreError>;

    async fn get_or_default(&self, owner_id: Uuid) -> Q {
        match self.get(owner_id).await {
            Ok(quota) => quota,
            Err(QuotaStoreError::NotFound { .. }) => Q::default_for(owner_id),
            Err(e) => {
                tracing::error!("Failed to load {} for {}, using default: {}", Q::KIND, owner_id, e);
                Q::default_for(owner_id)
            }
        }
    }

    /// Page of records, newest first.
    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<Q>, QuotaStoreError>;

    async fn count(&self) -> Result<usize, QuotaStoreError>;

    async fn create(&self, quota: Q) -> Result<Q, QuotaStoreError>;

    /// Replace limits, keeping the original creation time.
    async fn update(&self, quota: Q) -> Result<Q, QuotaStoreError>;

    async fn delete(&self, owner_id: Uuid) -> Result<(), QuotaStoreError>;
}
