// quota/memory.rs - In-process quota store

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use super::store::{QuotaStore, QuotaStoreError};
use super::types::QuotaRecord;

/// Map-backed store for tests and single-node development.
pub struct InMemoryQuotaStore<Q> {
    records: RwLock<HashMap<Uuid, Q>>,
}

impl<Q> Default for InMemoryQuotaStore<Q> {
    fn default() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl<Q: QuotaRecord> InMemoryQuotaStore<Q> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<Q: QuotaRecord> QuotaStore<Q> for InMemoryQuotaStore<Q> {
    async fn get(&self, owner_id: Uuid) -> Result<Q, QuotaStoreError> {
        self.records
            .read()
            .get(&owner_id)
            .cloned()
            .ok_or(QuotaStoreError::NotFound { kind: Q::KIND, owner_id })
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<Q>, QuotaStoreError> {
        let mut records: Vec<Q> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| a.owner_id().cmp(&b.owner_id()))
        });
        Ok(records.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self) -> Result<usize, QuotaStoreError> {
        Ok(self.records.read().len())
    }

    async fn create(&self, mut quota: Q) -> Result<Q, QuotaStoreError> {
        let owner_id = quota.owner_id();
        let mut records = self.records.write();
        if records.contains_key(&owner_id) {
            return Err(QuotaStoreError::AlreadyExists { kind: Q::KIND, owner_id });
        }

        let now = Utc::now();
        quota.set_timestamps(now, now);
        records.insert(owner_id, quota.clone());
        Ok(quota)
    }

    async fn update(&self, mut quota: Q) -> Result<Q, QuotaStoreError> {
        let owner_id = quota.owner_id();
        let mut records = self.records.write();
        let Some(existing) = records.get(&owner_id) else {
            return Err(QuotaStoreError::NotFound { kind: Q::KIND, owner_id });
        };

        quota.set_timestamps(existing.created_at(), Utc::now());
        records.insert(owner_id, quota.clone());
        Ok(quota)
    }

    async fn delete(&self, owner_id: Uuid) -> Result<(), QuotaStoreError> {
        match self.records.write().remove(&owner_id) {
            Some(_) => Ok(()),
            None => Err(QuotaStoreError::NotFound { kind: Q::KIND, owner_id }),
        }
    }
}
