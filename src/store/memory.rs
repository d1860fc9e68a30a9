// store/memory.rs - In-memory sub-resource store

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

use super::{strip_managed_fields, SubResource, SubResourceError, SubResourceKind, SubResourceStore};

type Collection = (SubResourceKind, Uuid);

#[derive(Default)]
pub struct InMemorySubResourceStore {
    collections: RwLock<HashMap<Collection, Vec<SubResource>>>,
}

impl InMemorySubResourceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(kind: SubResourceKind, threat_model_id: Uuid, id: Uuid) -> SubResourceError {
    SubResourceError::NotFound {
        kind,
        threat_model_id,
        id,
    }
}

#[async_trait]
impl SubResourceStore for InMemorySubResourceStore {
    async fn get(&self, kind: SubResourceKind, threat_model_id: Uuid, id: Uuid) -> Result<SubResource, SubResourceError> {
        self.collections
            .read()
            .get(&(kind, threat_model_id))
            .and_then(|items| items.iter().find(|item| item.id == id))
            .cloned()
            .ok_or_else(|| not_found(kind, threat_model_id, id))
    }

    async fn list(
        &self,
        kind: SubResourceKind,
        threat_model_id: Uuid,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<SubResource>, SubResourceError> {
        Ok(self
            .collections
            .read()
            .get(&(kind, threat_model_id))
            .map(|items| items.iter().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn count(&self, kind: SubResourceKind, threat_model_id: Uuid) -> Result<usize, SubResourceError> {
        Ok(self
            .collections
            .read()
            .get(&(kind, threat_model_id))
            .map(Vec::len)
            .unwrap_or(0))
    }

    async fn create(
        &self,
        kind: SubResourceKind,
        threat_model_id: Uuid,
        data: Map<String, Value>,
    ) -> Result<SubResource, SubResourceError> {
        let now = Utc::now();
        let item = SubResource {
            id: Uuid::new_v4(),
            threat_model_id,
            created_at: now,
            modified_at: now,
            data: strip_managed_fields(data),
        };
        self.collections
            .write()
            .entry((kind, threat_model_id))
            .or_default()
            .push(item.clone());
        Ok(item)
    }

    async fn update(
        &self,
        kind: SubResourceKind,
        threat_model_id: Uuid,
        id: Uuid,
        data: Map<String, Value>,
    ) -> Result<SubResource, SubResourceError> {
        let mut collections = self.collections.write();
        let item = collections
            .get_mut(&(kind, threat_model_id))
            .and_then(|items| items.iter_mut().find(|item| item.id == id))
            .ok_or_else(|| not_found(kind, threat_model_id, id))?;

        item.data = strip_managed_fields(data);
        item.modified_at = Utc::now();
        Ok(item.clone())
    }

    async fn delete(&self, kind: SubResourceKind, threat_model_id: Uuid, id: Uuid) -> Result<(), SubResourceError> {
        let mut collections = self.collections.write();
        let items = collections
            .get_mut(&(kind, threat_model_id))
            .ok_or_else(|| not_found(kind, threat_model_id, id))?;
        let before = items.len();
        items.retain(|item| item.id != id);
        if items.len() == before {
            return Err(not_found(kind, threat_model_id, id));
        }
        Ok(())
    }
}
