// store/mod.rs - Threat model sub-resource persistence

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::cache::EntityType;

pub use memory::InMemorySubResourceStore;

/// Child collections of a threat model addressable by URL segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubResourceKind {
    Threats,
    Documents,
    Sources,
    Notes,
    Assets,
}

impl SubResourceKind {
    pub const ALL: [SubResourceKind; 5] = [
        SubResourceKind::Threats,
        SubResourceKind::Documents,
        SubResourceKind::Sources,
        SubResourceKind::Notes,
        SubResourceKind::Assets,
    ];

    pub fn as_str(&self) -> &'static str {
        self.entity_type().plural()
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            SubResourceKind::Threats => EntityType::Threat,
            SubResourceKind::Documents => EntityType::Document,
            SubResourceKind::Sources => EntityType::Source,
            SubResourceKind::Notes => EntityType::Note,
            SubResourceKind::Assets => EntityType::Asset,
        }
    }
}

impl fmt::Display for SubResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown sub-resource collection '{}'", s))
    }
}

/// A stored child document. Client fields are kept verbatim next to the
/// server-managed ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubResource {
    pub id: Uuid,
    pub threat_model_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

#[derive(Debug, Error)]
pub enum SubResourceError {
    #[error("{kind} {id} not found in threat model {threat_model_id}")]
    NotFound {
        kind: SubResourceKind,
        threat_model_id: Uuid,
        id: Uuid,
    },
}

#[async_trait]
pub trait SubResourceStore: Send + Sync {
    async fn get(&self, kind: SubResourceKind, threat_model_id: Uuid, id: Uuid) -> Result<SubResource, SubResourceError>;

    /// Oldest first.
    async fn list(
        &self,
        kind: SubResourceKind,
        threat_model_id: Uuid,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<SubResource>, SubResourceError>;

    async fn count(&self, kind: SubResourceKind, threat_model_id: Uuid) -> Result<usize, SubResourceError>;

    async fn create(
        &self,
        kind: SubResourceKind,
        threat_model_id: Uuid,
        data: Map<String, Value>,
    ) -> Result<SubResource, SubResourceError>;

    /// Replace the client fields, keeping id and `created_at`.
    async fn update(
        &self,
        kind: SubResourceKind,
        threat_model_id: Uuid,
        id: Uuid,
        data: Map<String, Value>,
    ) -> Result<SubResource, SubResourceError>;

    async fn delete(&self, kind: SubResourceKind, threat_model_id: Uuid, id: Uuid) -> Result<(), SubResourceError>;
}

/// Drop client attempts to set server-managed fields.
pub(crate) fn strip_managed_fields(mut data: Map<String, Value>) -> Map<String, Value> {
    for field in ["id", "threat_model_id", "created_at", "modified_at"] {
        data.remove(field);
    }
    data
}
