// cache/invalidation.rs - Translate entity mutations into cache key removals

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::backend::CacheError;
use super::keys::{self, EntityType};
use super::service::CacheService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationStrategy {
    /// Clear before the write's response is returned.
    #[default]
    Immediately,
    /// Clear on a spawned task.
    Async,
    /// Delayed clearing; runs immediately until a delay queue exists.
    WithDelay,
}

/// "This entity changed."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationEvent {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub parent_type: Option<EntityType>,
    pub parent_id: Option<String>,
    pub operation: OperationType,
    #[serde(default)]
    pub strategy: InvalidationStrategy,
}

impl InvalidationEvent {
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>, operation: OperationType) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            parent_type: None,
            parent_id: None,
            operation,
            strategy: InvalidationStrategy::Immediately,
        }
    }

    pub fn with_parent(mut self, parent_type: EntityType, parent_id: impl Into<String>) -> Self {
        self.parent_type = Some(parent_type);
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_strategy(mut self, strategy: InvalidationStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Keys and patterns an event makes stale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    pub keys: Vec<String>,
    pub patterns: Vec<String>,
}

impl InvalidationPlan {
    fn key(&mut self, key: String) {
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }
    }

    fn pattern(&mut self, pattern: String) {
        if !self.patterns.contains(&pattern) {
            self.patterns.push(pattern);
        }
    }
}

/// Computes and clears the cache keys affected by a mutation.
#[derive(Clone)]
pub struct CacheInvalidator {
    cache: CacheService,
}

impl CacheInvalidator {
    pub fn new(cache: CacheService) -> Self {
        Self { cache }
    }

    /// Invalidate everything a sub-resource change can make stale: the entity,
    /// its metadata, the parent's child lists and the parent's aggregates.
    pub async fn invalidate_sub_resource_change(&self, event: &InvalidationEvent) -> Result<(), CacheError> {
        tracing::debug!(
            "Invalidating {} {} ({:?}, {:?})",
            event.entity_type,
            event.entity_id,
            event.operation,
            event.strategy
        );

        match event.strategy {
            InvalidationStrategy::Immediately | InvalidationStrategy::WithDelay => {
                self.execute(plan_for(event)).await
            }
            InvalidationStrategy::Async => {
                let invalidator = self.clone();
                let plan = plan_for(event);
                let label = format!("{} {}", event.entity_type, event.entity_id);
                tokio::spawn(async move {
                    if let Err(e) = invalidator.execute(plan).await {
                        tracing::error!("Async cache invalidation for {} failed: {}", label, e);
                    }
                });
                Ok(())
            }
        }
    }

    /// Handler entry point: bounded by `timeout`, failures are logged and swallowed.
    pub async fn invalidate_best_effort(&self, event: &InvalidationEvent, timeout: Duration) {
        match tokio::time::timeout(timeout, self.invalidate_sub_resource_change(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(
                    "Cache invalidation failed for {} {}: {}",
                    event.entity_type,
                    event.entity_id,
                    e
                );
            }
            Err(_) => {
                tracing::warn!(
                    "Cache invalidation for {} {} timed out after {:?}",
                    event.entity_type,
                    event.entity_id,
                    timeout
                );
            }
        }
    }

    /// Clear a threat model, its auth data, metadata and every child list.
    pub async fn invalidate_all_related_caches(&self, threat_model_id: &str) -> Result<(), CacheError> {
        let mut plan = InvalidationPlan::default();
        plan.key(keys::entity_key(EntityType::ThreatModel, threat_model_id));
        plan.key(keys::auth_key(threat_model_id));
        plan.key(keys::metadata_key(EntityType::ThreatModel, threat_model_id));
        for child in CHILD_LISTS {
            plan.pattern(keys::list_pattern(child, threat_model_id));
        }

        tracing::info!("Invalidating all caches related to threat model {}", threat_model_id);
        self.execute(plan).await
    }

    /// Permission changes only affect the auth entry and the threat model itself.
    pub async fn invalidate_permission_related_caches(&self, threat_model_id: &str) -> Result<(), CacheError> {
        let plan = InvalidationPlan {
            keys: vec![
                keys::auth_key(threat_model_id),
                keys::entity_key(EntityType::ThreatModel, threat_model_id),
            ],
            patterns: Vec::new(),
        };
        self.execute(plan).await
    }

    /// Apply every event, continuing past failures; returns the first error.
    pub async fn bulk_invalidate(&self, events: &[InvalidationEvent]) -> Result<(), CacheError> {
        let mut first_error = None;
        for event in events {
            if let Err(e) = self.invalidate_sub_resource_change(event).await {
                tracing::warn!(
                    "Bulk invalidation of {} {} failed: {}",
                    event.entity_type,
                    event.entity_id,
                    e
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn execute(&self, plan: InvalidationPlan) -> Result<(), CacheError> {
        let started = Instant::now();
        if !plan.keys.is_empty() {
            self.cache.invalidate_keys(&plan.keys).await?;
        }
        for pattern in &plan.patterns {
            self.cache.invalidate_pattern(pattern).await?;
        }
        self.cache.metrics().record_invalidation(started.elapsed());
        Ok(())
    }
}

const CHILD_LISTS: [EntityType; 6] = [
    EntityType::Threat,
    EntityType::Document,
    EntityType::Source,
    EntityType::Note,
    EntityType::Asset,
    EntityType::Diagram,
];

/// Pure key computation for an event.
pub fn plan_for(event: &InvalidationEvent) -> InvalidationPlan {
    let mut plan = InvalidationPlan::default();
    let id = event.entity_id.as_str();

    plan.key(keys::entity_key(event.entity_type, id));
    plan.key(keys::metadata_key(event.entity_type, id));

    let (Some(parent_type), Some(parent_id)) = (event.parent_type, event.parent_id.as_deref()) else {
        return plan;
    };

    match event.entity_type {
        EntityType::Threat => {
            plan.key(keys::entity_key(parent_type, parent_id));
            plan.key(keys::auth_key(parent_id));
            plan.pattern(keys::list_pattern(EntityType::Threat, parent_id));
        }
        EntityType::Document | EntityType::Source | EntityType::Note | EntityType::Asset => {
            plan.key(keys::entity_key(parent_type, parent_id));
            plan.pattern(keys::list_pattern(event.entity_type, parent_id));
        }
        EntityType::Diagram => {
            plan.key(keys::entity_key(parent_type, parent_id));
            plan.key(keys::cells_key(id));
            plan.pattern(keys::list_pattern(EntityType::Diagram, parent_id));
        }
        EntityType::Cell => {
            plan.key(keys::entity_key(EntityType::Diagram, parent_id));
            plan.key(keys::cells_key(parent_id));
        }
        EntityType::Metadata => {
            plan.key(keys::metadata_key(parent_type, parent_id));
            plan.key(keys::entity_key(parent_type, parent_id));
        }
        EntityType::ThreatModel => {
            plan.pattern(keys::list_pattern(EntityType::ThreatModel, parent_id));
        }
    }

    plan
}

/// Patterns and keys an event would touch, for diagnostics.
pub fn invalidation_patterns(
    entity_type: EntityType,
    entity_id: &str,
    parent_type: Option<EntityType>,
    parent_id: Option<&str>,
) -> Vec<String> {
    let mut event = InvalidationEvent::new(entity_type, entity_id, OperationType::Update);
    if let (Some(parent_type), Some(parent_id)) = (parent_type, parent_id) {
        event = event.with_parent(parent_type, parent_id);
    }
    let plan = plan_for(&event);
    plan.keys.into_iter().chain(plan.patterns).collect()
}
