// cache/keys.rs - Cache key layout and per-kind TTLs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const THREAT_MODEL_TTL: Duration = Duration::from_secs(10 * 60);
pub const DIAGRAM_TTL: Duration = Duration::from_secs(2 * 60);
pub const SUB_RESOURCE_TTL: Duration = Duration::from_secs(5 * 60);
pub const AUTH_TTL: Duration = Duration::from_secs(15 * 60);
pub const METADATA_TTL: Duration = Duration::from_secs(7 * 60);
pub const LIST_TTL: Duration = Duration::from_secs(5 * 60);

/// Kinds of cached entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    ThreatModel,
    Diagram,
    Threat,
    Document,
    Source,
    Note,
    Asset,
    Cell,
    Metadata,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::ThreatModel => "threat_model",
            EntityType::Diagram => "diagram",
            EntityType::Threat => "threat",
            EntityType::Document => "document",
            EntityType::Source => "source",
            EntityType::Note => "note",
            EntityType::Asset => "asset",
            EntityType::Cell => "cell",
            EntityType::Metadata => "metadata",
        }
    }

    /// Name used in list keys (`cache:list:{plural}:...`).
    pub fn plural(&self) -> &'static str {
        match self {
            EntityType::ThreatModel => "threat_models",
            EntityType::Diagram => "diagrams",
            EntityType::Threat => "threats",
            EntityType::Document => "documents",
            EntityType::Source => "sources",
            EntityType::Note => "notes",
            EntityType::Asset => "assets",
            EntityType::Cell => "cells",
            EntityType::Metadata => "metadata",
        }
    }

    /// Sources are stored under the repository prefix.
    fn key_prefix(&self) -> &'static str {
        match self {
            EntityType::Source => "repository",
            other => other.as_str(),
        }
    }

    pub fn ttl(&self) -> Duration {
        match self {
            EntityType::ThreatModel => THREAT_MODEL_TTL,
            EntityType::Diagram | EntityType::Cell => DIAGRAM_TTL,
            EntityType::Metadata => METADATA_TTL,
            _ => SUB_RESOURCE_TTL,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "threat_model" | "threat_models" => Ok(EntityType::ThreatModel),
            "diagram" | "diagrams" => Ok(EntityType::Diagram),
            "threat" | "threats" => Ok(EntityType::Threat),
            "document" | "documents" => Ok(EntityType::Document),
            "source" | "sources" | "repository" | "repositories" => Ok(EntityType::Source),
            "note" | "notes" => Ok(EntityType::Note),
            "asset" | "assets" => Ok(EntityType::Asset),
            "cell" | "cells" => Ok(EntityType::Cell),
            "metadata" => Ok(EntityType::Metadata),
            other => Err(format!("unknown entity type '{}'", other)),
        }
    }
}

pub fn entity_key(entity_type: EntityType, id: &str) -> String {
    format!("cache:{}:{}", entity_type.key_prefix(), id)
}

pub fn metadata_key(entity_type: EntityType, id: &str) -> String {
    format!("cache:metadata:{}:{}", entity_type.as_str(), id)
}

pub fn cells_key(diagram_id: &str) -> String {
    format!("cache:cells:{}", diagram_id)
}

pub fn auth_key(threat_model_id: &str) -> String {
    format!("cache:auth:{}", threat_model_id)
}

pub fn list_key(entity_type: EntityType, parent_id: &str, offset: usize, limit: usize) -> String {
    format!("cache:list:{}:{}:{}:{}", entity_type.plural(), parent_id, offset, limit)
}

/// Pattern matching every cached page of a child list.
pub fn list_pattern(entity_type: EntityType, parent_id: &str) -> String {
    format!("cache:list:{}:{}:*", entity_type.plural(), parent_id)
}

/// Metrics category of a key or pattern: `list`, `metadata`, `auth`, `cells`
/// or the entity type it holds.
pub fn category(key: &str) -> &'static str {
    let kind = key
        .strip_prefix("cache:")
        .and_then(|rest| rest.split(':').next())
        .unwrap_or("");
    match kind {
        "list" => "list",
        "metadata" => "metadata",
        "auth" => "auth",
        "cells" => "cells",
        other => other.parse::<EntityType>().map(|t| t.as_str()).unwrap_or("other"),
    }
}

/// Glob match supporting `*` only, as used by list patterns.
pub fn matches_pattern(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or("");
    let Some(mut rest) = key.strip_prefix(first) else {
        return false;
    };

    let remaining: Vec<&str> = parts.collect();
    if remaining.is_empty() {
        return rest.is_empty();
    }

    let last_index = remaining.len() - 1;
    for (i, part) in remaining.iter().enumerate() {
        if i == last_index {
            return rest.ends_with(part);
        }
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(entity_key(EntityType::ThreatModel, "tm1"), "cache:threat_model:tm1");
        assert_eq!(entity_key(EntityType::Source, "s1"), "cache:repository:s1");
        assert_eq!(metadata_key(EntityType::Threat, "t1"), "cache:metadata:threat:t1");
        assert_eq!(cells_key("d1"), "cache:cells:d1");
        assert_eq!(auth_key("tm1"), "cache:auth:tm1");
        assert_eq!(list_key(EntityType::Threat, "tm1", 0, 20), "cache:list:threats:tm1:0:20");
        assert_eq!(list_pattern(EntityType::Document, "tm1"), "cache:list:documents:tm1:*");
    }

    #[test]
    fn pattern_matching() {
        assert!(matches_pattern("cache:list:threats:tm1:*", "cache:list:threats:tm1:0:20"));
        assert!(!matches_pattern("cache:list:threats:tm1:*", "cache:list:threats:tm2:0:20"));
        assert!(matches_pattern("cache:*:tm1", "cache:auth:tm1"));
        assert!(matches_pattern("exact", "exact"));
        assert!(!matches_pattern("exact", "exactly"));
        assert!(matches_pattern("a*b*c", "a-x-b-y-c"));
        assert!(!matches_pattern("a*b*c", "a-x-c"));
    }

    #[test]
    fn key_categories() {
        assert_eq!(category("cache:threat:t1"), "threat");
        assert_eq!(category("cache:repository:s1"), "source");
        assert_eq!(category("cache:list:threats:tm1:0:20"), "list");
        assert_eq!(category("cache:list:threats:tm1:*"), "list");
        assert_eq!(category("cache:metadata:threat:t1"), "metadata");
        assert_eq!(category("ratelimit:api"), "other");
    }

    #[test]
    fn parse_entity_type() {
        assert_eq!("threats".parse::<EntityType>(), Ok(EntityType::Threat));
        assert_eq!("repository".parse::<EntityType>(), Ok(EntityType::Source));
        assert!("widgets".parse::<EntityType>().is_err());
    }
}
