// quota/validation.rs - Bounds checking over a normalized field list

use std::collections::BTreeMap;
use thiserror::Error;

/// One numeric limit to check: `min <= value <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaField {
    pub name: &'static str,
    pub value: i64,
    pub min: i64,
    pub max: i64,
}

impl QuotaField {
    pub const fn new(name: &'static str, value: i64, min: i64, max: i64) -> Self {
        Self { name, value, min, max }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid quota values: {}", describe(.field_errors))]
pub struct QuotaValidationError {
    pub field_errors: BTreeMap<String, String>,
}

fn describe(errors: &BTreeMap<String, String>) -> String {
    errors
        .iter()
        .map(|(field, msg)| format!("{} {}", field, msg))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Check a single value against its bounds.
pub fn validate_quota_value(value: i64, min: i64, max: i64) -> Result<(), String> {
    if value < min {
        return Err(format!("must be at least {}", min));
    }
    if value > max {
        return Err(format!("exceeds maximum allowed value of {}", max));
    }
    Ok(())
}

/// Check every field, collecting all violations.
pub fn validate_fields(fields: &[QuotaField]) -> Result<(), QuotaValidationError> {
    let field_errors: BTreeMap<String, String> = fields
        .iter()
        .filter_map(|field| {
            validate_quota_value(field.value, field.min, field.max)
                .err()
                .map(|msg| (field.name.to_string(), msg))
        })
        .collect();

    if field_errors.is_empty() {
        Ok(())
    } else {
        Err(QuotaValidationError { field_errors })
    }
}
