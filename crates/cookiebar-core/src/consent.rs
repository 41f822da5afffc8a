//! Consent records: one logged decision per consent action.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::categories::CategoryKey;

/// A persisted consent decision. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub ip_address: String,
    pub user_id: Option<i64>,
    /// Stored exactly as submitted.
    pub consent_data: serde_json::Value,
}

impl ConsentRecord {
    /// Typed view of `consent_data`, if it has the expected shape.
    pub fn data(&self) -> Option<ConsentData> {
        serde_json::from_value(self.consent_data.clone()).ok()
    }

    /// Category keys the visitor granted, in submission order.
    pub fn granted_categories(&self) -> Vec<String> {
        granted_keys(&self.consent_data)
    }
}

/// The conventional shape of `consent_data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsentData {
    #[serde(default)]
    pub categories: BTreeMap<CategoryKey, bool>,
    #[serde(default)]
    pub consent_source: String,
}

impl ConsentData {
    /// Whether the visitor allowed `key`. Required categories are always allowed.
    pub fn allows(&self, key: CategoryKey) -> bool {
        key.is_required() || self.categories.get(&key).copied().unwrap_or(false)
    }
}

/// Keys of `consent_data.categories` whose value is `true`.
///
/// Reads the raw JSON so keys keep the order they were submitted in and
/// categories outside the built-in set still show up.
pub fn granted_keys(consent_data: &serde_json::Value) -> Vec<String> {
    consent_data
        .get("categories")
        .and_then(|c| c.as_object())
        .map(|map| {
            map.iter()
                .filter(|(_, v)| v.as_bool().unwrap_or(false))
                .map(|(k, _)| k.clone())
                .collect()
        })
        .unwrap_or_default()
}
