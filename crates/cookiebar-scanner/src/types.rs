//! Scanner data types and the per-cookie state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cookiebar_core::{CategoryKey, Error, Result};

/// A cookie seen on the site during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CookieObservation {
    pub name: String,
    pub domain: String,
}

impl CookieObservation {
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
        }
    }
}

/// Where a cookie's category came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CookieSource {
    Admin,
    Registry,
    Ocd,
    Pattern,
    None,
}

/// A cookie found by a scan, with its (possibly absent) category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedCookie {
    pub name: String,
    pub domain: String,
    pub category: Option<CategoryKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub source: CookieSource,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl DetectedCookie {
    pub fn state(&self) -> CookieState {
        match self.category {
            Some(category) => CookieState::Categorized(category),
            None => CookieState::Uncategorized,
        }
    }
}

/// Lifecycle of a single cookie within the scanner.
///
/// `Unseen -> Detected -> {Categorized | Uncategorized}`. Each scan cycle
/// starts over at `Detected`; an admin may re-label a cookie in either
/// settled state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "category", rename_all = "lowercase")]
pub enum CookieState {
    Unseen,
    Detected,
    Categorized(CategoryKey),
    Uncategorized,
}

/// Inputs driving `CookieState` transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieEvent {
    /// The cookie was observed by a scan.
    Observe,
    /// Automatic classification finished.
    Classify(Option<CategoryKey>),
    /// An admin assigned a category.
    Relabel(CategoryKey),
}

impl CookieState {
    pub fn apply(self, event: CookieEvent) -> Result<CookieState> {
        use CookieEvent::*;
        use CookieState::*;

        match (self, event) {
            (_, Observe) => Ok(Detected),
            (Detected, Classify(Some(category))) => Ok(Categorized(category)),
            (Detected, Classify(None)) => Ok(Uncategorized),
            (Categorized(_) | Uncategorized, Relabel(category)) => Ok(Categorized(category)),
            (state, event) => Err(Error::Scan(format!(
                "invalid cookie transition: {:?} on {:?}",
                event, state
            ))),
        }
    }

    pub fn category(&self) -> Option<CategoryKey> {
        match self {
            Self::Categorized(category) => Some(*category),
            _ => None,
        }
    }
}

/// Summary of one scan run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub scan_id: String,
    pub scanned_at: DateTime<Utc>,
    pub cookies: Vec<DetectedCookie>,
    pub total: usize,
    pub categorized: usize,
    pub uncategorized: usize,
    pub new_cookies: usize,
}

/// Outcome of a bulk categorization request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkCategorizeResult {
    pub updated: usize,
    pub not_found: Vec<String>,
}
