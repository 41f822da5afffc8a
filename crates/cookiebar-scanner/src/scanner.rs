//! Cookie classification and scan bookkeeping.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info};

use crate::ocd::OpenCookieDatabase;
use crate::patterns::match_vendor;
use crate::types::*;
use cookiebar_core::categories::find_known_cookie;
use cookiebar_core::CategoryKey;

/// Result of classifying a single cookie.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub category: Option<CategoryKey>,
    pub source: CookieSource,
    pub vendor: Option<String>,
    pub description: Option<String>,
}

/// Classify a cookie. `previous` is the same cookie from an earlier scan,
/// whose admin label wins over every automatic source.
pub fn classify(
    observation: &CookieObservation,
    previous: Option<&DetectedCookie>,
    ocd: &OpenCookieDatabase,
) -> Classification {
    if let Some(prev) = previous.filter(|p| p.source == CookieSource::Admin) {
        return Classification {
            category: prev.category,
            source: CookieSource::Admin,
            vendor: prev.vendor.clone(),
            description: prev.description.clone(),
        };
    }

    let ocd_entry = ocd.lookup(&observation.name);
    let vendor = match_vendor(&observation.name, &observation.domain);
    let vendor_name = ocd_entry
        .map(|e| e.platform.clone())
        .or_else(|| vendor.map(|v| v.vendor.to_string()));
    let description = ocd_entry
        .map(|e| e.description.clone())
        .filter(|d| !d.is_empty());

    if let Some(category) = find_known_cookie(&observation.name) {
        return Classification {
            category: Some(category),
            source: CookieSource::Registry,
            vendor: vendor_name,
            description,
        };
    }
    if let Some(category) = ocd_entry.and_then(|e| e.category_key()) {
        return Classification {
            category: Some(category),
            source: CookieSource::Ocd,
            vendor: vendor_name,
            description,
        };
    }
    if let Some(v) = vendor {
        return Classification {
            category: Some(v.category),
            source: CookieSource::Pattern,
            vendor: vendor_name,
            description,
        };
    }
    Classification {
        category: None,
        source: CookieSource::None,
        vendor: vendor_name,
        description,
    }
}

/// Run one scan cycle over `observations`.
///
/// Observations are deduplicated by (name, domain). Cookies from `previous`
/// that were not seen this time are kept unchanged so admin labels survive.
/// The result is sorted by name, then domain.
pub fn scan(
    observations: &[CookieObservation],
    previous: &[DetectedCookie],
    ocd: &OpenCookieDatabase,
) -> ScanReport {
    let now = Utc::now();
    let mut by_key: HashMap<(String, String), DetectedCookie> = previous
        .iter()
        .map(|c| ((c.name.clone(), c.domain.clone()), c.clone()))
        .collect();
    let mut new_cookies = 0usize;
    let mut seen = std::collections::HashSet::new();

    for obs in observations {
        let key = (obs.name.clone(), obs.domain.clone());
        if !seen.insert(key.clone()) {
            continue;
        }

        let prev = by_key.get(&key);
        // Every observed cookie goes through the full lifecycle; these
        // transitions cannot fail from the states used here.
        let detected = CookieState::Unseen
            .apply(CookieEvent::Observe)
            .unwrap_or(CookieState::Detected);
        let classification = classify(obs, prev, ocd);
        let state = detected
            .apply(CookieEvent::Classify(classification.category))
            .unwrap_or(CookieState::Uncategorized);

        let first_seen = match prev {
            Some(p) => p.first_seen,
            None => {
                new_cookies += 1;
                now
            }
        };
        debug!("Scanned cookie {} on {}: {:?}", obs.name, obs.domain, state);

        by_key.insert(
            key,
            DetectedCookie {
                name: obs.name.clone(),
                domain: obs.domain.clone(),
                category: state.category(),
                vendor: classification.vendor,
                description: classification.description,
                source: classification.source,
                first_seen,
                last_seen: now,
            },
        );
    }

    let mut cookies: Vec<DetectedCookie> = by_key.into_values().collect();
    cookies.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.domain.cmp(&b.domain)));

    let categorized = cookies.iter().filter(|c| c.category.is_some()).count();
    let report = ScanReport {
        scan_id: uuid::Uuid::new_v4().to_string(),
        scanned_at: now,
        total: cookies.len(),
        categorized,
        uncategorized: cookies.len() - categorized,
        new_cookies,
        cookies,
    };
    info!(
        "Scan {}: {} cookies ({} categorized, {} uncategorized, {} new)",
        report.scan_id, report.total, report.categorized, report.uncategorized, report.new_cookies
    );
    report
}

/// Assign `category` to every detected cookie named `name`. Returns false
/// when no such cookie exists.
pub fn categorize(cookies: &mut [DetectedCookie], name: &str, category: CategoryKey) -> bool {
    let mut found = false;
    for cookie in cookies.iter_mut().filter(|c| c.name == name) {
        if let Ok(state) = cookie.state().apply(CookieEvent::Relabel(category)) {
            cookie.category = state.category();
            cookie.source = CookieSource::Admin;
            found = true;
        }
    }
    found
}

/// Apply several admin labels at once.
pub fn bulk_categorize(
    cookies: &mut [DetectedCookie],
    labels: &[(String, CategoryKey)],
) -> BulkCategorizeResult {
    let mut result = BulkCategorizeResult::default();
    for (name, category) in labels {
        if categorize(cookies, name, *category) {
            result.updated += 1;
        } else {
            result.not_found.push(name.clone());
        }
    }
    result
}
