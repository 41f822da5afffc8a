//! Scan and Open Cookie Database refresh, shared by AJAX actions and hooks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use cookiebar_core::{Error, Result};
use cookiebar_scanner::{fetch_site_cookies, scan, CookieObservation, OpenCookieDatabase};
use cookiebar_store::schema::{LAST_SCAN_OPTION, OCD_OPTION};

use crate::state::AppContext;

/// Persisted record of the most recent scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastScan {
    pub scan_id: String,
    pub scanned_at: DateTime<Utc>,
    pub pages_scanned: usize,
    pub errors: Vec<String>,
}

/// What `scan_now` reports back.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub scan_id: String,
    pub scanned_at: DateTime<Utc>,
    pub total: usize,
    pub categorized: usize,
    pub uncategorized: usize,
    pub new_cookies: usize,
    pub pages_scanned: usize,
    pub errors: Vec<String>,
}

/// Run one scan and persist the results.
///
/// With `snapshot`, the given cookies are classified as-is (e.g. cookies
/// captured during an authenticated browsing session); otherwise the
/// configured site pages are fetched. Fails if another scan is running.
pub async fn run_scan(
    ctx: &Arc<AppContext>,
    snapshot: Option<Vec<CookieObservation>>,
) -> Result<ScanSummary> {
    let Some(_guard) = ctx.try_begin_scan() else {
        return Err(Error::Scan("a scan is already running".into()));
    };

    let (observations, pages_scanned, errors) = match snapshot {
        Some(cookies) => (cookies, 0, Vec::new()),
        None => {
            let settings = ctx.settings();
            let fetched =
                fetch_site_cookies(&ctx.http, &settings.site_url, &settings.scan_paths).await?;
            (fetched.observations, fetched.pages_scanned, fetched.errors)
        }
    };

    let report = ctx.update_detected_cookies(|cookies| {
        let report = {
            let ocd = ctx.ocd.read();
            scan(&observations, cookies, &ocd)
        };
        cookies.clone_from(&report.cookies);
        report
    })?;
    ctx.store.update_option(
        LAST_SCAN_OPTION,
        &LastScan {
            scan_id: report.scan_id.clone(),
            scanned_at: report.scanned_at,
            pages_scanned,
            errors: errors.clone(),
        },
    )?;

    Ok(ScanSummary {
        scan_id: report.scan_id,
        scanned_at: report.scanned_at,
        total: report.total,
        categorized: report.categorized,
        uncategorized: report.uncategorized,
        new_cookies: report.new_cookies,
        pages_scanned,
        errors,
    })
}

/// Outcome of an Open Cookie Database refresh.
#[derive(Debug, Clone, Serialize)]
pub struct OcdUpdate {
    /// False when the downloaded file matches the one in use.
    pub updated: bool,
    pub entries: usize,
    pub hash: String,
    pub fetched_at: DateTime<Utc>,
}

/// Download the configured Open Cookie Database and switch to it.
/// On failure the database in use is left untouched.
pub async fn force_ocd_update(ctx: &Arc<AppContext>) -> Result<OcdUpdate> {
    let url = ctx.settings().ocd_url;
    let (db, stored) = match OpenCookieDatabase::download(&ctx.http, &url).await {
        Ok(res) => res,
        Err(e) => {
            warn!("Open Cookie Database refresh failed, keeping current copy: {}", e);
            return Err(e);
        }
    };

    let updated = ctx.ocd.read().hash() != db.hash();
    ctx.store.update_option(OCD_OPTION, &stored)?;
    let result = OcdUpdate {
        updated,
        entries: db.len(),
        hash: db.hash().to_string(),
        fetched_at: stored.fetched_at,
    };
    *ctx.ocd.write() = db;
    info!(
        "Open Cookie Database refreshed: {} entries, updated={}",
        result.entries, result.updated
    );
    Ok(result)
}
