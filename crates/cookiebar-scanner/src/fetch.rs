//! Page fetcher: collects cookies a site sets while browsing its pages.
//!
//! Two signals are gathered per page: `Set-Cookie` response headers, and
//! tracker scripts referenced in the HTML (whose cookies are only set
//! client-side and never reach the server's response headers).

use reqwest::header::SET_COOKIE;
use scraper::{Html, Selector};
use serde::Serialize;
use tracing::{info, warn};

use crate::patterns::{match_script, VendorPattern};
use crate::types::CookieObservation;
use cookiebar_core::{Error, Result};

/// Cookies gathered from a set of pages.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchResult {
    pub observations: Vec<CookieObservation>,
    pub pages_scanned: usize,
    pub errors: Vec<String>,
}

/// Fetch each `site_url + path` and collect the cookies they set.
///
/// Individual page failures are recorded in `errors`; the call fails only
/// when no page could be fetched at all.
pub async fn fetch_site_cookies(
    client: &reqwest::Client,
    site_url: &str,
    paths: &[String],
) -> Result<FetchResult> {
    let base = site_url.trim_end_matches('/');
    let mut result = FetchResult::default();

    for path in paths {
        let url = format!("{}{}", base, path);
        let response = match client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Scan fetch failed for {}: {}", url, e);
                result.errors.push(format!("{}: {}", url, e));
                continue;
            }
        };

        let host = response.url().host_str().unwrap_or_default().to_string();
        for header in response.headers().get_all(SET_COOKIE) {
            if let Some(obs) = header.to_str().ok().and_then(|h| parse_set_cookie(h, &host)) {
                result.observations.push(obs);
            }
        }

        match response.text().await {
            Ok(body) => {
                for vendor in detect_vendor_scripts(&body) {
                    for (name, domain) in vendor.typical_cookies {
                        let domain = domain.map(str::to_string).unwrap_or_else(|| host.clone());
                        result.observations.push(CookieObservation::new(*name, domain));
                    }
                }
            }
            Err(e) => result.errors.push(format!("{}: {}", url, e)),
        }
        result.pages_scanned += 1;
    }

    if result.pages_scanned == 0 && !paths.is_empty() {
        return Err(Error::Scan(format!(
            "no page of {} could be fetched: {}",
            base,
            result.errors.join("; ")
        )));
    }

    info!(
        "Fetched {} pages of {}: {} cookie observations",
        result.pages_scanned,
        base,
        result.observations.len()
    );
    Ok(result)
}

/// Parse one `Set-Cookie` header. The cookie's domain is its `Domain`
/// attribute, or `default_domain` when absent.
pub fn parse_set_cookie(header: &str, default_domain: &str) -> Option<CookieObservation> {
    let mut parts = header.split(';');
    let (name, _value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let domain = parts
        .filter_map(|attr| attr.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("domain"))
        .map(|(_, v)| v.trim().to_string())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| default_domain.to_string());

    Some(CookieObservation::new(name, domain))
}

/// Vendors whose scripts the page loads, by `src` or inline code.
pub fn detect_vendor_scripts(html: &str) -> Vec<&'static VendorPattern> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("script") else {
        return Vec::new();
    };

    let mut vendors: Vec<&'static VendorPattern> = Vec::new();
    for script in document.select(&selector) {
        let mut candidates = Vec::new();
        if let Some(src) = script.value().attr("src") {
            candidates.extend(match_script(src));
        }
        let inline: String = script.text().collect();
        if !inline.trim().is_empty() {
            candidates.extend(match_script(&inline));
        }
        for vendor in candidates {
            if !vendors.iter().any(|v| std::ptr::eq(*v, vendor)) {
                vendors.push(vendor);
            }
        }
    }
    vendors
}
