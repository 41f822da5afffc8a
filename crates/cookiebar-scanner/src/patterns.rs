//! Known tracker vendors and the patterns that identify them.

use once_cell::sync::Lazy;
use regex::Regex;

use cookiebar_core::CategoryKey;

/// A tracker vendor recognisable by cookie name, cookie domain or the
/// scripts it loads.
pub struct VendorPattern {
    pub vendor: &'static str,
    pub category: CategoryKey,
    pub name: Regex,
    pub domain: Option<Regex>,
    pub script: Option<Regex>,
    /// Cookies the vendor's script usually sets. `None` domain means the
    /// cookie is first-party (set on the scanned site).
    pub typical_cookies: &'static [(&'static str, Option<&'static str>)],
}

struct PatternDef {
    vendor: &'static str,
    category: CategoryKey,
    name: &'static str,
    domain: Option<&'static str>,
    script: Option<&'static str>,
    typical_cookies: &'static [(&'static str, Option<&'static str>)],
}

const PATTERN_DEFS: &[PatternDef] = &[
    PatternDef {
        vendor: "Google Analytics",
        category: CategoryKey::Analytics,
        name: r"^(_ga(_.+)?|_gid|_gat(_.+)?|__utm[abcztv])$",
        domain: Some(r"google-analytics\.com$"),
        script: Some(r"google-analytics\.com/(analytics|ga)\.js|googletagmanager\.com/gtag/js|gtag\(\s*'config'"),
        typical_cookies: &[("_ga", None), ("_gid", None)],
    },
    PatternDef {
        vendor: "Google Ads",
        category: CategoryKey::Marketing,
        name: r"^(_gcl_.+|IDE|DSID|test_cookie|__gads|__gpi)$",
        domain: Some(r"(doubleclick\.net|googleadservices\.com|googlesyndication\.com)$"),
        script: Some(r"googleadservices\.com|googlesyndication\.com|doubleclick\.net"),
        typical_cookies: &[("_gcl_au", None), ("IDE", Some(".doubleclick.net"))],
    },
    PatternDef {
        vendor: "Meta Pixel",
        category: CategoryKey::Marketing,
        name: r"^(_fbp|_fbc|fr)$",
        domain: Some(r"facebook\.(com|net)$"),
        script: Some(r"connect\.facebook\.net|fbq\(\s*'init'"),
        typical_cookies: &[("_fbp", None), ("fr", Some(".facebook.com"))],
    },
    PatternDef {
        vendor: "HubSpot",
        category: CategoryKey::Marketing,
        name: r"^(hubspotutk|__hs.+|messagesUtk)$",
        domain: Some(r"(hubspot\.com|hs-scripts\.com|hs-analytics\.net|hsforms\.com)$"),
        script: Some(r"js\.hs-scripts\.com|js\.hs-analytics\.net|_hsq\.push"),
        typical_cookies: &[
            ("hubspotutk", None),
            ("__hstc", None),
            ("__hssc", None),
            ("__hssrc", None),
        ],
    },
    PatternDef {
        vendor: "Matomo",
        category: CategoryKey::Analytics,
        name: r"^(_pk_(id|ses|ref|cvar|hsr)(\..+)?|MATOMO_SESSID|mtm_consent(_removed)?)$",
        domain: None,
        script: Some(r"matomo\.js|piwik\.js|_paq\.push"),
        typical_cookies: &[("_pk_id", None), ("_pk_ses", None)],
    },
    PatternDef {
        vendor: "Hotjar",
        category: CategoryKey::Analytics,
        name: r"^_hj.+$",
        domain: Some(r"hotjar\.com$"),
        script: Some(r"static\.hotjar\.com"),
        typical_cookies: &[("_hjSessionUser", None), ("_hjSession", None)],
    },
    PatternDef {
        vendor: "Microsoft Clarity",
        category: CategoryKey::Analytics,
        name: r"^(_clck|_clsk|CLID|MUID)$",
        domain: Some(r"clarity\.ms$"),
        script: Some(r"clarity\.ms/tag"),
        typical_cookies: &[("_clck", None), ("_clsk", None)],
    },
    PatternDef {
        vendor: "Microsoft Advertising",
        category: CategoryKey::Marketing,
        name: r"^_uet(sid|vid)$",
        domain: Some(r"bing\.com$"),
        script: Some(r"bat\.bing\.com"),
        typical_cookies: &[("_uetsid", None), ("_uetvid", None)],
    },
    PatternDef {
        vendor: "LinkedIn",
        category: CategoryKey::Marketing,
        name: r"^(li_.+|bcookie|bscookie|lidc|UserMatchHistory|AnalyticsSyncHistory)$",
        domain: Some(r"linkedin\.com$"),
        script: Some(r"snap\.licdn\.com"),
        typical_cookies: &[("li_fat_id", None), ("bcookie", Some(".linkedin.com"))],
    },
    PatternDef {
        vendor: "YouTube",
        category: CategoryKey::Marketing,
        name: r"^(VISITOR_INFO1_LIVE|YSC|PREF|VISITOR_PRIVACY_METADATA)$",
        domain: Some(r"youtube\.com$"),
        script: Some(r"youtube\.com/(embed|iframe_api)"),
        typical_cookies: &[("YSC", Some(".youtube.com")), ("VISITOR_INFO1_LIVE", Some(".youtube.com"))],
    },
    PatternDef {
        vendor: "Stripe",
        category: CategoryKey::Necessary,
        name: r"^__stripe_(mid|sid)$",
        domain: Some(r"stripe\.com$"),
        script: Some(r"js\.stripe\.com"),
        typical_cookies: &[("__stripe_mid", None), ("__stripe_sid", None)],
    },
    PatternDef {
        vendor: "WooCommerce",
        category: CategoryKey::Necessary,
        name: r"^(woocommerce_.+|wp_woocommerce_session_.+)$",
        domain: None,
        script: None,
        typical_cookies: &[],
    },
    PatternDef {
        vendor: "Cloudflare",
        category: CategoryKey::Necessary,
        name: r"^(__cf.+|cf_clearance|_cfuvid)$",
        domain: Some(r"cloudflare\.com$"),
        script: None,
        typical_cookies: &[],
    },
    PatternDef {
        vendor: "WPML",
        category: CategoryKey::Functional,
        name: r"^(wp-wpml_current_language|wpml_browser_redirect_test|_icl_.+)$",
        domain: None,
        script: None,
        typical_cookies: &[],
    },
    PatternDef {
        vendor: "Intercom",
        category: CategoryKey::Functional,
        name: r"^intercom-(id|session|device-id)-.+$",
        domain: Some(r"intercom\.io$"),
        script: Some(r"widget\.intercom\.io"),
        typical_cookies: &[],
    },
];

static VENDOR_PATTERNS: Lazy<Vec<VendorPattern>> = Lazy::new(|| {
    PATTERN_DEFS
        .iter()
        .map(|def| VendorPattern {
            vendor: def.vendor,
            category: def.category,
            name: Regex::new(def.name).unwrap(),
            domain: def.domain.map(|d| Regex::new(d).unwrap()),
            script: def.script.map(|s| Regex::new(s).unwrap()),
            typical_cookies: def.typical_cookies,
        })
        .collect()
});

/// All vendor patterns, in priority order.
pub fn vendor_patterns() -> &'static [VendorPattern] {
    &VENDOR_PATTERNS
}

/// Find the vendor a cookie belongs to: name patterns first, then domain.
pub fn match_vendor(name: &str, domain: &str) -> Option<&'static VendorPattern> {
    let patterns = vendor_patterns();
    patterns
        .iter()
        .find(|p| p.name.is_match(name))
        .or_else(|| {
            let domain = domain.trim_start_matches('.');
            patterns
                .iter()
                .find(|p| p.domain.as_ref().is_some_and(|d| d.is_match(domain)))
        })
}

/// Vendors whose loader script appears in `script` (a `src` URL or inline code).
pub fn match_script(script: &str) -> Vec<&'static VendorPattern> {
    vendor_patterns()
        .iter()
        .filter(|p| p.script.as_ref().is_some_and(|re| re.is_match(script)))
        .collect()
}
