//! Consent integrations for Google Consent Mode, HubSpot and Matomo.
//!
//! Each integration needs a snippet in the page head that puts the vendor
//! into a "no consent yet" state before its own tag loads. The banner's
//! front-end script later flips the signals once the visitor chooses.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde_json::json;

use cookiebar_core::{CategoryKey, PluginSettings};

pub const GRANTED: &str = "granted";
pub const DENIED: &str = "denied";

/// Google Consent Mode signals fed by each consent category.
const CONSENT_MODE_SIGNALS: &[(&str, Option<CategoryKey>)] = &[
    ("ad_personalization", Some(CategoryKey::Marketing)),
    ("ad_storage", Some(CategoryKey::Marketing)),
    ("ad_user_data", Some(CategoryKey::Marketing)),
    ("analytics_storage", Some(CategoryKey::Analytics)),
    ("functionality_storage", Some(CategoryKey::Functional)),
    ("personalization_storage", Some(CategoryKey::Functional)),
    ("security_storage", None),
];

/// Map a visitor's category choices onto Google Consent Mode signals.
/// `security_storage` is always granted.
pub fn consent_mode_signals(
    choices: &BTreeMap<CategoryKey, bool>,
) -> BTreeMap<&'static str, &'static str> {
    CONSENT_MODE_SIGNALS
        .iter()
        .map(|&(signal, category)| {
            let granted = match category {
                None => true,
                Some(key) => key.is_required() || choices.get(&key).copied().unwrap_or(false),
            };
            (signal, if granted { GRANTED } else { DENIED })
        })
        .collect()
}

/// Head snippets for every enabled integration. Empty when none are enabled.
pub fn render_head_scripts(settings: &PluginSettings) -> String {
    let mut out = String::new();
    if settings.gcm_enabled {
        out.push_str(&google_consent_mode_default(settings));
    }
    if settings.hubspot_enabled && !settings.hubspot_portal_id.is_empty() {
        out.push_str(&hubspot_snippet(settings));
    }
    if settings.matomo_enabled && !settings.matomo_url.is_empty() {
        out.push_str(&matomo_snippet(settings));
    }
    out
}

fn google_consent_mode_default(settings: &PluginSettings) -> String {
    let mut defaults = serde_json::Map::new();
    for (signal, state) in consent_mode_signals(&BTreeMap::new()) {
        defaults.insert(signal.to_string(), json!(state));
    }
    defaults.insert("wait_for_update".into(), json!(settings.gcm_wait_for_update));

    let mut script = String::from(
        "<script data-cookiebar=\"google-consent-mode\">\
         window.dataLayer = window.dataLayer || [];\
         function gtag(){dataLayer.push(arguments);}",
    );
    let _ = write!(
        script,
        "gtag('consent', 'default', {});",
        serde_json::Value::Object(defaults)
    );
    if settings.gcm_ads_data_redaction {
        script.push_str("gtag('set', 'ads_data_redaction', true);");
    }
    if settings.gcm_url_passthrough {
        script.push_str("gtag('set', 'url_passthrough', true);");
    }
    script.push_str("</script>");
    script
}

fn hubspot_snippet(settings: &PluginSettings) -> String {
    // Portal IDs are validated numeric on save.
    format!(
        "<script data-cookiebar=\"hubspot\">\
         var _hsp = window._hsp = window._hsp || [];\
         _hsp.push(['setHubSpotConsentSettings', {{ portalId: {portal} }}]);\
         var _hsq = window._hsq = window._hsq || [];\
         _hsq.push(['doNotTrack', {{ track: false }}]);\
         </script>",
        portal = settings.hubspot_portal_id,
    )
}

fn matomo_snippet(settings: &PluginSettings) -> String {
    let require = if settings.matomo_require_cookie_consent {
        "requireCookieConsent"
    } else {
        "requireConsent"
    };
    let url = format!("{}/", settings.matomo_url.trim_end_matches('/'));
    format!(
        "<script data-cookiebar=\"matomo\">\
         var _paq = window._paq = window._paq || [];\
         _paq.push(['{require}']);\
         _paq.push(['setTrackerUrl', {tracker}]);\
         _paq.push(['setSiteId', {site}]);\
         </script>",
        tracker = script_json(&json!(format!("{}matomo.php", url))),
        site = script_json(&json!(settings.matomo_site_id)),
    )
}

/// JSON literal safe to embed inside a `<script>` element.
fn script_json(value: &serde_json::Value) -> String {
    value.to_string().replace("</", "<\\/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signals_default_denied_except_security() {
        let signals = consent_mode_signals(&BTreeMap::new());
        assert_eq!(signals["security_storage"], GRANTED);
        assert_eq!(signals["analytics_storage"], DENIED);
        assert_eq!(signals["ad_storage"], DENIED);
        assert_eq!(signals.len(), 7);
    }

    #[test]
    fn test_signals_follow_choices() {
        let choices = BTreeMap::from([
            (CategoryKey::Analytics, true),
            (CategoryKey::Marketing, false),
            (CategoryKey::Functional, true),
        ]);
        let signals = consent_mode_signals(&choices);
        assert_eq!(signals["analytics_storage"], GRANTED);
        assert_eq!(signals["ad_user_data"], DENIED);
        assert_eq!(signals["personalization_storage"], GRANTED);
    }

    #[test]
    fn test_no_scripts_when_disabled() {
        assert!(render_head_scripts(&PluginSettings::default()).is_empty());
    }

    #[test]
    fn test_gcm_default_script() {
        let settings = PluginSettings {
            gcm_enabled: true,
            gcm_wait_for_update: 750,
            gcm_url_passthrough: true,
            ..Default::default()
        };
        let html = render_head_scripts(&settings);
        assert!(html.contains("gtag('consent', 'default'"));
        assert!(html.contains(r#""analytics_storage":"denied""#));
        assert!(html.contains(r#""wait_for_update":750"#));
        assert!(html.contains("url_passthrough"));
        assert!(!html.contains("ads_data_redaction"));
    }

    #[test]
    fn test_hubspot_and_matomo_scripts() {
        let settings = PluginSettings {
            hubspot_enabled: true,
            hubspot_portal_id: "123456".into(),
            matomo_enabled: true,
            matomo_url: "https://stats.example.com".into(),
            matomo_site_id: "4".into(),
            ..Default::default()
        };
        let html = render_head_scripts(&settings);
        assert!(html.contains("portalId: 123456"));
        assert!(html.contains("_paq.push(['requireCookieConsent'])"));
        assert!(html.contains(r#""https://stats.example.com/matomo.php""#));
        assert!(html.contains(r#"['setSiteId', "4"]"#));
    }

    #[test]
    fn test_script_json_cannot_close_script() {
        let out = script_json(&json!("</script><script>alert(1)"));
        assert!(!out.contains("</script>"));
    }
}
