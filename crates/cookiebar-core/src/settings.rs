//! Plugin settings schema: every configurable key, its type and default.
//!
//! Settings are stored as a single options record. Missing keys are filled
//! from defaults on load; writes go through an enumerated schema so unknown
//! keys and mistyped values are rejected instead of silently stored.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::categories::CategoryKey;
use crate::error::{Error, Result};

/// Where the banner is anchored on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BannerPosition {
    Top,
    #[default]
    Bottom,
    BottomLeft,
    BottomRight,
}

impl BannerPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Bottom => "bottom",
            Self::BottomLeft => "bottom_left",
            Self::BottomRight => "bottom_right",
        }
    }

    /// CSS-friendly form used in class names.
    pub fn css_class(&self) -> String {
        self.as_str().replace('_', "-")
    }
}

impl fmt::Display for BannerPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How often the scheduled cookie scan runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanFrequency {
    Manual,
    Daily,
    #[default]
    Weekly,
    Monthly,
}

impl ScanFrequency {
    /// Interval between scheduled scans, `None` for manual-only.
    pub fn interval(&self) -> Option<std::time::Duration> {
        const DAY: u64 = 24 * 60 * 60;
        match self {
            Self::Manual => None,
            Self::Daily => Some(std::time::Duration::from_secs(DAY)),
            Self::Weekly => Some(std::time::Duration::from_secs(7 * DAY)),
            Self::Monthly => Some(std::time::Duration::from_secs(30 * DAY)),
        }
    }
}

/// Admin override of a category's visitor-facing text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryText {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub const DEFAULT_OCD_URL: &str =
    "https://raw.githubusercontent.com/jkwakman/Open-Cookie-Database/master/open-cookie-database.csv";

/// The single global settings record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    // Banner
    pub banner_position: BannerPosition,
    pub banner_title: String,
    pub banner_text: String,
    pub accept_all_text: String,
    pub reject_all_text: String,
    pub settings_text: String,
    pub save_preferences_text: String,
    pub privacy_policy_url: String,
    pub cookie_policy_url: String,
    pub primary_color: String,
    pub show_reject_button: bool,
    pub consent_expiry_days: u32,
    pub log_consents: bool,
    pub anonymize_ip: bool,
    pub category_texts: BTreeMap<CategoryKey, CategoryText>,

    // Integrations
    pub gcm_enabled: bool,
    pub gcm_wait_for_update: u32,
    pub gcm_ads_data_redaction: bool,
    pub gcm_url_passthrough: bool,
    pub hubspot_enabled: bool,
    pub hubspot_portal_id: String,
    pub matomo_enabled: bool,
    pub matomo_url: String,
    pub matomo_site_id: String,
    pub matomo_require_cookie_consent: bool,

    // Scanner
    pub scan_frequency: ScanFrequency,
    pub site_url: String,
    pub scan_paths: Vec<String>,
    pub ocd_url: String,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            banner_position: BannerPosition::Bottom,
            banner_title: "We value your privacy".into(),
            banner_text: "We use cookies to improve your experience, analyse traffic and personalise content. Choose which cookies you allow.".into(),
            accept_all_text: "Accept all".into(),
            reject_all_text: "Reject all".into(),
            settings_text: "Cookie settings".into(),
            save_preferences_text: "Save preferences".into(),
            privacy_policy_url: String::new(),
            cookie_policy_url: String::new(),
            primary_color: "#2271b1".into(),
            show_reject_button: true,
            consent_expiry_days: 365,
            log_consents: true,
            anonymize_ip: false,
            category_texts: BTreeMap::new(),
            gcm_enabled: false,
            gcm_wait_for_update: 500,
            gcm_ads_data_redaction: false,
            gcm_url_passthrough: false,
            hubspot_enabled: false,
            hubspot_portal_id: String::new(),
            matomo_enabled: false,
            matomo_url: String::new(),
            matomo_site_id: String::new(),
            matomo_require_cookie_consent: true,
            scan_frequency: ScanFrequency::Weekly,
            site_url: "http://localhost".into(),
            scan_paths: vec!["/".into()],
            ocd_url: DEFAULT_OCD_URL.into(),
        }
    }
}

impl PluginSettings {
    /// Whether `key` names a field of the schema.
    pub fn is_known_key(key: &str) -> bool {
        match serde_json::to_value(Self::default()) {
            Ok(Value::Object(map)) => map.contains_key(key),
            _ => false,
        }
    }

    /// Read a single setting as JSON.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        match serde_json::to_value(self).ok()? {
            Value::Object(mut map) => map.remove(key),
            _ => None,
        }
    }

    /// Write a single setting. Unknown keys, mistyped values and values that
    /// fail validation are rejected and leave `self` unchanged.
    pub fn set_value(&mut self, key: &str, value: Value) -> Result<()> {
        if !Self::is_known_key(key) {
            return Err(Error::InvalidSetting(format!("unknown key '{}'", key)));
        }
        let mut map = match serde_json::to_value(&*self)? {
            Value::Object(map) => map,
            _ => return Err(Error::Internal("settings did not serialize to an object".into())),
        };
        map.insert(key.to_string(), value);
        let updated: PluginSettings = serde_json::from_value(Value::Object(map))
            .map_err(|e| Error::InvalidSetting(format!("{}: {}", key, e)))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Check cross-field constraints that the type system does not cover.
    pub fn validate(&self) -> Result<()> {
        if self.consent_expiry_days == 0 || self.consent_expiry_days > 3650 {
            return Err(Error::InvalidSetting(
                "consent_expiry_days must be between 1 and 3650".into(),
            ));
        }
        if !is_hex_color(&self.primary_color) {
            return Err(Error::InvalidSetting(format!(
                "primary_color '{}' is not a #rrggbb color",
                self.primary_color
            )));
        }
        for (key, url) in [
            ("privacy_policy_url", &self.privacy_policy_url),
            ("cookie_policy_url", &self.cookie_policy_url),
            ("matomo_url", &self.matomo_url),
        ] {
            if !url.is_empty() && !is_link(url) {
                return Err(Error::InvalidSetting(format!("{} must be an http(s) URL or path", key)));
            }
        }
        if !self.site_url.starts_with("http://") && !self.site_url.starts_with("https://") {
            return Err(Error::InvalidSetting("site_url must be an http(s) URL".into()));
        }
        if !self.ocd_url.starts_with("https://") && !self.ocd_url.starts_with("http://") {
            return Err(Error::InvalidSetting("ocd_url must be an http(s) URL".into()));
        }
        if let Some(path) = self.scan_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(Error::InvalidSetting(format!("scan path '{}' must start with '/'", path)));
        }
        if self.hubspot_enabled && !self.hubspot_portal_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::InvalidSetting("hubspot_portal_id must be numeric".into()));
        }
        if self.matomo_enabled && (self.matomo_url.is_empty() || self.matomo_site_id.is_empty()) {
            return Err(Error::InvalidSetting(
                "matomo_url and matomo_site_id are required when Matomo is enabled".into(),
            ));
        }
        Ok(())
    }
}

fn is_hex_color(s: &str) -> bool {
    s.len() == 7
        && s.starts_with('#')
        && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

fn is_link(s: &str) -> bool {
    s.starts_with("https://") || s.starts_with("http://") || s.starts_with('/')
}

// ---------------------------------------------------------------
// Admin form groups
// ---------------------------------------------------------------

/// Banner and logging fields (`save_cookie_settings`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CookieSettingsForm {
    #[serde(alias = "position")]
    pub banner_position: Option<BannerPosition>,
    pub banner_title: Option<String>,
    pub banner_text: Option<String>,
    pub accept_all_text: Option<String>,
    pub reject_all_text: Option<String>,
    pub settings_text: Option<String>,
    pub save_preferences_text: Option<String>,
    pub privacy_policy_url: Option<String>,
    pub cookie_policy_url: Option<String>,
    pub primary_color: Option<String>,
    pub show_reject_button: Option<bool>,
    pub consent_expiry_days: Option<u32>,
    pub log_consents: Option<bool>,
    pub anonymize_ip: Option<bool>,
    pub category_texts: Option<BTreeMap<CategoryKey, CategoryText>>,
}

/// Third-party integration fields (`save_integration_settings`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntegrationSettingsForm {
    pub gcm_enabled: Option<bool>,
    pub gcm_wait_for_update: Option<u32>,
    pub gcm_ads_data_redaction: Option<bool>,
    pub gcm_url_passthrough: Option<bool>,
    pub hubspot_enabled: Option<bool>,
    pub hubspot_portal_id: Option<String>,
    pub matomo_enabled: Option<bool>,
    pub matomo_url: Option<String>,
    pub matomo_site_id: Option<String>,
    pub matomo_require_cookie_consent: Option<bool>,
}

/// Cookie scanner fields (`save_scanner_settings`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScannerSettingsForm {
    pub scan_frequency: Option<ScanFrequency>,
    pub site_url: Option<String>,
    pub scan_paths: Option<Vec<String>>,
    pub ocd_url: Option<String>,
}

macro_rules! apply_fields {
    ($form:expr, $target:expr, [$($field:ident),* $(,)?]) => {
        $(
            if let Some(v) = $form.$field {
                $target.$field = v;
            }
        )*
    };
}

/// A form group that can be merged into the settings record.
pub trait SettingsForm {
    /// Apply the fields present in the form to a copy of `current` and
    /// return it if the result validates.
    fn apply(self, current: &PluginSettings) -> Result<PluginSettings>;
}

impl SettingsForm for CookieSettingsForm {
    fn apply(self, current: &PluginSettings) -> Result<PluginSettings> {
        let mut next = current.clone();
        apply_fields!(self, next, [
            banner_position,
            banner_title,
            banner_text,
            accept_all_text,
            reject_all_text,
            settings_text,
            save_preferences_text,
            privacy_policy_url,
            cookie_policy_url,
            primary_color,
            show_reject_button,
            consent_expiry_days,
            log_consents,
            anonymize_ip,
        ]);
        if let Some(texts) = self.category_texts {
            next.category_texts.extend(texts);
        }
        next.validate()?;
        Ok(next)
    }
}

impl SettingsForm for IntegrationSettingsForm {
    fn apply(self, current: &PluginSettings) -> Result<PluginSettings> {
        let mut next = current.clone();
        apply_fields!(self, next, [
            gcm_enabled,
            gcm_wait_for_update,
            gcm_ads_data_redaction,
            gcm_url_passthrough,
            hubspot_enabled,
            hubspot_portal_id,
            matomo_enabled,
            matomo_url,
            matomo_site_id,
            matomo_require_cookie_consent,
        ]);
        next.validate()?;
        Ok(next)
    }
}

impl SettingsForm for ScannerSettingsForm {
    fn apply(self, current: &PluginSettings) -> Result<PluginSettings> {
        let mut next = current.clone();
        apply_fields!(self, next, [scan_frequency, site_url, scan_paths, ocd_url]);
        next.validate()?;
        Ok(next)
    }
}
