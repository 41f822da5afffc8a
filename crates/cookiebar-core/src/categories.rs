//! Cookie category registry: the four consent categories and the cookies
//! known to belong to each.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::settings::PluginSettings;

/// Consent categories, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKey {
    Necessary,
    Analytics,
    Functional,
    Marketing,
}

impl CategoryKey {
    pub fn all() -> &'static [CategoryKey] {
        &[
            Self::Necessary,
            Self::Analytics,
            Self::Functional,
            Self::Marketing,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Necessary => "necessary",
            Self::Analytics => "analytics",
            Self::Functional => "functional",
            Self::Marketing => "marketing",
        }
    }

    /// Only necessary cookies are exempt from consent.
    pub fn is_required(&self) -> bool {
        matches!(self, Self::Necessary)
    }

    fn default_title(&self) -> &'static str {
        match self {
            Self::Necessary => "Necessary",
            Self::Analytics => "Analytics",
            Self::Functional => "Functional",
            Self::Marketing => "Marketing",
        }
    }

    fn default_description(&self) -> &'static str {
        match self {
            Self::Necessary => {
                "These cookies are required for the website to function and cannot be switched off."
            }
            Self::Analytics => {
                "These cookies help us understand how visitors interact with the website by collecting information anonymously."
            }
            Self::Functional => {
                "These cookies enable enhanced functionality and personalisation, such as remembering your preferences."
            }
            Self::Marketing => {
                "These cookies are used to deliver relevant advertisements and track the effectiveness of marketing campaigns."
            }
        }
    }
}

impl fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryKey {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "necessary" => Ok(Self::Necessary),
            "analytics" => Ok(Self::Analytics),
            "functional" => Ok(Self::Functional),
            "marketing" => Ok(Self::Marketing),
            other => Err(crate::Error::NotFound(format!("cookie category '{}'", other))),
        }
    }
}

/// Domain(s) a known cookie is set on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CookieDomain {
    Single(String),
    Many(Vec<String>),
}

impl CookieDomain {
    pub fn domains(&self) -> Vec<&str> {
        match self {
            Self::Single(d) => vec![d.as_str()],
            Self::Many(ds) => ds.iter().map(String::as_str).collect(),
        }
    }
}

/// A cookie name/domain pair belonging to a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownCookie {
    pub name: String,
    pub domain: CookieDomain,
}

impl KnownCookie {
    /// Names ending in `*` match any cookie sharing the prefix.
    pub fn matches(&self, cookie_name: &str) -> bool {
        match self.name.strip_suffix('*') {
            Some(prefix) => cookie_name.starts_with(prefix),
            None => self.name == cookie_name,
        }
    }
}

/// A consent category as shown to visitors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieCategory {
    pub key: CategoryKey,
    pub required: bool,
    pub title: String,
    pub description: String,
    pub cookies: Vec<KnownCookie>,
}

// (category, name, domains)
const DEFAULT_COOKIES: &[(CategoryKey, &str, &[&str])] = &[
    (CategoryKey::Necessary, "cookiebar_consent", &["self"]),
    (CategoryKey::Necessary, "wordpress_logged_in_*", &["self"]),
    (CategoryKey::Necessary, "wordpress_sec_*", &["self"]),
    (CategoryKey::Necessary, "wordpress_test_cookie", &["self"]),
    (CategoryKey::Necessary, "PHPSESSID", &["self"]),
    (CategoryKey::Necessary, "__cf_bm", &[".cloudflare.com"]),
    (CategoryKey::Analytics, "_ga", &[".google-analytics.com", ".google.com"]),
    (CategoryKey::Analytics, "_ga_*", &[".google-analytics.com"]),
    (CategoryKey::Analytics, "_gid", &[".google-analytics.com"]),
    (CategoryKey::Analytics, "_gat", &[".google-analytics.com"]),
    (CategoryKey::Analytics, "_pk_id*", &["self"]),
    (CategoryKey::Analytics, "_pk_ses*", &["self"]),
    (CategoryKey::Analytics, "_hjSessionUser_*", &[".hotjar.com"]),
    (CategoryKey::Analytics, "__hstc", &[".hubspot.com"]),
    (CategoryKey::Analytics, "__hssc", &[".hubspot.com"]),
    (CategoryKey::Analytics, "__hssrc", &[".hubspot.com"]),
    (CategoryKey::Functional, "wp-settings-*", &["self"]),
    (CategoryKey::Functional, "wp-settings-time-*", &["self"]),
    (CategoryKey::Functional, "pll_language", &["self"]),
    (CategoryKey::Functional, "wp_lang", &["self"]),
    (CategoryKey::Marketing, "_fbp", &[".facebook.com"]),
    (CategoryKey::Marketing, "fr", &[".facebook.com"]),
    (CategoryKey::Marketing, "_gcl_au", &[".google.com"]),
    (CategoryKey::Marketing, "IDE", &[".doubleclick.net"]),
    (CategoryKey::Marketing, "test_cookie", &[".doubleclick.net"]),
    (CategoryKey::Marketing, "hubspotutk", &[".hubspot.com"]),
    (CategoryKey::Marketing, "_uetsid", &[".bing.com"]),
    (CategoryKey::Marketing, "_uetvid", &[".bing.com"]),
];

fn default_cookies(key: CategoryKey) -> Vec<KnownCookie> {
    DEFAULT_COOKIES
        .iter()
        .filter(|(category, _, _)| *category == key)
        .map(|(_, name, domains)| KnownCookie {
            name: (*name).to_string(),
            domain: match domains {
                [single] => CookieDomain::Single((*single).to_string()),
                many => CookieDomain::Many(many.iter().map(|d| (*d).to_string()).collect()),
            },
        })
        .collect()
}

/// Build the category registry, applying title/description overrides from
/// settings over the built-in labels.
pub fn get_categories(settings: &PluginSettings) -> BTreeMap<CategoryKey, CookieCategory> {
    CategoryKey::all()
        .iter()
        .map(|&key| {
            let text = settings.category_texts.get(&key);
            let title = text
                .and_then(|t| t.title.as_deref())
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(key.default_title())
                .to_string();
            let description = text
                .and_then(|t| t.description.as_deref())
                .filter(|d| !d.trim().is_empty())
                .unwrap_or(key.default_description())
                .to_string();

            let category = CookieCategory {
                key,
                required: key.is_required(),
                title,
                description,
                cookies: default_cookies(key),
            };
            (key, category)
        })
        .collect()
}

/// Look a cookie name up in the compiled-in cookie list.
pub fn find_known_cookie(name: &str) -> Option<CategoryKey> {
    CategoryKey::all()
        .iter()
        .find(|&&key| default_cookies(key).iter().any(|c| c.matches(name)))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::CategoryText;

    #[test]
    fn test_only_necessary_is_required() {
        let categories = get_categories(&PluginSettings::default());
        assert_eq!(categories.len(), 4);
        for (key, category) in &categories {
            assert_eq!(category.required, *key == CategoryKey::Necessary);
        }
        assert!(categories[&CategoryKey::Necessary].required);
    }

    #[test]
    fn test_categories_are_ordered() {
        let categories = get_categories(&PluginSettings::default());
        let keys: Vec<_> = categories.keys().copied().collect();
        assert_eq!(keys, CategoryKey::all());
    }

    #[test]
    fn test_title_override_falls_back_when_blank() {
        let mut settings = PluginSettings::default();
        settings.category_texts.insert(
            CategoryKey::Analytics,
            CategoryText {
                title: Some("Statistics".into()),
                description: Some("   ".into()),
            },
        );
        let categories = get_categories(&settings);
        let analytics = &categories[&CategoryKey::Analytics];
        assert_eq!(analytics.title, "Statistics");
        assert_eq!(
            analytics.description,
            CategoryKey::Analytics.default_description()
        );
    }

    #[test]
    fn test_find_known_cookie() {
        assert_eq!(find_known_cookie("_ga"), Some(CategoryKey::Analytics));
        assert_eq!(find_known_cookie("_ga_XYZ123"), Some(CategoryKey::Analytics));
        assert_eq!(
            find_known_cookie("wordpress_logged_in_abc"),
            Some(CategoryKey::Necessary)
        );
        assert_eq!(find_known_cookie("_fbp"), Some(CategoryKey::Marketing));
        assert_eq!(find_known_cookie("totally_unknown"), None);
    }

    #[test]
    fn test_category_key_parse() {
        assert_eq!("Marketing".parse::<CategoryKey>().unwrap(), CategoryKey::Marketing);
        assert!("ads".parse::<CategoryKey>().is_err());
    }

    #[test]
    fn test_domain_serializes_untagged() {
        let cookie = KnownCookie {
            name: "_ga".into(),
            domain: CookieDomain::Many(vec!["a.com".into(), "b.com".into()]),
        };
        let json = serde_json::to_value(&cookie).unwrap();
        assert_eq!(json["domain"], serde_json::json!(["a.com", "b.com"]));
    }
}
