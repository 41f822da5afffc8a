//! CookieBar Core: configuration, errors, the consent data model, the
//! cookie category registry and the plugin settings schema.

pub mod categories;
pub mod config;
pub mod consent;
pub mod error;
pub mod settings;

pub use categories::{get_categories, CategoryKey, CookieCategory, CookieDomain, KnownCookie};
pub use config::{CookieBarConfig, DataPaths};
pub use consent::{ConsentData, ConsentRecord};
pub use error::{Error, Result};
pub use settings::{BannerPosition, PluginSettings, ScanFrequency};
