//! Open Cookie Database: a community-maintained list of known cookies.
//!
//! A small subset ships with the crate; `download` fetches the full CSV.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use cookiebar_core::{CategoryKey, Error, Result};

const BUNDLED_CSV: &str = include_str!("../data/open-cookie-database.csv");

static BUNDLED: Lazy<OpenCookieDatabase> = Lazy::new(|| {
    OpenCookieDatabase::from_csv(BUNDLED_CSV).expect("bundled Open Cookie Database is valid")
});

/// One row of the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcdEntry {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Platform")]
    pub platform: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Cookie / Data Key name")]
    pub name: String,
    #[serde(rename = "Domain", default)]
    pub domain: String,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "Retention period", default)]
    pub retention: String,
    #[serde(rename = "Data Controller", default)]
    pub controller: String,
    #[serde(rename = "User Privacy & GDPR Rights Portals", default)]
    pub privacy_portal: String,
    #[serde(rename = "Wildcard match", default)]
    pub wildcard_match: String,
}

impl OcdEntry {
    pub fn is_wildcard(&self) -> bool {
        self.wildcard_match.trim() == "1"
    }

    /// Consent category for this entry, if its category is recognised.
    pub fn category_key(&self) -> Option<CategoryKey> {
        map_ocd_category(&self.category)
    }
}

/// Map an Open Cookie Database category label onto a consent category.
pub fn map_ocd_category(label: &str) -> Option<CategoryKey> {
    match label.trim().to_ascii_lowercase().as_str() {
        "functional" | "preferences" | "personalization" | "personalisation" => {
            Some(CategoryKey::Functional)
        }
        "analytics" | "statistics" => Some(CategoryKey::Analytics),
        "marketing" | "advertising" => Some(CategoryKey::Marketing),
        "security" | "necessary" | "essential" => Some(CategoryKey::Necessary),
        _ => None,
    }
}

/// The database as persisted in the options table after a refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredOcd {
    pub url: String,
    pub hash: String,
    pub fetched_at: DateTime<Utc>,
    pub csv: String,
}

/// Parsed, indexed cookie database.
#[derive(Debug, Clone)]
pub struct OpenCookieDatabase {
    entries: Vec<OcdEntry>,
    exact: HashMap<String, usize>,
    /// Indices of wildcard entries, longest prefix first.
    wildcards: Vec<usize>,
    hash: String,
}

impl OpenCookieDatabase {
    /// Parse the database CSV. Malformed rows are skipped; a file without
    /// a single usable row is an error.
    pub fn from_csv(text: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut entries = Vec::new();
        let mut skipped = 0usize;
        for row in reader.deserialize::<OcdEntry>() {
            match row {
                Ok(entry) if !entry.name.is_empty() => entries.push(entry),
                Ok(_) | Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!("Open Cookie Database: skipped {} malformed rows", skipped);
        }
        if entries.is_empty() {
            return Err(Error::Csv("Open Cookie Database contains no entries".into()));
        }

        let mut exact = HashMap::new();
        let mut wildcards = Vec::new();
        for (i, entry) in entries.iter().enumerate() {
            if entry.is_wildcard() {
                wildcards.push(i);
            } else {
                exact.entry(entry.name.clone()).or_insert(i);
            }
        }
        wildcards.sort_by_key(|&i| std::cmp::Reverse(entries[i].name.len()));

        Ok(Self {
            entries,
            exact,
            wildcards,
            hash: content_hash(text),
        })
    }

    /// The subset compiled into the binary.
    pub fn bundled() -> Self {
        BUNDLED.clone()
    }

    /// Rebuild from a persisted download.
    pub fn from_stored(stored: &StoredOcd) -> Result<Self> {
        Self::from_csv(&stored.csv)
    }

    /// Find the entry describing `name`: exact match, else the longest
    /// wildcard prefix.
    pub fn lookup(&self, name: &str) -> Option<&OcdEntry> {
        if let Some(&i) = self.exact.get(name) {
            return Some(&self.entries[i]);
        }
        self.wildcards
            .iter()
            .map(|&i| &self.entries[i])
            .find(|e| name.starts_with(e.name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// SHA-256 of the CSV this database was parsed from.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Download and parse the database from `url`.
    pub async fn download(client: &reqwest::Client, url: &str) -> Result<(Self, StoredOcd)> {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Http(format!("Open Cookie Database request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "Open Cookie Database download returned {}",
                response.status()
            )));
        }
        let csv = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("Open Cookie Database body unreadable: {}", e)))?;

        let db = Self::from_csv(&csv)?;
        info!("Downloaded Open Cookie Database: {} entries from {}", db.len(), url);
        let stored = StoredOcd {
            url: url.to_string(),
            hash: db.hash.clone(),
            fetched_at: Utc::now(),
            csv,
        };
        Ok((db, stored))
    }
}

fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_parses() {
        let db = OpenCookieDatabase::bundled();
        assert!(db.len() >= 20);
        assert_eq!(db.hash().len(), 64);
    }

    #[test]
    fn test_exact_and_wildcard_lookup() {
        let db = OpenCookieDatabase::bundled();

        let gid = db.lookup("_gid").unwrap();
        assert_eq!(gid.platform, "Google Analytics");
        assert_eq!(gid.category_key(), Some(CategoryKey::Analytics));

        let ga4 = db.lookup("_ga_ABCDEF").unwrap();
        assert!(ga4.is_wildcard());

        let pk = db.lookup("_pk_id.1.1fff").unwrap();
        assert_eq!(pk.platform, "Matomo");

        assert!(db.lookup("no_such_cookie").is_none());
    }

    #[test]
    fn test_category_mapping() {
        assert_eq!(map_ocd_category("Security"), Some(CategoryKey::Necessary));
        assert_eq!(map_ocd_category("Personalization"), Some(CategoryKey::Functional));
        assert_eq!(map_ocd_category("Marketing"), Some(CategoryKey::Marketing));
        assert_eq!(map_ocd_category("Other"), None);
    }

    #[test]
    fn test_empty_csv_is_error() {
        let header = BUNDLED_CSV.lines().next().unwrap();
        assert!(OpenCookieDatabase::from_csv(header).is_err());
    }

    #[test]
    fn test_hash_changes_with_content() {
        let header = BUNDLED_CSV.lines().next().unwrap();
        let a = format!("{}\nx1,P,Analytics,a,,,,,,0\n", header);
        let b = format!("{}\nx1,P,Analytics,b,,,,,,0\n", header);
        let db_a = OpenCookieDatabase::from_csv(&a).unwrap();
        let db_b = OpenCookieDatabase::from_csv(&b).unwrap();
        assert_ne!(db_a.hash(), db_b.hash());
        assert_eq!(db_a.lookup("a").unwrap().id, "x1");
    }
}
