//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Paths to CookieBar data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Database directory (`data/db/`).
    pub db_dir: PathBuf,
    /// SQLite database file (`data/db/cookiebar.db`).
    pub db_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let db_dir = root.join("db");
        let paths = Self {
            db_file: db_dir.join("cookiebar.db"),
            db_dir,
            root,
        };
        std::fs::create_dir_all(&paths.db_dir)?;
        Ok(paths)
    }
}

/// Top-level CookieBar configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieBarConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    /// Token required on admin requests. `None` leaves the admin API open,
    /// which is only meant for local development.
    #[serde(skip_serializing)]
    pub admin_token: Option<String>,
    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`. Only
    /// safe behind a reverse proxy that overwrites those headers.
    #[serde(default)]
    pub trust_proxy: bool,
}

impl CookieBarConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3004);

        let admin_token = std::env::var("COOKIEBAR_ADMIN_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        let trust_proxy = std::env::var("COOKIEBAR_TRUST_PROXY")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let data_paths = DataPaths::new(data_dir)?;

        Ok(Self {
            port,
            data_paths,
            admin_token,
            trust_proxy,
        })
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
