//! Database schema SQL.

/// Options table: named JSON documents. Created when the store opens.
pub const OPTIONS_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS options (
    name TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

/// Consent log table. Created lazily, see `SqliteStore::create_database_table`.
pub const CONSENT_LOGS_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS consent_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date_created TEXT NOT NULL,
    ip_address TEXT NOT NULL,
    user_id INTEGER,
    consent_data TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_consent_logs_user_id ON consent_logs(user_id);
CREATE INDEX IF NOT EXISTS idx_consent_logs_ip ON consent_logs(ip_address);
"#;

pub const CONSENT_LOGS_TABLE: &str = "consent_logs";

/// Timestamp format of `consent_logs.date_created` (UTC).
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Option names.
pub const SETTINGS_OPTION: &str = "cookiebar_settings";
pub const DETECTED_COOKIES_OPTION: &str = "cookiebar_detected_cookies";
pub const LAST_SCAN_OPTION: &str = "cookiebar_last_scan";
pub const OCD_OPTION: &str = "cookiebar_open_cookie_database";
