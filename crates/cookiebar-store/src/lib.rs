//! CookieBar Store: SQLite-backed consent log and options storage.
//!
//! The options table plays the role of a CMS options API: each row is a
//! named JSON document. Plugin settings and scan results live there. The
//! consent log is its own append-only table, created lazily.

pub mod consent_log;
pub mod schema;
pub mod settings;
pub mod sqlite;
pub mod types;

pub use sqlite::SqliteStore;
pub use types::*;
