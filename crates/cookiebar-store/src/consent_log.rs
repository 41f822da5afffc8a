//! Consent log: append-only record of visitor consent decisions.
//!
//! The contract-level operations (`create_database_table`, `log_consent`)
//! report failure as `false` rather than an error: callers only surface a
//! generic message, and a failed write must never break the page.

use std::io::Write;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tracing::{debug, info, warn};

use crate::schema::{CONSENT_LOGS_SCHEMA_SQL, DATE_FORMAT};
use crate::sqlite::SqliteStore;
use crate::types::LogFilter;
use cookiebar_core::consent::granted_keys;
use cookiebar_core::{ConsentRecord, Error, Result};

pub const CSV_HEADER: [&str; 4] = ["Date", "IP", "User ID", "Categories"];

impl SqliteStore {
    /// Create the consent log table. Idempotent: returns `true` when the
    /// table exists afterwards, whether or not this call created it.
    pub fn create_database_table(&self) -> bool {
        if self.table_exists() {
            return true;
        }
        let result = self.conn.lock().execute_batch(CONSENT_LOGS_SCHEMA_SQL);
        match result {
            Ok(()) => {
                info!("Created consent_logs table");
                true
            }
            Err(e) => {
                warn!("Failed to create consent_logs table: {}", e);
                false
            }
        }
    }

    /// Append one consent record. Returns `false` on any storage error,
    /// including a missing table.
    pub fn log_consent(
        &self,
        ip_address: &str,
        user_id: Option<i64>,
        consent_data: &serde_json::Value,
    ) -> bool {
        match self.insert_consent(ip_address, user_id, consent_data) {
            Ok(id) => {
                debug!("Logged consent {} for ip={} user={:?}", id, ip_address, user_id);
                true
            }
            Err(e) => {
                warn!("Failed to log consent: {}", e);
                false
            }
        }
    }

    fn insert_consent(
        &self,
        ip_address: &str,
        user_id: Option<i64>,
        consent_data: &serde_json::Value,
    ) -> Result<i64> {
        let data_json = serde_json::to_string(consent_data)?;
        let now = Utc::now().format(DATE_FORMAT).to_string();
        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO consent_logs (date_created, ip_address, user_id, consent_data) \
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .insert(params![now, ip_address, user_id, data_json])
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(id)
    }

    /// Read consent records in insertion order. A missing table reads as empty.
    pub fn get_logs(&self, filter: &LogFilter) -> Result<Vec<ConsentRecord>> {
        if !self.table_exists() {
            return Ok(Vec::new());
        }

        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();

        if let Some(user_id) = filter.user_id {
            clauses.push("user_id = ?");
            values.push(SqlValue::Integer(user_id));
        }
        if let Some(ip) = &filter.ip_address {
            clauses.push("ip_address = ?");
            values.push(SqlValue::Text(ip.clone()));
        }
        if let Some(since) = filter.since {
            clauses.push("date_created >= ?");
            values.push(SqlValue::Text(since.format(DATE_FORMAT).to_string()));
        }
        if let Some(until) = filter.until {
            clauses.push("date_created < ?");
            values.push(SqlValue::Text(until.format(DATE_FORMAT).to_string()));
        }

        let mut sql = String::from(
            "SELECT id, date_created, ip_address, user_id, consent_data FROM consent_logs",
        );
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY id ASC");
        // SQLite requires LIMIT before OFFSET; -1 means unbounded.
        if filter.limit.is_some() || filter.offset.is_some() {
            sql.push_str(" LIMIT ? OFFSET ?");
            values.push(SqlValue::Integer(filter.limit.map(|l| l as i64).unwrap_or(-1)));
            values.push(SqlValue::Integer(filter.offset.unwrap_or(0) as i64));
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql).map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params_from_iter(values), Self::row_to_record)
            .map_err(|e| Error::Database(e.to_string()))?;
        // A row that no longer maps fails the whole read rather than vanish
        // from the log or the export.
        let records = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(format!("Unreadable consent record: {}", e)))?;
        Ok(records)
    }

    /// Most recent record for a visitor: by user ID when logged in,
    /// otherwise by IP address.
    pub fn latest_for_visitor(
        &self,
        user_id: Option<i64>,
        ip_address: &str,
    ) -> Result<Option<ConsentRecord>> {
        if !self.table_exists() {
            return Ok(None);
        }
        let conn = self.conn.lock();
        let record = match user_id {
            Some(uid) => conn
                .prepare_cached(
                    "SELECT id, date_created, ip_address, user_id, consent_data FROM consent_logs \
                     WHERE user_id = ?1 ORDER BY id DESC LIMIT 1",
                )
                .map_err(|e| Error::Database(e.to_string()))?
                .query_row(params![uid], Self::row_to_record)
                .optional(),
            None => conn
                .prepare_cached(
                    "SELECT id, date_created, ip_address, user_id, consent_data FROM consent_logs \
                     WHERE ip_address = ?1 AND user_id IS NULL ORDER BY id DESC LIMIT 1",
                )
                .map_err(|e| Error::Database(e.to_string()))?
                .query_row(params![ip_address], Self::row_to_record)
                .optional(),
        };
        record.map_err(|e| Error::Database(e.to_string()))
    }

    /// Total number of consent records. A missing table counts as zero.
    pub fn count_logs(&self) -> Result<i64> {
        if !self.table_exists() {
            return Ok(0);
        }
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM consent_logs", [], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Write every consent record as CSV: `Date,IP,User ID,Categories`.
    ///
    /// Creates the table first if needed, in which case only the header is
    /// written.
    pub fn export_logs_csv<W: Write>(&self, writer: W) -> Result<()> {
        if !self.create_database_table() {
            return Err(Error::Storage("consent_logs table unavailable".into()));
        }
        let records = self.get_logs(&LogFilter::default())?;

        let mut csv_writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer);
        csv_writer
            .write_record(CSV_HEADER)
            .map_err(|e| Error::Csv(e.to_string()))?;

        for record in &records {
            csv_writer
                .write_record([
                    record.created_at.format(DATE_FORMAT).to_string(),
                    record.ip_address.clone(),
                    record.user_id.map(|u| u.to_string()).unwrap_or_default(),
                    granted_keys(&record.consent_data).join(","),
                ])
                .map_err(|e| Error::Csv(e.to_string()))?;
        }
        csv_writer.flush()?;
        info!("Exported {} consent records", records.len());
        Ok(())
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ConsentRecord> {
        let date: String = row.get(1)?;
        let raw_data: String = row.get(4)?;
        Ok(ConsentRecord {
            id: row.get(0)?,
            created_at: parse_date(&date),
            ip_address: row.get(2)?,
            user_id: row.get(3)?,
            consent_data: serde_json::from_str(&raw_data)
                .unwrap_or(serde_json::Value::String(raw_data)),
        })
    }
}

fn parse_date(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use crate::sqlite::tests::test_store;
    use crate::types::LogFilter;
    use serde_json::json;

    fn sample_consent(source: &str) -> serde_json::Value {
        json!({
            "categories": {
                "necessary": true,
                "analytics": true,
                "functional": false,
                "marketing": true
            },
            "consent_source": source
        })
    }

    #[test]
    fn test_create_table_is_idempotent() {
        let (store, _dir) = test_store();
        assert!(!store.table_exists());
        assert!(store.create_database_table());
        assert!(store.create_database_table());
        assert!(store.table_exists());

        let conn = store.conn.lock();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'consent_logs'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn test_log_consent_without_table_fails_quietly() {
        let (store, _dir) = test_store();
        assert!(!store.log_consent("1.2.3.4", None, &sample_consent("banner")));
        assert!(store.get_logs(&LogFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_log_then_get_matches_input() {
        let (store, _dir) = test_store();
        store.create_database_table();

        let data = sample_consent("accept_all");
        assert!(store.log_consent("203.0.113.7", Some(42), &data));

        let logs = store.get_logs(&LogFilter::default()).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].ip_address, "203.0.113.7");
        assert_eq!(logs[0].user_id, Some(42));
        assert_eq!(logs[0].consent_data, data);
        assert_eq!(
            serde_json::to_string(&logs[0].consent_data).unwrap(),
            serde_json::to_string(&data).unwrap()
        );
    }

    #[test]
    fn test_get_logs_in_insertion_order_with_filters() {
        let (store, _dir) = test_store();
        store.create_database_table();
        for i in 0..5 {
            let user = if i % 2 == 0 { Some(7) } else { None };
            assert!(store.log_consent(&format!("10.0.0.{}", i), user, &sample_consent(&i.to_string())));
        }

        let all = store.get_logs(&LogFilter::default()).unwrap();
        let ips: Vec<_> = all.iter().map(|r| r.ip_address.as_str()).collect();
        assert_eq!(ips, ["10.0.0.0", "10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"]);

        let mine = store
            .get_logs(&LogFilter {
                user_id: Some(7),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(mine.len(), 3);

        let page = store
            .get_logs(&LogFilter {
                limit: Some(2),
                offset: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].ip_address, "10.0.0.1");

        let skipped = store
            .get_logs(&LogFilter {
                offset: Some(4),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(skipped.len(), 1);

        let by_ip = store
            .get_logs(&LogFilter {
                ip_address: Some("10.0.0.3".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_ip.len(), 1);
        assert_eq!(by_ip[0].user_id, None);
    }

    #[test]
    fn test_export_on_missing_table_writes_header_and_creates_table() {
        let (store, _dir) = test_store();
        assert!(!store.table_exists());

        let mut out = Vec::new();
        store.export_logs_csv(&mut out).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "Date,IP,User ID,Categories\n");
        assert!(store.table_exists());
    }

    #[test]
    fn test_export_rows() {
        let (store, _dir) = test_store();
        store.create_database_table();
        store.log_consent("198.51.100.1", Some(3), &sample_consent("banner"));
        store.log_consent(
            "198.51.100.2",
            None,
            &json!({ "categories": { "necessary": true }, "consent_source": "reject_all" }),
        );

        let mut out = Vec::new();
        store.export_logs_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Date,IP,User ID,Categories");
        assert!(lines[1].ends_with(",198.51.100.1,3,\"necessary,analytics,marketing\""));
        assert!(lines[2].ends_with(",198.51.100.2,,necessary"));
    }

    #[test]
    fn test_latest_for_visitor() {
        let (store, _dir) = test_store();
        assert!(store.latest_for_visitor(None, "1.1.1.1").unwrap().is_none());

        store.create_database_table();
        store.log_consent("1.1.1.1", None, &sample_consent("first"));
        store.log_consent("1.1.1.1", None, &sample_consent("second"));
        store.log_consent("1.1.1.1", Some(9), &sample_consent("user"));

        let anon = store.latest_for_visitor(None, "1.1.1.1").unwrap().unwrap();
        assert_eq!(anon.consent_data["consent_source"], "second");

        let user = store.latest_for_visitor(Some(9), "9.9.9.9").unwrap().unwrap();
        assert_eq!(user.consent_data["consent_source"], "user");

        assert_eq!(store.count_logs().unwrap(), 3);
    }

    #[test]
    fn test_unreadable_row_is_reported_not_dropped() {
        let (store, _dir) = test_store();
        store.create_database_table();
        store.log_consent("192.0.2.1", None, &sample_consent("banner"));
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO consent_logs (date_created, ip_address, user_id, consent_data) \
                 VALUES ('2026-01-01 00:00:00', '192.0.2.2', 'not-a-number', '{}')",
                [],
            )
            .unwrap();

        assert!(store.get_logs(&LogFilter::default()).is_err());
        let mut out = Vec::new();
        assert!(store.export_logs_csv(&mut out).is_err());
    }
}
