//! Content-addressed parse cache.
//!
//! Keyed by blob fingerprint, so a re-uploaded statement skips the whole
//! LLM path. Entries expire after a configured TTL and are reaped by a
//! janitor; hit counts are bumped best-effort on read — a failed bump
//! never fails the read.

use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::debug;

use crate::types::{Cost, DocumentKind, Record, Schema};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cache entry corrupt: {0}")]
    Corrupt(String),
}

/// One cached extraction.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub file_name: String,
    pub file_size: u64,
    pub records: Vec<Record>,
    pub schema: Schema,
    pub cost: Cost,
    pub kind: DocumentKind,
    pub hit_count: u64,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

/// SQLite-backed parse cache.
///
/// The connection is mutex-wrapped so the reader, writer, and janitor may
/// interleave freely. Concurrent `put`s for one fingerprint converge —
/// payloads are deterministic given the fingerprint, so last-writer-wins
/// is sound.
pub struct ParseCache {
    conn: Mutex<Connection>,
    ttl_days: i64,
}

impl ParseCache {
    /// Open (or create) the cache database at `path`.
    pub fn open(path: &Path, ttl_days: i64) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            ttl_days,
        })
    }

    /// In-memory cache for tests.
    pub fn open_in_memory(ttl_days: i64) -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            ttl_days,
        })
    }

    /// Look up a live entry; expired rows are treated as misses.
    ///
    /// Bumps `hit_count` best-effort — a failed bump is ignored.
    pub fn get(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheError> {
        let now = now_string();
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());

        let entry = conn
            .query_row(
                "SELECT file_hash, file_name, file_size, records, schema, cost, kind,
                        hit_count, created_at, expires_at
                 FROM parse_cache
                 WHERE file_hash = ?1 AND expires_at > ?2",
                params![fingerprint, now],
                row_to_entry,
            )
            .optional()?;

        let Some(entry) = entry else {
            return Ok(None);
        };
        let entry = entry.map_err(CacheError::Corrupt)?;

        let _ = conn.execute(
            "UPDATE parse_cache SET hit_count = hit_count + 1 WHERE file_hash = ?1",
            params![fingerprint],
        );

        debug!(fingerprint, hits = entry.hit_count + 1, "Parse cache hit");
        Ok(Some(entry))
    }

    /// Upsert an extraction result. Idempotent per fingerprint; resets the
    /// TTL window on every write.
    #[allow(clippy::too_many_arguments)]
    pub fn put(
        &self,
        fingerprint: &str,
        file_name: &str,
        file_size: u64,
        records: &[Record],
        schema: &Schema,
        cost: &Cost,
        kind: DocumentKind,
    ) -> Result<(), CacheError> {
        let now = chrono::Utc::now().naive_utc();
        let expires = now + chrono::Duration::days(self.ttl_days);

        let records_json = serde_json::to_string(records)
            .map_err(|e| CacheError::Corrupt(e.to_string()))?;
        let schema_json =
            serde_json::to_string(schema).map_err(|e| CacheError::Corrupt(e.to_string()))?;
        let cost_json =
            serde_json::to_string(cost).map_err(|e| CacheError::Corrupt(e.to_string()))?;

        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO parse_cache
                 (file_hash, file_name, file_size, records, schema, cost, kind,
                  hit_count, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9)
             ON CONFLICT(file_hash) DO UPDATE SET
                 file_name = excluded.file_name,
                 file_size = excluded.file_size,
                 records = excluded.records,
                 schema = excluded.schema,
                 cost = excluded.cost,
                 kind = excluded.kind,
                 created_at = excluded.created_at,
                 expires_at = excluded.expires_at",
            params![
                fingerprint,
                file_name,
                file_size as i64,
                records_json,
                schema_json,
                cost_json,
                kind.as_str(),
                now.format(TIME_FORMAT).to_string(),
                expires.format(TIME_FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }

    /// Remove one entry. Returns whether a row existed.
    pub fn delete(&self, fingerprint: &str) -> Result<bool, CacheError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let affected = conn.execute(
            "DELETE FROM parse_cache WHERE file_hash = ?1",
            params![fingerprint],
        )?;
        Ok(affected > 0)
    }

    /// Janitor: delete expired rows, returning how many were removed.
    pub fn reap_expired(&self) -> Result<usize, CacheError> {
        let now = now_string();
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let reaped = conn.execute(
            "DELETE FROM parse_cache WHERE expires_at < ?1",
            params![now],
        )?;
        if reaped > 0 {
            debug!(reaped, "Reaped expired cache entries");
        }
        Ok(reaped)
    }
}

fn init_schema(conn: &Connection) -> Result<(), CacheError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS parse_cache (
             file_hash  TEXT PRIMARY KEY,
             file_name  TEXT NOT NULL,
             file_size  INTEGER NOT NULL,
             records    TEXT NOT NULL,
             schema     TEXT NOT NULL,
             cost       TEXT NOT NULL,
             kind       TEXT NOT NULL,
             hit_count  INTEGER NOT NULL DEFAULT 0,
             created_at TEXT NOT NULL,
             expires_at TEXT NOT NULL
         )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_parse_cache_expiry ON parse_cache (expires_at)",
        [],
    )?;
    Ok(())
}

type RowResult = Result<CacheEntry, String>;

fn row_to_entry(row: &rusqlite::Row) -> Result<RowResult, rusqlite::Error> {
    let records_json: String = row.get(3)?;
    let schema_json: String = row.get(4)?;
    let cost_json: String = row.get(5)?;
    let kind_str: String = row.get(6)?;
    let created_str: String = row.get(8)?;
    let expires_str: String = row.get(9)?;

    // Deserialization failures surface as Corrupt, not rusqlite errors.
    let build = || -> Result<CacheEntry, String> {
        Ok(CacheEntry {
            fingerprint: row.get(0).map_err(|e| e.to_string())?,
            file_name: row.get(1).map_err(|e| e.to_string())?,
            file_size: row.get::<_, i64>(2).map_err(|e| e.to_string())? as u64,
            records: serde_json::from_str(&records_json).map_err(|e| e.to_string())?,
            schema: serde_json::from_str(&schema_json).map_err(|e| e.to_string())?,
            cost: serde_json::from_str(&cost_json).map_err(|e| e.to_string())?,
            kind: kind_str.parse().unwrap_or(DocumentKind::Unknown),
            hit_count: row.get::<_, i64>(7).map_err(|e| e.to_string())? as u64,
            created_at: NaiveDateTime::parse_from_str(&created_str, TIME_FORMAT)
                .map_err(|e| e.to_string())?,
            expires_at: NaiveDateTime::parse_from_str(&expires_str, TIME_FORMAT)
                .map_err(|e| e.to_string())?,
        })
    };
    Ok(build())
}

fn now_string() -> String {
    chrono::Utc::now().naive_utc().format(TIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn sample_records() -> Vec<Record> {
        let mut record = Record::new();
        record.insert("거래일시".into(), Value::Text("2024.03.01 10:00".into()));
        record.insert("입금".into(), Value::Number(1_500_000.0));
        vec![record]
    }

    fn sample_schema() -> Schema {
        vec!["거래일시".into(), "입금".into()]
    }

    fn put_sample(cache: &ParseCache, fingerprint: &str) {
        cache
            .put(
                fingerprint,
                "march.pdf",
                1234,
                &sample_records(),
                &sample_schema(),
                &Cost {
                    prompt_tokens: 100,
                    completion_tokens: 50,
                    usd: 0.01,
                    krw: 13.5,
                },
                DocumentKind::TextPdf,
            )
            .unwrap();
    }

    #[test]
    fn put_then_get_roundtrips() {
        let cache = ParseCache::open_in_memory(30).unwrap();
        put_sample(&cache, "abc123");

        let entry = cache.get("abc123").unwrap().unwrap();
        assert_eq!(entry.file_name, "march.pdf");
        assert_eq!(entry.file_size, 1234);
        assert_eq!(entry.records, sample_records());
        assert_eq!(entry.schema, sample_schema());
        assert_eq!(entry.kind, DocumentKind::TextPdf);
        assert_eq!(entry.cost.prompt_tokens, 100);
        assert!(entry.expires_at > entry.created_at);
    }

    #[test]
    fn miss_returns_none() {
        let cache = ParseCache::open_in_memory(30).unwrap();
        assert!(cache.get("missing").unwrap().is_none());
    }

    #[test]
    fn get_increments_hit_count() {
        let cache = ParseCache::open_in_memory(30).unwrap();
        put_sample(&cache, "hits");

        assert_eq!(cache.get("hits").unwrap().unwrap().hit_count, 0);
        assert_eq!(cache.get("hits").unwrap().unwrap().hit_count, 1);
        assert_eq!(cache.get("hits").unwrap().unwrap().hit_count, 2);
    }

    #[test]
    fn put_is_idempotent_per_fingerprint() {
        let cache = ParseCache::open_in_memory(30).unwrap();
        put_sample(&cache, "same");
        put_sample(&cache, "same");

        let conn = cache.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM parse_cache", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn delete_removes_entry() {
        let cache = ParseCache::open_in_memory(30).unwrap();
        put_sample(&cache, "gone");
        assert!(cache.delete("gone").unwrap());
        assert!(!cache.delete("gone").unwrap());
        assert!(cache.get("gone").unwrap().is_none());
    }

    #[test]
    fn expired_entries_are_misses_and_reaped() {
        // TTL of -1 day: entries are born expired.
        let cache = ParseCache::open_in_memory(-1).unwrap();
        put_sample(&cache, "stale");

        assert!(cache.get("stale").unwrap().is_none());
        assert_eq!(cache.reap_expired().unwrap(), 1);
        assert_eq!(cache.reap_expired().unwrap(), 0);
    }

    #[test]
    fn reap_leaves_live_entries() {
        let cache = ParseCache::open_in_memory(30).unwrap();
        put_sample(&cache, "fresh");
        assert_eq!(cache.reap_expired().unwrap(), 0);
        assert!(cache.get("fresh").unwrap().is_some());
    }

    #[test]
    fn opens_on_disk_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite3");
        {
            let cache = ParseCache::open(&path, 30).unwrap();
            put_sample(&cache, "durable");
        }
        let cache = ParseCache::open(&path, 30).unwrap();
        assert!(cache.get("durable").unwrap().is_some());
    }

    #[test]
    fn record_column_order_survives_roundtrip() {
        let cache = ParseCache::open_in_memory(30).unwrap();
        put_sample(&cache, "ordered");
        let entry = cache.get("ordered").unwrap().unwrap();
        let keys: Vec<_> = entry.records[0].keys().cloned().collect();
        assert_eq!(keys, vec!["거래일시", "입금"]);
    }
}
