//! SQLite-backed record store.
//!
//! Holds the mutable address records the resolver serves and the durable
//! per-client query tallies. Connections come from an r2d2 pool with WAL
//! journaling; everything here is synchronous, and async callers run
//! these calls on the blocking pool.

use std::{fs, path::Path, time::Duration};

use chrono::{DateTime, Utc};
use log::info;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::errors::DnsError;

/// Identifier of the loopback record planted at startup.
pub const BOOTSTRAP_RECORD_ID: &str = "d9e3b3a0-5f8a-4f7e-9c1b-2a6d1c4e8f21";

/// A stored address record.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    /// Opaque stable identifier; records are keyed by it.
    pub id: String,
    /// Fully qualified domain, lower-case, no trailing dot.
    pub domain: String,
    /// IPv4 address in dotted form, if bound.
    pub ipv4: Option<String>,
    /// IPv6 address in colon form, if bound.
    pub ipv6: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Durable per-client query counters for one `(client, query type)` pair.
#[derive(Debug, Clone)]
pub struct QueryTally {
    pub ip_address: String,
    pub query_type: u16,
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub last_seen_at: DateTime<Utc>,
}

/// Normalize a domain for storage and lookup.
pub(crate) fn normalize_domain(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Record store over a pooled SQLite database.
#[derive(Clone)]
pub struct RecordStore {
    pool: Pool<SqliteConnectionManager>,
}

impl RecordStore {
    /// Open the store at `db_path`, creating the file and its parent
    /// directory as needed.
    ///
    /// Applies the schema and plants the bootstrap `loopback.<zone>`
    /// record so a fresh install resolves something immediately.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file.
    /// * `zone` - The zone this server answers for.
    ///
    /// # Returns
    /// A `Result` containing the opened `RecordStore` or a `DnsError`.
    pub fn open(db_path: &str, zone: &str) -> Result<Self, DnsError> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.busy_timeout(Duration::from_secs(5))
        });
        let pool = Pool::builder().build(manager)?;

        let store = Self { pool };
        store.apply_schema()?;
        store.plant_bootstrap_record(zone)?;
        info!("Record store ready at {}", db_path);
        Ok(store)
    }

    fn apply_schema(&self) -> Result<(), DnsError> {
        let conn = self.pool.get()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                domain TEXT NOT NULL UNIQUE,
                ipv4 TEXT,
                ipv6 TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS query_log (
                ip_address TEXT NOT NULL,
                query_type INTEGER NOT NULL,
                total_queries INTEGER NOT NULL DEFAULT 0,
                successful_queries INTEGER NOT NULL DEFAULT 0,
                failed_queries INTEGER NOT NULL DEFAULT 0,
                last_query_timestamp TEXT NOT NULL,
                PRIMARY KEY (ip_address, query_type)
            );",
        )?;
        Ok(())
    }

    /// Upsert the well-known loopback record for the zone.
    fn plant_bootstrap_record(&self, zone: &str) -> Result<(), DnsError> {
        let domain = format!("loopback.{}", normalize_domain(zone));
        self.upsert(BOOTSTRAP_RECORD_ID, &domain, Some("127.0.0.1"), Some("::1"))?;
        Ok(())
    }

    /// Look up the record bound to a domain.
    ///
    /// # Arguments
    /// * `domain` - The domain to look up; normalized before the query.
    ///
    /// # Returns
    /// A `Result` containing the record when one is bound to the domain.
    pub fn find_by_domain(&self, domain: &str) -> Result<Option<Record>, DnsError> {
        let conn = self.pool.get()?;
        let record = conn
            .query_row(
                "SELECT id, domain, ipv4, ipv6, created_at, updated_at
                 FROM records WHERE domain = ?1",
                params![normalize_domain(domain)],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Insert a record, or update it in place when the id already exists.
    ///
    /// The domain is normalized before storage. A domain already bound to
    /// a different id violates the unique index and surfaces as a
    /// database error.
    ///
    /// # Arguments
    /// * `id` - The record identifier.
    /// * `domain` - The domain to bind.
    /// * `ipv4` - Dotted IPv4 address, if any.
    /// * `ipv6` - Colon-form IPv6 address, if any.
    ///
    /// # Returns
    /// A `Result` containing the stored record.
    pub fn upsert(
        &self,
        id: &str,
        domain: &str,
        ipv4: Option<&str>,
        ipv6: Option<&str>,
    ) -> Result<Record, DnsError> {
        let conn = self.pool.get()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO records (id, domain, ipv4, ipv6, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 domain = excluded.domain,
                 ipv4 = excluded.ipv4,
                 ipv6 = excluded.ipv6,
                 updated_at = excluded.updated_at",
            params![id, normalize_domain(domain), ipv4, ipv6, now],
        )?;
        let record = conn.query_row(
            "SELECT id, domain, ipv4, ipv6, created_at, updated_at
             FROM records WHERE id = ?1",
            params![id],
            row_to_record,
        )?;
        Ok(record)
    }

    /// Delete the record with the given id.
    ///
    /// # Returns
    /// `true` when a record existed and was removed.
    pub fn delete(&self, id: &str) -> Result<bool, DnsError> {
        let conn = self.pool.get()?;
        let affected = conn.execute("DELETE FROM records WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    /// Whether any record is bound to the domain.
    pub fn domain_in_use(&self, domain: &str) -> Result<bool, DnsError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE domain = ?1",
            params![normalize_domain(domain)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Whether the domain is bound to a record with a different id.
    pub fn domain_taken_by_other(&self, domain: &str, id: &str) -> Result<bool, DnsError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE domain = ?1 AND id != ?2",
            params![normalize_domain(domain), id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Fold one query into the durable per-client tally.
    ///
    /// A single upsert statement keeps concurrent callers from losing
    /// counts: the first sighting of a `(client, query type)` pair
    /// inserts the row, later sightings increment it in place.
    ///
    /// # Arguments
    /// * `ip_address` - The client address in text form.
    /// * `query_type` - The wire QTYPE of the query.
    /// * `found` - Whether the query produced an address answer.
    pub fn upsert_tally(
        &self,
        ip_address: &str,
        query_type: u16,
        found: bool,
    ) -> Result<(), DnsError> {
        let conn = self.pool.get()?;
        let now = Utc::now();
        let (successful, failed) = if found { (1i64, 0i64) } else { (0, 1) };
        conn.execute(
            "INSERT INTO query_log
                 (ip_address, query_type, total_queries, successful_queries,
                  failed_queries, last_query_timestamp)
             VALUES (?1, ?2, 1, ?3, ?4, ?5)
             ON CONFLICT(ip_address, query_type) DO UPDATE SET
                 total_queries = total_queries + 1,
                 successful_queries = successful_queries + excluded.successful_queries,
                 failed_queries = failed_queries + excluded.failed_queries,
                 last_query_timestamp = excluded.last_query_timestamp",
            params![ip_address, query_type, successful, failed, now],
        )?;
        Ok(())
    }

    /// Read back the tally for a `(client, query type)` pair.
    pub fn tally(&self, ip_address: &str, query_type: u16) -> Result<Option<QueryTally>, DnsError> {
        let conn = self.pool.get()?;
        let tally = conn
            .query_row(
                "SELECT ip_address, query_type, total_queries, successful_queries,
                        failed_queries, last_query_timestamp
                 FROM query_log WHERE ip_address = ?1 AND query_type = ?2",
                params![ip_address, query_type],
                |row| {
                    Ok(QueryTally {
                        ip_address: row.get(0)?,
                        query_type: row.get::<_, i64>(1)? as u16,
                        total: row.get::<_, i64>(2)? as u64,
                        successful: row.get::<_, i64>(3)? as u64,
                        failed: row.get::<_, i64>(4)? as u64,
                        last_seen_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(tally)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
    Ok(Record {
        id: row.get(0)?,
        domain: row.get(1)?,
        ipv4: row.get(2)?,
        ipv6: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
