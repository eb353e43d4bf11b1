//! In-memory query statistics.
//!
//! Process-lifetime counters over the query stream: totals, outcomes,
//! and per-type counts for the types this server specializes in. The
//! counters are atomic and reset with the process; durable per-client
//! tallies live in the record store instead.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::wire::QueryKind;

/// Atomic counters over every question this process has handled.
#[derive(Debug)]
pub struct QueryStats {
    started_at: DateTime<Utc>,
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    a: AtomicU64,
    aaaa: AtomicU64,
    soa: AtomicU64,
    ns: AtomicU64,
}

/// A point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub total_queries: u64,
    pub successful_queries: u64,
    pub failed_queries: u64,
    pub a_queries: u64,
    pub aaaa_queries: u64,
    pub soa_queries: u64,
    pub ns_queries: u64,
}

impl QueryStats {
    /// Create a zeroed counter set stamped with the current time.
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            total: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            a: AtomicU64::new(0),
            aaaa: AtomicU64::new(0),
            soa: AtomicU64::new(0),
            ns: AtomicU64::new(0),
        }
    }

    /// Count an inbound question. Called for every question handled,
    /// before its outcome is known.
    pub fn record_query(&self, kind: QueryKind) {
        self.total.fetch_add(1, Ordering::Relaxed);
        match kind {
            QueryKind::A => {
                self.a.fetch_add(1, Ordering::Relaxed);
            }
            QueryKind::Aaaa => {
                self.aaaa.fetch_add(1, Ordering::Relaxed);
            }
            QueryKind::Soa => {
                self.soa.fetch_add(1, Ordering::Relaxed);
            }
            QueryKind::Ns => {
                self.ns.fetch_add(1, Ordering::Relaxed);
            }
            QueryKind::Other(_) => {}
        }
    }

    /// Count a query outcome, derived from the final response code.
    pub fn record_outcome(&self, success: bool) {
        if success {
            self.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A copy of the current counter values.
    ///
    /// Counters are read one at a time; no ordering is guaranteed across
    /// them while queries are in flight.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started_at: self.started_at,
            total_queries: self.total.load(Ordering::Relaxed),
            successful_queries: self.successful.load(Ordering::Relaxed),
            failed_queries: self.failed.load(Ordering::Relaxed),
            a_queries: self.a.load(Ordering::Relaxed),
            aaaa_queries: self.aaaa.load(Ordering::Relaxed),
            soa_queries: self.soa.load(Ordering::Relaxed),
            ns_queries: self.ns.load(Ordering::Relaxed),
        }
    }
}

impl Default for QueryStats {
    fn default() -> Self {
        Self::new()
    }
}
