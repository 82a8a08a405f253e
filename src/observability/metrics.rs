//! Query counters
//!
//! - Counters only, monotonic
//! - Relaxed atomics; exact totals, no cross-counter consistency

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for query compilation and execution
#[derive(Debug, Default)]
pub struct QueryMetrics {
    queries_compiled: AtomicU64,
    index_queries: AtomicU64,
    full_scans: AtomicU64,
    scan_fallbacks: AtomicU64,
    leaf_lookups: AtomicU64,
    rows_returned: AtomicU64,
    store_failures: AtomicU64,
}

impl QueryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_compiled(&self) {
        self.queries_compiled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_index_queries(&self) {
        self.index_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_full_scans(&self) {
        self.full_scans.fetch_add(1, Ordering::Relaxed);
    }

    /// A filter could not be compiled and degraded to a full scan
    pub fn increment_scan_fallbacks(&self) {
        self.scan_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// One index-clause lookup was issued for an equality leaf
    pub fn add_leaf_lookups(&self, count: u64) {
        self.leaf_lookups.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_rows_returned(&self, rows: u64) {
        self.rows_returned.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn increment_store_failures(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries_compiled: self.queries_compiled.load(Ordering::Relaxed),
            index_queries: self.index_queries.load(Ordering::Relaxed),
            full_scans: self.full_scans.load(Ordering::Relaxed),
            scan_fallbacks: self.scan_fallbacks.load(Ordering::Relaxed),
            leaf_lookups: self.leaf_lookups.load(Ordering::Relaxed),
            rows_returned: self.rows_returned.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
        }
    }
}

/// Immutable counter values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub queries_compiled: u64,
    pub index_queries: u64,
    pub full_scans: u64,
    pub scan_fallbacks: u64,
    pub leaf_lookups: u64,
    pub rows_returned: u64,
    pub store_failures: u64,
}

impl MetricsSnapshot {
    /// Serialize as a single JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
