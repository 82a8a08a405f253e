//! Query configuration
//!
//! Supplied by the embedding application (file, env, builder) and fixed for
//! the lifetime of a [`crate::compiler::QueryCompiler`]. Every field has a
//! default, so a partial JSON document is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observability::Severity;
use crate::query::{QueryError, QueryResult, DEFAULT_MAX_BRANCH_THREADS};
use crate::store::{Consistency, ReadOptions};

/// Row limit applied when the request carries no range
pub const DEFAULT_ROW_LIMIT: u32 = 1000;

/// Rows per page requested by full-table scans
pub const DEFAULT_SCAN_PAGE_SIZE: u32 = 100;

/// Store request timeout in milliseconds
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Maximum rows returned when no range is given.
    pub default_row_limit: u32,

    /// Page size for full-table scans.
    pub scan_page_size: u32,

    /// Consistency level for every store read.
    pub consistency: Consistency,

    /// Upper bound for a single store request.
    pub request_timeout_ms: u64,

    /// Execute the two branches of each `Or` concurrently.
    ///
    /// Sequential execution returns the same rows; this only trades threads
    /// for latency.
    pub parallel_branches: bool,

    /// Threads one query may spawn when `parallel_branches` is set.
    pub max_branch_threads: usize,

    /// Minimum severity written by the logger.
    pub log_level: Severity,
}

impl QueryConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> QueryResult<Self> {
        let config: QueryConfig = serde_json::from_str(json)
            .map_err(|e| QueryError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> QueryResult<()> {
        if self.default_row_limit == 0 {
            return Err(QueryError::invalid_config(
                "default_row_limit must be greater than zero",
            ));
        }
        if self.scan_page_size == 0 {
            return Err(QueryError::invalid_config(
                "scan_page_size must be greater than zero",
            ));
        }
        if self.parallel_branches && self.max_branch_threads == 0 {
            return Err(QueryError::invalid_config(
                "max_branch_threads must be greater than zero when parallel_branches is set",
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(QueryError::invalid_config(
                "request_timeout_ms must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Options attached to every store call
    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            consistency: self.consistency,
            timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }

    pub fn with_parallel_branches(mut self, parallel: bool) -> Self {
        self.parallel_branches = parallel;
        self
    }

    pub fn with_max_branch_threads(mut self, threads: usize) -> Self {
        self.max_branch_threads = threads;
        self
    }

    pub fn with_default_row_limit(mut self, limit: u32) -> Self {
        self.default_row_limit = limit;
        self
    }

    pub fn with_scan_page_size(mut self, page_size: u32) -> Self {
        self.scan_page_size = page_size;
        self
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_row_limit: DEFAULT_ROW_LIMIT,
            scan_page_size: DEFAULT_SCAN_PAGE_SIZE,
            consistency: Consistency::Quorum,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            parallel_branches: false,
            max_branch_threads: DEFAULT_MAX_BRANCH_THREADS,
            log_level: Severity::Info,
        }
    }
}
