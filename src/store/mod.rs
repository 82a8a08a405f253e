//! Wide-column store client interface
//!
//! The core never speaks a wire protocol. It drives a [`StoreClient`] with
//! two primitives:
//!
//! - secondary-index lookups restricted to one [`IndexClause`]
//! - key-range reads, used for paginated full-table scans
//!
//! [`MemoryStore`] is an in-process implementation with the same semantics.

mod errors;
mod memory;

pub use errors::{StoreError, StoreResult};
pub use memory::MemoryStore;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observability::{Logger, Severity};
use crate::query::{CandidateKeys, Columns, IndexClause};

/// One stored cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
    /// Write timestamp in microseconds
    pub timestamp: i64,
}

impl Column {
    pub fn new(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, timestamp: i64) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            timestamp,
        }
    }
}

/// A row key with the columns fetched for it, in store order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySlice {
    pub key: Vec<u8>,
    pub columns: Vec<Column>,
}

impl KeySlice {
    pub fn new(key: impl Into<Vec<u8>>, columns: Vec<Column>) -> Self {
        Self {
            key: key.into(),
            columns,
        }
    }

    /// Convert into a candidate row, or `None` when no selected column was present
    pub fn into_columns(self) -> Option<Columns> {
        if self.columns.is_empty() {
            return None;
        }
        let mut columns = Columns::new(self.key);
        for column in &self.columns {
            columns.add_result(column);
        }
        Some(columns)
    }
}

/// Range of row keys. `start_key` is inclusive; an empty key is unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
    pub count: u32,
}

impl KeyRange {
    /// Every row, at most `count` of them
    pub fn all(count: u32) -> Self {
        Self {
            start_key: Vec::new(),
            end_key: Vec::new(),
            count,
        }
    }

    pub fn with_start_key(mut self, start_key: impl Into<Vec<u8>>) -> Self {
        self.start_key = start_key.into();
        self
    }
}

/// Names of the columns to fetch for every returned row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSelection {
    names: Vec<Vec<u8>>,
}

impl ColumnSelection {
    pub fn new<I, C>(names: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn names(&self) -> &[Vec<u8>] {
        &self.names
    }

    pub fn contains(&self, name: &[u8]) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Consistency level requested for reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    One,
    #[default]
    Quorum,
    All,
}

impl Consistency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Consistency::One => "ONE",
            Consistency::Quorum => "QUORUM",
            Consistency::All => "ALL",
        }
    }
}

/// Per-request options passed to every store call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    pub consistency: Consistency,
    /// Upper bound for one request; enforced by the client
    pub timeout: Duration,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            consistency: Consistency::Quorum,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Store operations the query layer depends on.
///
/// Implementations must be safe to call from several threads when `Or`
/// branches execute concurrently.
pub trait StoreClient {
    /// Rows matching every expression of `clause`, restricted to `select`.
    ///
    /// At most `clause.count()` rows, starting at `clause.start_key()`.
    fn get_indexed_columns(
        &self,
        column_family: &str,
        clause: &IndexClause,
        select: &ColumnSelection,
        options: &ReadOptions,
    ) -> StoreResult<Vec<KeySlice>>;

    /// Rows in `range`, restricted to `select`.
    fn get_columns_from_rows(
        &self,
        column_family: &str,
        range: &KeyRange,
        select: &ColumnSelection,
        options: &ReadOptions,
    ) -> StoreResult<Vec<KeySlice>>;
}

impl<S: StoreClient + ?Sized> StoreClient for &S {
    fn get_indexed_columns(
        &self,
        column_family: &str,
        clause: &IndexClause,
        select: &ColumnSelection,
        options: &ReadOptions,
    ) -> StoreResult<Vec<KeySlice>> {
        (**self).get_indexed_columns(column_family, clause, select, options)
    }

    fn get_columns_from_rows(
        &self,
        column_family: &str,
        range: &KeyRange,
        select: &ColumnSelection,
        options: &ReadOptions,
    ) -> StoreResult<Vec<KeySlice>> {
        (**self).get_columns_from_rows(column_family, range, select, options)
    }
}

/// Scan every row of `column_family`, at most `limit` of them.
///
/// Pages are requested with the last returned key as the next start key
/// until a short page comes back. The start key is inclusive, so the first
/// row of every page after the first is the previous page's last row and is
/// skipped. Rows holding none of the selected columns are skipped.
pub fn paginated_scan<S: StoreClient + ?Sized>(
    store: &S,
    column_family: &str,
    select: &ColumnSelection,
    limit: usize,
    page_size: u32,
    options: &ReadOptions,
) -> StoreResult<CandidateKeys> {
    let mut candidates = CandidateKeys::new();
    let mut start_key: Option<Vec<u8>> = None;
    let mut pages = 0usize;

    while candidates.len() < limit {
        let remaining = (limit - candidates.len()) as u64;
        let page = u64::from(page_size.max(1));
        // later pages start on the previous last key, so ask for one more row
        let wanted = match start_key {
            None => remaining.min(page),
            Some(_) => (remaining + 1).min(page + 1),
        };
        let count = wanted.min(u64::from(u32::MAX)) as u32;

        let mut range = KeyRange::all(count);
        if let Some(key) = &start_key {
            range = range.with_start_key(key.clone());
        }

        let page = store.get_columns_from_rows(column_family, &range, select, options)?;
        pages += 1;

        let returned = page.len();
        let last_key = page.last().map(|slice| slice.key.clone());

        for (i, slice) in page.into_iter().enumerate() {
            if i == 0 && start_key.as_deref() == Some(slice.key.as_slice()) {
                continue;
            }
            if candidates.len() >= limit {
                break;
            }
            if let Some(columns) = slice.into_columns() {
                candidates.insert(columns);
            }
        }

        if returned < count as usize {
            break;
        }
        match last_key {
            // no progress possible if the page ends on the key it started from
            Some(key) if start_key.as_deref() != Some(key.as_slice()) => start_key = Some(key),
            _ => break,
        }
    }

    if Logger::enabled(Severity::Trace) {
        let pages = pages.to_string();
        let rows = candidates.len().to_string();
        Logger::trace(
            "FULL_SCAN_COMPLETE",
            &[
                ("column_family", column_family),
                ("pages", pages.as_str()),
                ("rows", rows.as_str()),
            ],
        );
    }

    Ok(candidates)
}
