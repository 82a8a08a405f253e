//! In-process store
//!
//! Rows live in ordered maps per column family so lookups and range reads
//! return keys in byte order, which is what a byte-ordered partitioner
//! returns. Deleted rows keep their key with no columns until
//! [`MemoryStore::compact`] runs, matching how range reads can surface
//! tombstoned rows.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::Utc;

use super::{
    Column, ColumnSelection, KeyRange, KeySlice, ReadOptions, StoreClient, StoreError,
    StoreResult,
};
use crate::query::IndexClause;

type Row = BTreeMap<Vec<u8>, Column>;
type Family = BTreeMap<Vec<u8>, Row>;

/// Thread-safe in-memory implementation of [`StoreClient`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    families: RwLock<BTreeMap<String, Family>>,
    failure: RwLock<Option<StoreError>>,
    indexed_calls: AtomicU64,
    range_calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_column_family(&self, name: &str) -> StoreResult<()> {
        let mut families = self.families.write().map_err(|_| poisoned())?;
        families.entry(name.to_string()).or_default();
        Ok(())
    }

    /// Write one column, stamped with the current time
    pub fn insert(
        &self,
        column_family: &str,
        key: impl Into<Vec<u8>>,
        name: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> StoreResult<()> {
        let column = Column::new(name, value, Utc::now().timestamp_micros());
        let mut families = self.families.write().map_err(|_| poisoned())?;
        let family = families
            .get_mut(column_family)
            .ok_or_else(|| StoreError::UnknownColumnFamily(column_family.to_string()))?;
        family
            .entry(key.into())
            .or_default()
            .insert(column.name.clone(), column);
        Ok(())
    }

    /// Write several columns of one row
    pub fn insert_row<N, V>(
        &self,
        column_family: &str,
        key: impl Into<Vec<u8>>,
        columns: impl IntoIterator<Item = (N, V)>,
    ) -> StoreResult<()>
    where
        N: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        let key = key.into();
        for (name, value) in columns {
            self.insert(column_family, key.clone(), name, value)?;
        }
        Ok(())
    }

    /// Drop every column of a row. The key stays visible to range reads
    /// until [`compact`](Self::compact).
    pub fn delete_row(&self, column_family: &str, key: &[u8]) -> StoreResult<()> {
        let mut families = self.families.write().map_err(|_| poisoned())?;
        let family = families
            .get_mut(column_family)
            .ok_or_else(|| StoreError::UnknownColumnFamily(column_family.to_string()))?;
        if let Some(row) = family.get_mut(key) {
            row.clear();
        }
        Ok(())
    }

    /// Remove deleted rows from every column family
    pub fn compact(&self) -> StoreResult<()> {
        let mut families = self.families.write().map_err(|_| poisoned())?;
        for family in families.values_mut() {
            family.retain(|_, row| !row.is_empty());
        }
        Ok(())
    }

    /// Every subsequent call fails with `error` until [`clear_failure`](Self::clear_failure)
    pub fn fail_with(&self, error: StoreError) {
        if let Ok(mut failure) = self.failure.write() {
            *failure = Some(error);
        }
    }

    pub fn clear_failure(&self) {
        if let Ok(mut failure) = self.failure.write() {
            *failure = None;
        }
    }

    /// Number of secondary-index lookups served
    pub fn indexed_calls(&self) -> u64 {
        self.indexed_calls.load(Ordering::Relaxed)
    }

    /// Number of range reads served
    pub fn range_calls(&self) -> u64 {
        self.range_calls.load(Ordering::Relaxed)
    }

    fn check_failure(&self) -> StoreResult<()> {
        let failure = self.failure.read().map_err(|_| poisoned())?;
        match failure.as_ref() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("store lock poisoned".to_string())
}

fn project(key: &[u8], row: &Row, select: &ColumnSelection) -> KeySlice {
    let columns = select
        .names()
        .iter()
        .filter_map(|name| row.get(name).cloned())
        .collect();
    KeySlice::new(key, columns)
}

fn lower_bound(start_key: &[u8]) -> Bound<&[u8]> {
    if start_key.is_empty() {
        Bound::Unbounded
    } else {
        Bound::Included(start_key)
    }
}

impl StoreClient for MemoryStore {
    fn get_indexed_columns(
        &self,
        column_family: &str,
        clause: &IndexClause,
        select: &ColumnSelection,
        _options: &ReadOptions,
    ) -> StoreResult<Vec<KeySlice>> {
        self.indexed_calls.fetch_add(1, Ordering::Relaxed);
        self.check_failure()?;

        if clause.is_empty() {
            return Err(StoreError::InvalidRequest(
                "index clause has no expressions".to_string(),
            ));
        }

        let families = self.families.read().map_err(|_| poisoned())?;
        let family = families
            .get(column_family)
            .ok_or_else(|| StoreError::UnknownColumnFamily(column_family.to_string()))?;

        let rows = family
            .range::<[u8], _>((lower_bound(clause.start_key()), Bound::Unbounded))
            .filter(|&(_, row)| {
                clause.matches(move |name| row.get(name).map(|column| column.value.as_slice()))
            })
            .take(clause.count() as usize)
            .map(|(key, row)| project(key, row, select))
            .collect();

        Ok(rows)
    }

    fn get_columns_from_rows(
        &self,
        column_family: &str,
        range: &KeyRange,
        select: &ColumnSelection,
        _options: &ReadOptions,
    ) -> StoreResult<Vec<KeySlice>> {
        self.range_calls.fetch_add(1, Ordering::Relaxed);
        self.check_failure()?;

        let families = self.families.read().map_err(|_| poisoned())?;
        let family = families
            .get(column_family)
            .ok_or_else(|| StoreError::UnknownColumnFamily(column_family.to_string()))?;

        let upper = if range.end_key.is_empty() {
            Bound::Unbounded
        } else if !range.start_key.is_empty() && range.start_key > range.end_key {
            return Ok(Vec::new());
        } else {
            Bound::Included(range.end_key.as_slice())
        };

        let rows = family
            .range::<[u8], _>((lower_bound(&range.start_key), upper))
            .take(range.count as usize)
            .map(|(key, row)| project(key, row, select))
            .collect();

        Ok(rows)
    }
}
