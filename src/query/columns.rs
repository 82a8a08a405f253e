//! Row results accumulated by query execution
//!
//! A [`Columns`] is one candidate row: its key plus the subset of columns the
//! query selected. [`CandidateKeys`] is a set of rows keyed by row key, so the
//! same row returned by two `Or` branches appears once.

use std::collections::btree_map::{self, BTreeMap};
use std::hash::{Hash, Hasher};

use crate::store::Column;

/// The selected columns of one candidate row.
///
/// Equality and hashing use the row key only.
#[derive(Debug, Clone)]
pub struct Columns {
    key: Vec<u8>,
    values: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl Columns {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            values: BTreeMap::new(),
        }
    }

    /// Record one fetched column
    pub fn add_result(&mut self, column: &Column) {
        self.values.insert(column.name.clone(), column.value.clone());
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn column_value(&self, name: &[u8]) -> Option<&[u8]> {
        self.values.get(name).map(Vec::as_slice)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &[u8]> {
        self.values.keys().map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PartialEq for Columns {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Columns {}

impl Hash for Columns {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

/// Set of candidate rows keyed by row key, iterated in key order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateKeys {
    rows: BTreeMap<Vec<u8>, Columns>,
}

impl CandidateKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row; a row already present under the same key is replaced.
    pub fn insert(&mut self, columns: Columns) {
        self.rows.insert(columns.key.clone(), columns);
    }

    /// Union with `other` by row key
    pub fn merge(&mut self, other: CandidateKeys) {
        self.rows.extend(other.rows);
    }

    pub fn get(&self, key: &[u8]) -> Option<&Columns> {
        self.rows.get(key)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.rows.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.rows.keys().map(Vec::as_slice)
    }

    pub fn iter(&self) -> btree_map::Values<'_, Vec<u8>, Columns> {
        self.rows.values()
    }

    pub fn into_vec(self) -> Vec<Columns> {
        self.rows.into_values().collect()
    }
}

impl FromIterator<Columns> for CandidateKeys {
    fn from_iter<I: IntoIterator<Item = Columns>>(iter: I) -> Self {
        let mut keys = CandidateKeys::new();
        for columns in iter {
            keys.insert(columns);
        }
        keys
    }
}

impl IntoIterator for CandidateKeys {
    type Item = Columns;
    type IntoIter = btree_map::IntoValues<Vec<u8>, Columns>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_values()
    }
}

impl<'a> IntoIterator for &'a CandidateKeys {
    type Item = &'a Columns;
    type IntoIter = btree_map::Values<'a, Vec<u8>, Columns>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(key: &str, id: &str) -> Columns {
        let mut columns = Columns::new(key);
        columns.add_result(&Column::new("id", id, 0));
        columns
    }

    #[test]
    fn test_columns_equality_uses_key_only() {
        assert_eq!(row("k1", "a"), row("k1", "b"));
        assert_ne!(row("k1", "a"), row("k2", "a"));
    }

    #[test]
    fn test_column_value_lookup() {
        let columns = row("k1", "42");
        assert_eq!(columns.column_value(b"id"), Some(&b"42"[..]));
        assert_eq!(columns.column_value(b"missing"), None);
        assert_eq!(columns.len(), 1);
    }

    #[test]
    fn test_merge_deduplicates_by_key() {
        let mut left: CandidateKeys = vec![row("k1", "a"), row("k2", "b")].into_iter().collect();
        let right: CandidateKeys = vec![row("k2", "b2"), row("k3", "c")].into_iter().collect();

        left.merge(right);

        assert_eq!(left.len(), 3);
        assert_eq!(
            left.keys().collect::<Vec<_>>(),
            vec![&b"k1"[..], &b"k2"[..], &b"k3"[..]]
        );
        // last write wins
        assert_eq!(left.get(b"k2").unwrap().column_value(b"id"), Some(&b"b2"[..]));
    }

    #[test]
    fn test_into_vec_in_key_order() {
        let keys: CandidateKeys = vec![row("b", "1"), row("a", "2")].into_iter().collect();
        let rows = keys.into_vec();
        assert_eq!(rows[0].key(), b"a");
        assert_eq!(rows[1].key(), b"b");
    }
}
