//! Snapshots fetched from one replica for one entity type.
//!
//! A snapshot is created fresh on every reconciliation pass and discarded once
//! its decisions are applied. Records that failed to decode travel alongside
//! the good ones so the report can count them.

use crate::error::DataShapeError;

/// Which replica a snapshot was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Remote,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Local => f.write_str("local"),
            Side::Remote => f.write_str("remote"),
        }
    }
}

/// All decodable records of one entity type in one replica, plus the ones
/// that were skipped because they could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<V> {
    pub records: Vec<V>,
    pub rejected: Vec<DataShapeError>,
}

impl<V> Default for Snapshot<V> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

impl<V> Snapshot<V> {
    /// A snapshot of cleanly decoded records.
    pub fn new(records: Vec<V>) -> Self {
        Self {
            records,
            rejected: Vec::new(),
        }
    }

    /// Split decoder output into good records and counted rejects.
    pub fn decode<I>(results: I) -> Self
    where
        I: IntoIterator<Item = Result<V, DataShapeError>>,
    {
        let mut snapshot = Snapshot::default();
        for result in results {
            match result {
                Ok(record) => snapshot.records.push(record),
                Err(err) => snapshot.rejected.push(err),
            }
        }
        snapshot
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }
}

impl<V> FromIterator<V> for Snapshot<V> {
    fn from_iter<T: IntoIterator<Item = V>>(iter: T) -> Self {
        Snapshot::new(iter.into_iter().collect())
    }
}
