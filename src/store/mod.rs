//! Sorted key-value storage
//!
//! The importer writes through [`WriteBatch`] and [`Store::commit`]; queries
//! read through a [`Snapshot`] taken per request. Keys are ordered by raw
//! bytes, and that order is the only one the query side relies on.
//!
//! ## Backends
//!
//! - [`MemStore`]: copy-on-write B-tree, always available
//! - `RedbStore`: on-disk redb database (feature `redb`)

use crate::error::{BatchFull, StoreError};
use crate::types::BatchLimits;

pub mod memory;
#[cfg(feature = "redb")]
pub mod redb;

pub use memory::{MemSnapshot, MemStore};
#[cfg(feature = "redb")]
pub use self::redb::{RedbSnapshot, RedbStore};

/// A sorted, persistent map from flat keys to scalar bytes
pub trait Store: Send + Sync {
    type Snapshot: Snapshot;

    /// Start an empty batch bounded by this store's limits
    fn begin_batch(&self) -> WriteBatch;

    /// Apply every entry of `batch` atomically
    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Consistent read view; later commits are not visible through it
    fn snapshot(&self) -> Result<Self::Snapshot, StoreError>;
}

/// Point-in-time read view of a [`Store`]
pub trait Snapshot {
    type Cursor<'a>: Cursor
    where
        Self: 'a;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Cursor over every key starting with `prefix`, in ascending byte order
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Self::Cursor<'_>, StoreError>;
}

/// Restartable ordered iteration over one key prefix
pub trait Cursor {
    /// Reposition at the first key `>= key` that still carries the prefix
    fn seek(&mut self, key: &[u8]) -> Result<(), StoreError>;

    /// Next record, or `None` once the prefix is exhausted
    fn next_record(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError>;
}

/// Pending writes, accumulated until committed
///
/// Every backend commits from this buffer, so the size accounting behind the
/// batch-full signal is the same regardless of where the records end up.
#[derive(Debug)]
pub struct WriteBatch {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    bytes: usize,
    limits: BatchLimits,
}

impl WriteBatch {
    pub fn new(limits: BatchLimits) -> Self {
        WriteBatch {
            entries: Vec::new(),
            bytes: 0,
            limits,
        }
    }

    /// Queue one entry, or hand it back if it would overflow the batch
    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), BatchFull> {
        let size = key.len() + value.len();
        if self.entries.len() >= self.limits.max_entries || self.bytes + size > self.limits.max_bytes {
            return Err(BatchFull { key, value });
        }
        self.bytes += size;
        self.entries.push((key, value));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Summed key + value bytes queued so far
    pub fn size(&self) -> usize {
        self.bytes
    }

    pub fn into_entries(self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.entries
    }
}
