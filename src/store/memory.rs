//! In-memory store backed by a copy-on-write B-tree
//!
//! Commits replace the shared map through `Arc::make_mut`, so a snapshot is
//! just a clone of the current `Arc`: taking one never waits on another
//! snapshot and never sees commits that happen afterwards.

use super::{Cursor, Snapshot, Store, WriteBatch};
use crate::error::StoreError;
use crate::types::BatchLimits;
use parking_lot::RwLock;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

type Records = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Debug, Default)]
pub struct MemStore {
    data: RwLock<Arc<Records>>,
    limits: BatchLimits,
}

impl MemStore {
    pub fn new() -> Self {
        MemStore::default()
    }

    pub fn with_limits(limits: BatchLimits) -> Self {
        MemStore {
            data: RwLock::new(Arc::new(BTreeMap::new())),
            limits,
        }
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Store for MemStore {
    type Snapshot = MemSnapshot;

    fn begin_batch(&self) -> WriteBatch {
        WriteBatch::new(self.limits)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut data = self.data.write();
        Arc::make_mut(&mut data).extend(batch.into_entries());
        Ok(())
    }

    fn snapshot(&self) -> Result<MemSnapshot, StoreError> {
        Ok(MemSnapshot {
            data: Arc::clone(&self.data.read()),
        })
    }
}

/// Frozen view of a [`MemStore`]
#[derive(Debug, Clone)]
pub struct MemSnapshot {
    data: Arc<Records>,
}

impl Snapshot for MemSnapshot {
    type Cursor<'a> = MemCursor<'a>;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<MemCursor<'_>, StoreError> {
        let data: &Records = self.data.as_ref();
        Ok(MemCursor {
            data,
            prefix: prefix.to_vec(),
            range: data.range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded)),
            done: false,
        })
    }
}

pub struct MemCursor<'a> {
    data: &'a Records,
    prefix: Vec<u8>,
    range: btree_map::Range<'a, Vec<u8>, Vec<u8>>,
    done: bool,
}

impl Cursor for MemCursor<'_> {
    fn seek(&mut self, key: &[u8]) -> Result<(), StoreError> {
        let start = if key < self.prefix.as_slice() {
            self.prefix.as_slice()
        } else {
            key
        };
        let data = self.data;
        self.range = data.range::<[u8], _>((Bound::Included(start), Bound::Unbounded));
        self.done = false;
        Ok(())
    }

    fn next_record(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        if self.done {
            return Ok(None);
        }
        match self.range.next() {
            Some((key, value)) if key.starts_with(&self.prefix) => Ok(Some((key.clone(), value.clone()))),
            _ => {
                self.done = true;
                Ok(None)
            }
        }
    }
}
