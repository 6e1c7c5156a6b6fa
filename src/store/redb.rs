//! On-disk store backed by a single redb table
//!
//! redb has no notion of an oversized transaction, so batches are buffered
//! in a [`WriteBatch`] and written in one redb write transaction on commit.

use super::{Cursor, Snapshot, Store, WriteBatch};
use crate::error::{ImportError, StoreError};
use crate::types::{BatchLimits, ImportStats, KilnConfig};
use redb::{Database, ReadOnlyTable, ReadTransaction, TableDefinition};
use std::fs;
use std::io::{self, Read};
use std::ops::Bound;
use std::path::{Path, PathBuf};

const RECORDS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("records");

fn backend(err: impl Into<redb::Error>) -> StoreError {
    StoreError::Backend(err.into().to_string())
}

#[derive(Debug)]
pub struct RedbStore {
    db: Database,
    limits: BatchLimits,
}

impl RedbStore {
    /// Open the database at `path`, creating the file and table if missing
    pub fn create<P: AsRef<Path>>(path: P, limits: BatchLimits) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(backend)?;
        let txn = db.begin_write().map_err(backend)?;
        txn.open_table(RECORDS).map_err(backend)?;
        txn.commit().map_err(backend)?;
        Ok(RedbStore { db, limits })
    }

    /// Open an existing database without touching its contents
    pub fn open<P: AsRef<Path>>(path: P, limits: BatchLimits) -> Result<Self, StoreError> {
        let db = Database::open(path).map_err(backend)?;
        Ok(RedbStore { db, limits })
    }

    /// Build a new database at `path` from the JSON document in `reader`
    ///
    /// The import writes into a `.partial` sibling that is renamed onto
    /// `path` only after the last batch commits. A failed or interrupted
    /// import therefore never leaves a database at `path` that a later
    /// [`RedbStore::open`] would serve as complete.
    pub fn create_from_json<P: AsRef<Path>, R: Read>(
        path: P,
        reader: R,
        config: &KilnConfig,
    ) -> Result<(Self, ImportStats), ImportError> {
        let path = path.as_ref();
        let staging = staging_path(path);

        // Left behind by an interrupted run
        match fs::remove_file(&staging) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(StoreError::Io(err).into()),
            _ => {}
        }

        let store = RedbStore::create(&staging, config.batch_limits)?;
        let stats = match crate::import_json(reader, &store, config) {
            Ok(stats) => stats,
            Err(err) => {
                drop(store);
                if let Err(cleanup) = fs::remove_file(&staging) {
                    tracing::warn!(path = %staging.display(), error = %cleanup, "failed to remove partial database");
                }
                return Err(err);
            }
        };

        drop(store);
        fs::rename(&staging, path).map_err(StoreError::Io)?;
        let store = RedbStore::open(path, config.batch_limits)?;
        Ok((store, stats))
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

impl Store for RedbStore {
    type Snapshot = RedbSnapshot;

    fn begin_batch(&self) -> WriteBatch {
        WriteBatch::new(self.limits)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(backend)?;
        {
            let mut table = txn.open_table(RECORDS).map_err(backend)?;
            for (key, value) in batch.into_entries() {
                table.insert(key.as_slice(), value.as_slice()).map_err(backend)?;
            }
        }
        txn.commit().map_err(backend)
    }

    fn snapshot(&self) -> Result<RedbSnapshot, StoreError> {
        let txn = self.db.begin_read().map_err(backend)?;
        let table = txn.open_table(RECORDS).map_err(backend)?;
        Ok(RedbSnapshot { _txn: txn, table })
    }
}

/// A redb read transaction with the records table open
pub struct RedbSnapshot {
    _txn: ReadTransaction,
    table: ReadOnlyTable<&'static [u8], &'static [u8]>,
}

impl Snapshot for RedbSnapshot {
    type Cursor<'a> = RedbCursor<'a>;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self.table.get(key).map_err(backend)?;
        Ok(guard.map(|value| value.value().to_vec()))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<RedbCursor<'_>, StoreError> {
        Ok(RedbCursor {
            table: &self.table,
            prefix: prefix.to_vec(),
            position: Bound::Included(prefix.to_vec()),
            done: false,
        })
    }
}

/// Cursor that re-enters the B-tree from the last key seen on every step
pub struct RedbCursor<'a> {
    table: &'a ReadOnlyTable<&'static [u8], &'static [u8]>,
    prefix: Vec<u8>,
    position: Bound<Vec<u8>>,
    done: bool,
}

impl Cursor for RedbCursor<'_> {
    fn seek(&mut self, key: &[u8]) -> Result<(), StoreError> {
        let start = if key < self.prefix.as_slice() {
            self.prefix.as_slice()
        } else {
            key
        };
        self.position = Bound::Included(start.to_vec());
        self.done = false;
        Ok(())
    }

    fn next_record(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        if self.done {
            return Ok(None);
        }
        let lower: Bound<&[u8]> = match &self.position {
            Bound::Included(key) => Bound::Included(key.as_slice()),
            Bound::Excluded(key) => Bound::Excluded(key.as_slice()),
            Bound::Unbounded => Bound::Unbounded,
        };
        let mut range = self
            .table
            .range::<&[u8]>((lower, Bound::Unbounded))
            .map_err(backend)?;

        match range.next().transpose().map_err(backend)? {
            Some((key, value)) if key.value().starts_with(&self.prefix) => {
                let key = key.value().to_vec();
                let value = value.value().to_vec();
                self.position = Bound::Excluded(key.clone());
                Ok(Some((key, value)))
            }
            _ => {
                self.done = true;
                Ok(None)
            }
        }
    }
}
