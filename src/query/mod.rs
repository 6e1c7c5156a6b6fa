//! Serving JSON back out of the flat store
//!
//! A query first tries the path as a leaf key. If there is no such leaf it
//! scans every key below the path and rebuilds the subtree as a JSON object
//! while the scan runs, so nothing larger than the open-container stack is
//! ever held in memory.

pub mod assembler;
pub mod sink;

pub use assembler::ObjectAssembler;
pub use sink::{CancelToken, CancellableSink, ResponseSink};

use crate::error::QueryError;
use crate::path::{KeyCodec, QueryPath};
use crate::store::{Cursor, Snapshot, Store};
use std::sync::Arc;

/// What a query wrote to its sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    /// The path named a leaf; its scalar was written verbatim
    Leaf,
    /// The path named a container; an object of this many leaves was written
    Subtree { records: usize },
    /// Nothing is stored at or below the path; `null` was written
    NotFound,
    /// The sink reported cancellation and output stopped part way
    Cancelled,
}

/// Answer one query against a read snapshot
pub fn query<T, W>(
    snapshot: &T,
    codec: &KeyCodec,
    path: &QueryPath,
    out: &mut W,
) -> Result<QueryOutcome, QueryError>
where
    T: Snapshot,
    W: ResponseSink + ?Sized,
{
    if out.is_cancelled() {
        return Ok(QueryOutcome::Cancelled);
    }

    let key = path.encode(codec);
    if let Some(value) = snapshot.get(&key)? {
        out.write_all(&value)?;
        out.write_all(b"\n")?;
        tracing::debug!(path = %path, "leaf");
        return Ok(QueryOutcome::Leaf);
    }

    let prefix = codec.child_prefix(&key);
    let mut cursor = snapshot.scan_prefix(&prefix)?;

    let Some(first) = cursor.next_record()? else {
        out.write_all(b"null\n")?;
        tracing::debug!(path = %path, "not found");
        return Ok(QueryOutcome::NotFound);
    };

    let mut assembler = ObjectAssembler::new();
    assembler.begin(out)?;

    let mut record = Some(first);
    while let Some((key, value)) = record {
        if out.is_cancelled() {
            tracing::debug!(path = %path, depth = assembler.depth(), "query cancelled");
            return Ok(QueryOutcome::Cancelled);
        }

        let rest = key.strip_prefix(prefix.as_slice()).ok_or_else(|| {
            QueryError::InvalidKey(format!(
                "{} is outside the scanned prefix",
                String::from_utf8_lossy(&key)
            ))
        })?;
        let segments = codec.split_relative(rest);
        assembler.push(&segments, &value, out)?;

        record = cursor.next_record()?;
    }

    let records = assembler.finish(out)?;
    tracing::debug!(path = %path, records, "subtree");
    Ok(QueryOutcome::Subtree { records })
}

/// Shared front for concurrent queries over one store
///
/// Each call takes its own snapshot, so queries never wait on each other.
pub struct QueryService<S> {
    store: Arc<S>,
    codec: KeyCodec,
}

impl<S> Clone for QueryService<S> {
    fn clone(&self) -> Self {
        QueryService {
            store: Arc::clone(&self.store),
            codec: self.codec,
        }
    }
}

impl<S: Store> QueryService<S> {
    pub fn new(store: Arc<S>, codec: KeyCodec) -> Self {
        QueryService { store, codec }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Answer a `/`-joined path into `out`
    pub fn query<W: ResponseSink + ?Sized>(
        &self,
        path: &str,
        out: &mut W,
    ) -> Result<QueryOutcome, QueryError> {
        let snapshot = self.store.snapshot()?;
        query(&snapshot, &self.codec, &QueryPath::parse(path), out)
    }

    /// Answer a path into a fresh buffer
    pub fn query_to_vec(&self, path: &str) -> Result<Vec<u8>, QueryError> {
        let mut out = Vec::new();
        self.query(path, &mut out)?;
        Ok(out)
    }
}
