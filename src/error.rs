//! Error types for import, storage and query
//!
//! `BatchFull` is the only recoverable condition: the flattener commits and
//! retries once. Everything else aborts the operation it occurred in.

use std::io;
use thiserror::Error;

/// Failure inside a storage backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error reported by the underlying database
    #[error("storage backend error: {0}")]
    Backend(String),

    /// I/O error while touching the store
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),

    /// Stored data is not in the expected shape
    #[error("storage corruption: {0}")]
    Corruption(String),
}

/// A write batch refused an entry because it would exceed its limits
///
/// The rejected entry is handed back so the caller can retry it in a fresh
/// batch without copying.
#[derive(Debug, Error)]
#[error("write batch full: rejected {} byte entry", .key.len() + .value.len())]
pub struct BatchFull {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Fatal import failure; the store is left partially written
#[derive(Debug, Error)]
pub enum ImportError {
    /// Input is not a single well-formed JSON document
    #[error("malformed JSON input: {0}")]
    Malformed(#[source] serde_json::Error),

    /// Reading the input failed
    #[error("failed to read input: {0}")]
    Io(#[source] io::Error),

    /// Containers nest deeper than the configured limit
    #[error("document nests deeper than {limit} levels")]
    TooDeep { limit: usize },

    /// A record did not fit even into an empty batch
    #[error("record too large for an empty batch: key {key_len} bytes, value {value_len} bytes")]
    RecordTooLarge { key_len: usize, value_len: usize },

    /// Storage failed while writing
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ImportError {
    /// Classify a decoder error as either an input read failure or bad JSON
    pub(crate) fn from_json(err: serde_json::Error) -> Self {
        if err.is_io() {
            ImportError::Io(err.into())
        } else {
            ImportError::Malformed(err)
        }
    }
}

/// Failure of a single query; other queries are unaffected
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Writing the response failed
    #[error("failed to write response: {0}")]
    Io(#[from] io::Error),

    /// A stored key could not be decoded into path segments
    #[error("invalid stored key: {0}")]
    InvalidKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_full_reports_entry_size() {
        let err = BatchFull {
            key: b"/a/b".to_vec(),
            value: b"12".to_vec(),
        };
        assert!(err.to_string().contains("6 byte entry"));
    }

    #[test]
    fn test_import_error_classifies_syntax() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ImportError::from_json(json_err);
        assert!(matches!(err, ImportError::Malformed(_)));
        assert!(err.to_string().contains("malformed JSON"));
    }

    struct ClosedPipe;

    impl io::Read for ClosedPipe {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
        }
    }

    #[test]
    fn test_import_error_classifies_io() {
        let json_err = serde_json::from_reader::<_, serde_json::Value>(ClosedPipe).unwrap_err();
        let err = ImportError::from_json(json_err);
        assert!(matches!(err, ImportError::Io(_)));
    }
}
