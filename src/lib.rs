//! # Kiln - JSON documents as flat, sorted key-value records
//!
//! Kiln streams a JSON document of any size into a sorted key-value store,
//! one record per leaf scalar, and serves any subtree back out as JSON.
//!
//! ## Modules
//!
//! - **path**: flat key encoding of document positions
//! - **store**: sorted key-value storage with batches and snapshots
//! - **import**: single-pass flattening of a JSON stream into the store
//! - **query**: leaf lookup and streaming subtree reconstruction
//!
//! ## Quick Start
//!
//! ```rust
//! use kiln::{import_json, KilnConfig, MemStore, QueryService};
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = KilnConfig::default();
//! let store = Arc::new(MemStore::with_limits(config.batch_limits));
//!
//! let doc = r#"{"user": {"name": "Alice", "tags": ["a", "b"]}}"#;
//! let stats = import_json(doc.as_bytes(), store.as_ref(), &config)?;
//! assert_eq!(stats.records, 3);
//!
//! let service = QueryService::new(store, config.codec());
//! assert_eq!(service.query_to_vec("user/name")?, b"\"Alice\"\n");
//! assert_eq!(service.query_to_vec("user/tags")?, b"{\"0\":\"a\",\"1\":\"b\"}\n");
//! assert_eq!(service.query_to_vec("user/age")?, b"null\n");
//! # Ok(())
//! # }
//! ```
//!
//! ## Ordering
//!
//! Output siblings come back in byte order of their key text, not in
//! document order. Array indices are decimal by default, so element `10`
//! is emitted before element `2`; set [`IndexEncoding::Padded`] to get
//! numeric order at the cost of a different key format.

use std::io::Read;

pub mod error;
pub mod import;
pub mod path;
pub mod query;
pub mod store;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{BatchFull, ImportError, QueryError, StoreError};
pub use import::{Flattener, ProgressReader};
pub use path::{KeyCodec, QueryPath, Segment};
pub use query::{query, CancelToken, CancellableSink, QueryOutcome, QueryService, ResponseSink};
pub use store::{Cursor, MemStore, Snapshot, Store, WriteBatch};
#[cfg(feature = "redb")]
pub use store::RedbStore;
pub use types::{BatchLimits, ImportStats, IndexEncoding, KilnConfig};

/// Main entry point: stream one JSON document from `reader` into `store`
///
/// On error the store holds whatever batches were committed before the
/// failure and should be discarded.
pub fn import_json<R: Read, S: Store>(
    reader: R,
    store: &S,
    config: &KilnConfig,
) -> Result<ImportStats, ImportError> {
    Flattener::new(store, config.codec())
        .with_max_depth(config.max_depth)
        .import(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_basic_import_and_query() {
        let config = KilnConfig::default();
        let store = Arc::new(MemStore::new());
        let input = r#"{"id": 1, "name": "Alice", "posts": [{"id": 10}, {"id": 11}]}"#;

        let stats = import_json(input.as_bytes(), store.as_ref(), &config).unwrap();
        assert_eq!(stats.records, 4);

        let service = QueryService::new(store, config.codec());
        let root = service.query_to_vec("").unwrap();
        let value: serde_json::Value = serde_json::from_slice(&root).unwrap();
        assert_eq!(value["posts"]["1"]["id"], 11);
        assert_eq!(value["name"], "Alice");
    }
}
