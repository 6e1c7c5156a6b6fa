//! Single-pass JSON flattening
//!
//! The document is decoded straight off the reader through a serde
//! `DeserializeSeed`, so containers are visited as they stream past and no
//! `serde_json::Value` tree is ever built. Only the current key and one
//! write batch are held in memory.

use crate::error::{ImportError, StoreError};
use crate::path::{KeyCodec, Segment};
use crate::store::{Store, WriteBatch};
use crate::types::{ImportStats, KilnConfig};
use serde::de::{self, DeserializeSeed, MapAccess, SeqAccess, Visitor};
use serde::Serialize;
use std::fmt;
use std::io::Read;
use std::mem;

/// Streams one JSON document into a [`Store`]
///
/// Owns the only write batch for the whole import; the batch is swapped for
/// a fresh one each time it fills up.
pub struct Flattener<'s, S: Store> {
    store: &'s S,
    codec: KeyCodec,
    batch: WriteBatch,
    key: Vec<u8>,
    depth: usize,
    max_depth: usize,
    stats: ImportStats,
    // A storage failure raised inside the visitor, which can only report
    // errors through serde's stringly `de::Error`.
    failure: Option<ImportError>,
}

impl<'s, S: Store> Flattener<'s, S> {
    pub fn new(store: &'s S, codec: KeyCodec) -> Self {
        Flattener {
            store,
            codec,
            batch: store.begin_batch(),
            key: Vec::new(),
            depth: 0,
            max_depth: KilnConfig::default().max_depth,
            stats: ImportStats::default(),
            failure: None,
        }
    }

    /// Reject documents whose containers nest deeper than `max_depth`
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Import the single JSON document read from `reader`
    pub fn import<R: Read>(mut self, reader: R) -> Result<ImportStats, ImportError> {
        let mut de = serde_json::Deserializer::from_reader(reader);
        // Nesting is bounded by `max_depth` instead of serde_json's fixed limit
        de.disable_recursion_limit();

        if let Err(err) = (LeafSeed { flattener: &mut self }).deserialize(&mut de) {
            return Err(self
                .failure
                .take()
                .unwrap_or_else(|| ImportError::from_json(err)));
        }
        de.end().map_err(ImportError::from_json)?;

        self.finish()
    }

    fn finish(mut self) -> Result<ImportStats, ImportError> {
        let last = mem::replace(&mut self.batch, self.store.begin_batch());
        self.commit(last)?;

        tracing::info!(
            records = self.stats.records,
            batches = self.stats.batches,
            bytes = self.stats.bytes,
            ambiguous_names = self.stats.ambiguous_names,
            "import complete"
        );
        Ok(self.stats)
    }

    fn commit(&mut self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        tracing::debug!(entries = batch.len(), bytes = batch.size(), "committing batch");
        self.store.commit(batch)?;
        self.stats.batches += 1;
        Ok(())
    }

    fn enter_field(&mut self, name: &str) {
        if self.codec.is_ambiguous(name) {
            self.stats.ambiguous_names += 1;
            tracing::warn!(
                field = name,
                separator = %char::from(self.codec.separator()),
                "field name contains the key separator; its subtree will not reconstruct faithfully"
            );
        }
        self.codec.push_segment(&mut self.key, &Segment::Field(name));
    }

    fn enter_container<E: de::Error>(&mut self) -> Result<(), E> {
        if self.depth >= self.max_depth {
            let err = ImportError::TooDeep {
                limit: self.max_depth,
            };
            let message = err.to_string();
            self.failure = Some(err);
            return Err(E::custom(message));
        }
        self.depth += 1;
        Ok(())
    }

    /// Store one leaf under the current key, committing and retrying once if
    /// the batch is full
    fn write_leaf(&mut self, value: Vec<u8>) -> Result<(), ImportError> {
        let key = self.key.clone();
        let size = (key.len() + value.len()) as u64;
        tracing::trace!(key = %String::from_utf8_lossy(&key), "leaf");

        if let Err(full) = self.batch.set(key, value) {
            let filled = mem::replace(&mut self.batch, self.store.begin_batch());
            self.commit(filled)?;
            self.batch.set(full.key, full.value).map_err(|full| ImportError::RecordTooLarge {
                key_len: full.key.len(),
                value_len: full.value.len(),
            })?;
        }

        self.stats.records += 1;
        self.stats.bytes += size;
        Ok(())
    }

    fn leaf<T, E>(&mut self, scalar: &T) -> Result<(), E>
    where
        T: Serialize + ?Sized,
        E: de::Error,
    {
        let encoded = serde_json::to_vec(scalar).map_err(E::custom)?;
        self.write_leaf(encoded).map_err(|err| {
            let message = err.to_string();
            self.failure = Some(err);
            E::custom(message)
        })
    }
}

struct LeafSeed<'f, 's, S: Store> {
    flattener: &'f mut Flattener<'s, S>,
}

impl<'de, S: Store> DeserializeSeed<'de> for LeafSeed<'_, '_, S> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> Result<(), D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de, S: Store> Visitor<'de> for LeafSeed<'_, '_, S> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<(), E> {
        self.flattener.leaf(&v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<(), E> {
        self.flattener.leaf(&v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<(), E> {
        self.flattener.leaf(&v)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<(), E> {
        self.flattener.leaf(&v)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<(), E> {
        self.flattener.leaf(v)
    }

    fn visit_unit<E: de::Error>(self) -> Result<(), E> {
        self.flattener.leaf(&())
    }

    fn visit_map<A>(self, mut map: A) -> Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        let flattener = self.flattener;
        flattener.enter_container()?;
        while let Some(name) = map.next_key::<String>()? {
            let mark = flattener.key.len();
            flattener.enter_field(&name);
            map.next_value_seed(LeafSeed {
                flattener: &mut *flattener,
            })?;
            flattener.key.truncate(mark);
        }
        flattener.depth -= 1;
        Ok(())
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        let flattener = self.flattener;
        flattener.enter_container()?;
        let mut index = 0;
        loop {
            let mark = flattener.key.len();
            flattener
                .codec
                .push_segment(&mut flattener.key, &Segment::Index(index));
            let item = seq.next_element_seed(LeafSeed {
                flattener: &mut *flattener,
            })?;
            flattener.key.truncate(mark);
            if item.is_none() {
                flattener.depth -= 1;
                return Ok(());
            }
            index += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Cursor, MemStore, Snapshot};
    use crate::types::{BatchLimits, IndexEncoding};

    fn records(store: &MemStore) -> Vec<(String, String)> {
        let snapshot = store.snapshot().unwrap();
        let mut cursor = snapshot.scan_prefix(b"").unwrap();
        let mut out = Vec::new();
        while let Some((key, value)) = cursor.next_record().unwrap() {
            out.push((String::from_utf8(key).unwrap(), String::from_utf8(value).unwrap()));
        }
        out
    }

    fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
        expected
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_flatten_nested_document() {
        let store = MemStore::new();
        let input = r#"{"a": {"b": [1, 2], "c": "x"}, "d": null, "e": true, "f": -1.5}"#;
        let stats = Flattener::new(&store, KeyCodec::default())
            .import(input.as_bytes())
            .unwrap();

        assert_eq!(stats.records, 6);
        assert_eq!(stats.batches, 1);
        assert_eq!(
            records(&store),
            pairs(&[
                ("/a/b/0", "1"),
                ("/a/b/1", "2"),
                ("/a/c", "\"x\""),
                ("/d", "null"),
                ("/e", "true"),
                ("/f", "-1.5"),
            ])
        );
    }

    #[test]
    fn test_root_scalar_uses_empty_key() {
        let store = MemStore::new();
        Flattener::new(&store, KeyCodec::default())
            .import(&b" \"hello\" "[..])
            .unwrap();
        assert_eq!(records(&store), pairs(&[("", "\"hello\"")]));
    }

    #[test]
    fn test_strings_are_reescaped() {
        let store = MemStore::new();
        Flattener::new(&store, KeyCodec::default())
            .import(r#"{"q": "say \"hi\"\n", "u": "é"}"#.as_bytes())
            .unwrap();
        assert_eq!(
            records(&store),
            pairs(&[("/q", r#""say \"hi\"\n""#), ("/u", "\"\u{e9}\"")])
        );
    }

    #[test]
    fn test_empty_containers_produce_no_records() {
        let store = MemStore::new();
        let stats = Flattener::new(&store, KeyCodec::default())
            .import(&br#"{"a": {}, "b": [], "c": [[]]}"#[..])
            .unwrap();
        assert_eq!(stats.records, 0);
        assert_eq!(stats.batches, 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_padded_index_encoding() {
        let store = MemStore::new();
        let codec = KeyCodec::new(b'/', IndexEncoding::Padded { width: 3 });
        Flattener::new(&store, codec)
            .import(&b"[\"a\", \"b\"]"[..])
            .unwrap();
        assert_eq!(records(&store), pairs(&[("/000", "\"a\""), ("/001", "\"b\"")]));
    }

    #[test]
    fn test_batch_overflow_commits_and_retries() {
        let store = MemStore::with_limits(BatchLimits {
            max_bytes: 1024,
            max_entries: 2,
        });
        let stats = Flattener::new(&store, KeyCodec::default())
            .import(&b"[1, 2, 3, 4, 5]"[..])
            .unwrap();
        assert_eq!(stats.records, 5);
        assert_eq!(stats.batches, 3);
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn test_record_larger_than_any_batch_is_fatal() {
        let store = MemStore::with_limits(BatchLimits {
            max_bytes: 8,
            max_entries: 100,
        });
        let err = Flattener::new(&store, KeyCodec::default())
            .import(&br#"{"a": 1, "long": "0123456789"}"#[..])
            .unwrap_err();
        assert!(matches!(
            err,
            ImportError::RecordTooLarge {
                key_len: 5,
                value_len: 12
            }
        ));
        // The batch holding "/a" was committed before the retry failed
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_malformed_input_aborts() {
        let store = MemStore::new();
        let err = Flattener::new(&store, KeyCodec::default())
            .import(&br#"{"a": [1, 2"#[..])
            .unwrap_err();
        assert!(matches!(err, ImportError::Malformed(_)));
    }

    #[test]
    fn test_trailing_data_is_malformed() {
        let store = MemStore::new();
        let err = Flattener::new(&store, KeyCodec::default())
            .import(&b"{\"a\": 1} {\"b\": 2}"[..])
            .unwrap_err();
        assert!(matches!(err, ImportError::Malformed(_)));
    }

    #[test]
    fn test_ambiguous_field_names_are_counted() {
        let store = MemStore::new();
        let stats = Flattener::new(&store, KeyCodec::default())
            .import(&br#"{"a/b": 1, "c": 2}"#[..])
            .unwrap();
        assert_eq!(stats.ambiguous_names, 1);
        assert_eq!(records(&store), pairs(&[("/a/b", "1"), ("/c", "2")]));
    }

    fn nested_arrays(depth: usize) -> String {
        format!("{}1{}", "[".repeat(depth), "]".repeat(depth))
    }

    #[test]
    fn test_nesting_past_decoder_default_is_accepted() {
        let store = MemStore::new();
        let stats = Flattener::new(&store, KeyCodec::default())
            .import(nested_arrays(160).as_bytes())
            .unwrap();
        assert_eq!(stats.records, 1);

        let records = records(&store);
        assert_eq!(records[0].0, "/0".repeat(160));
    }

    #[test]
    fn test_nesting_past_limit_is_too_deep() {
        let store = MemStore::new();
        let err = Flattener::new(&store, KeyCodec::default())
            .with_max_depth(16)
            .import(format!(r#"{{"a": {}}}"#, nested_arrays(16)).as_bytes())
            .unwrap_err();
        assert!(matches!(err, ImportError::TooDeep { limit: 16 }));

        // Exactly at the limit is fine
        let stats = Flattener::new(&store, KeyCodec::default())
            .with_max_depth(16)
            .import(nested_arrays(16).as_bytes())
            .unwrap();
        assert_eq!(stats.records, 1);
    }

    /// Accepts batches until `fail_after` commits have gone through
    struct FailingStore {
        inner: MemStore,
        fail_after: usize,
        commits: std::sync::atomic::AtomicUsize,
    }

    impl FailingStore {
        fn new(limits: BatchLimits, fail_after: usize) -> Self {
            FailingStore {
                inner: MemStore::with_limits(limits),
                fail_after,
                commits: std::sync::atomic::AtomicUsize::new(0),
            }
        }
    }

    impl Store for FailingStore {
        type Snapshot = crate::store::MemSnapshot;

        fn begin_batch(&self) -> WriteBatch {
            self.inner.begin_batch()
        }

        fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
            let seen = self
                .commits
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if seen >= self.fail_after {
                return Err(StoreError::Backend("disk full".to_string()));
            }
            self.inner.commit(batch)
        }

        fn snapshot(&self) -> Result<Self::Snapshot, StoreError> {
            self.inner.snapshot()
        }
    }

    #[test]
    fn test_commit_failure_mid_document_is_store_error() {
        let store = FailingStore::new(
            BatchLimits {
                max_bytes: 1024,
                max_entries: 1,
            },
            1,
        );
        let err = Flattener::new(&store, KeyCodec::default())
            .import(&br#"{"a": 1, "b": 2, "c": 3}"#[..])
            .unwrap_err();
        assert!(matches!(err, ImportError::Store(StoreError::Backend(_))), "{err:?}");
        assert_eq!(store.inner.len(), 1);
    }

    #[test]
    fn test_final_commit_failure_is_store_error() {
        let store = FailingStore::new(BatchLimits::default(), 0);
        let err = Flattener::new(&store, KeyCodec::default())
            .import(&br#"{"a": 1}"#[..])
            .unwrap_err();
        assert!(matches!(err, ImportError::Store(StoreError::Backend(_))), "{err:?}");
        assert!(store.inner.is_empty());
    }
}
