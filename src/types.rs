use crate::path::KeyCodec;
use serde::{Deserialize, Serialize};

/// How array indices are written into flat keys
///
/// Keys are compared byte-by-byte, so with `Decimal` an index of `10` sorts
/// before `2`. `Padded` trades a different wire format for numeric order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexEncoding {
    /// Plain decimal text: `0`, `1`, ..., `10`
    Decimal,
    /// Zero-padded to a fixed number of digits: `0000`, `0001`, ..., `0010`
    Padded { width: usize },
}

impl Default for IndexEncoding {
    fn default() -> Self {
        IndexEncoding::Decimal
    }
}

/// Size thresholds for a single write batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLimits {
    /// Maximum summed key + value bytes held by one batch
    pub max_bytes: usize,

    /// Maximum number of entries held by one batch
    pub max_entries: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        BatchLimits {
            max_bytes: 8 * 1024 * 1024,
            max_entries: 100_000,
        }
    }
}

/// Configuration shared by import and query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KilnConfig {
    /// Byte written before every path segment in a flat key
    pub separator: u8,

    /// Encoding used for array index segments
    pub index_encoding: IndexEncoding,

    /// Limits applied to every write batch during import
    pub batch_limits: BatchLimits,

    /// Maximum container nesting accepted by the importer
    pub max_depth: usize,
}

impl Default for KilnConfig {
    fn default() -> Self {
        KilnConfig {
            separator: b'/',
            index_encoding: IndexEncoding::Decimal,
            batch_limits: BatchLimits::default(),
            max_depth: 256,
        }
    }
}

impl KilnConfig {
    /// Build the key codec described by this configuration
    pub fn codec(&self) -> KeyCodec {
        KeyCodec::new(self.separator, self.index_encoding)
    }
}

/// Counters reported at the end of an import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    /// Leaf records written
    pub records: u64,

    /// Batches committed
    pub batches: u64,

    /// Summed key + value bytes written
    pub bytes: u64,

    /// Field names that contained the separator byte
    pub ambiguous_names: u64,
}
