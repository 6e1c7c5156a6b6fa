//! JSON import - stream a document into flat key-value records
//!
//! Every leaf scalar becomes one record keyed by its path. Writes are grouped
//! into batches bounded by the store's limits; a full batch is committed and
//! the write retried in a fresh one.

pub mod flattener;
pub mod progress;

pub use flattener::Flattener;
pub use progress::ProgressReader;
