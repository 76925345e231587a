//! The Record trait - anything TaskStore can persist

use std::collections::HashMap;

use serde::{Serialize, de::DeserializeOwned};

use crate::filter::IndexValue;

/// A type that can be stored and retrieved by TaskStore.
///
/// Implementors supply a stable id, a last-updated timestamp (used for
/// optimistic conflict detection and `updated_at`-based queries), a
/// collection name (the SQLite table / JSONL file this record lives in),
/// and a set of secondary-index fields used by `Store::list`.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable identifier, unique within the collection
    fn id(&self) -> &str;

    /// Last-modified timestamp, Unix milliseconds
    fn updated_at(&self) -> i64;

    /// Name of the collection (SQLite table / JSONL file) this record belongs to
    fn collection_name() -> &'static str;

    /// Secondary-index fields extracted from the record for `Store::list` filters
    fn indexed_fields(&self) -> HashMap<String, IndexValue>;
}

/// Current time in Unix milliseconds
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
