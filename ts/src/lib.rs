//! TaskStore - generic persistent state management
//!
//! A small embedded persistence layer: each `Record` type gets a SQLite table
//! for fast point lookups and filtered listing, a parallel EAV index table so
//! `list()` doesn't need to deserialize every row, and a per-collection JSONL
//! audit log that `sync()` can commit to a git working tree. Any number of
//! distinct record types can share one `Store` / one directory.

mod error;
mod filter;
mod record;
mod store;

pub use error::{Result, StoreError};
pub use filter::{Filter, FilterOp, IndexValue};
pub use record::{Record, now_ms};
pub use store::Store;
