//! Domain types for the orchestrator
//!
//! Task, Expert, KnowledgeNode, SessionExchange and BoardDecision are the five
//! durable entities; all implement the `Record` trait for TaskStore
//! persistence.

mod board;
mod expert;
mod id;
mod knowledge;
mod priority;
mod session;
mod task;

pub use board::BoardDecision;
pub use expert::{DIRECT_ASSIGNEE, Expert, ExpertSeed};
pub use id::{generate_id, DomainId, IdResolver};
pub use knowledge::{DimensionMismatch, EMBEDDING_DIM, KnowledgeMetadata, KnowledgeNode, MAX_CONTENT_CHARS};
pub use priority::Priority;
pub use session::{Exchange, MAX_EXCHANGES, MAX_TOTAL_CHARS, SessionExchange};
pub use task::{BackendFamily, LastError, Task, TaskMetadata, TaskStatus};

// Re-export taskstore types for convenience
pub use taskstore::{Filter, FilterOp, IndexValue, Record, Store};
