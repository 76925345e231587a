//! orchestrator - multi-agent task orchestrator
//!
//! Four subsystems compose around a shared `StateManager`-owned store:
//!
//! - **Conductor**: classifies a goal, assembles retrieval context, and
//!   either answers directly, fans a plan out across experts, or hands the
//!   goal to the durable Executor; exposes the HTTP surface.
//! - **Executor**: assigns pending tasks to experts, runs them through the
//!   Router with heartbeats and bounded retries, and escalates exhausted
//!   tasks to the board.
//! - **Router**: multiplexes two LLM backend families behind one
//!   request/response contract, with cross-family failover and echo
//!   detection.
//! - **Retrieval**: turns a goal into a relevance-ordered context block of
//!   knowledge snippets, backed by a cache and cosine-similarity search.
//!
//! # Modules
//!
//! - [`domain`] - durable entities (Task, Expert, KnowledgeNode, SessionExchange, BoardDecision)
//! - [`llm`] - LLM client trait and provider implementations
//! - [`router`] - backend multiplexing
//! - [`retrieval`] - context assembly
//! - [`executor`] - durable task queue
//! - [`conductor`] - classification, planning and the HTTP surface
//! - [`state`] - the `StateManager` actor owning the store
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod conductor;
pub mod config;
pub mod domain;
pub mod executor;
pub mod llm;
pub mod retrieval;
pub mod router;
pub mod state;

pub use config::{Config, LlmConfig};
pub use conductor::{Conductor, ConductorConfig, ConductorError};
pub use domain::{
    BackendFamily, BoardDecision, Expert, Filter, FilterOp, IndexValue, KnowledgeNode, LastError, Priority, Record, SessionExchange,
    Store, Task, TaskStatus,
};
pub use executor::{Executor, ExecutorConfig, ExecutorError};
pub use llm::{AnthropicClient, CompletionRequest, CompletionResponse, LlmClient, LlmError};
pub use retrieval::{Retrieval, RetrievalConfig, RetrievalError};
pub use router::{Router, RouterConfig, RouterError};
pub use state::{scan_for_recovery, sweep_stuck_tasks, RecoveryStats, StateCommand, StateError, StateManager, StateResponse};
