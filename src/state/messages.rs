//! State manager messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{BoardDecision, Expert, Filter, KnowledgeNode, SessionExchange, Task};

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Channel error")]
    ChannelError,
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

/// Commands sent to the StateManager actor.
///
/// One Create/Get/Update/Delete/List group per domain record type; Task and
/// Expert additionally get a conditional update used by the assignment pass
/// and the stuck sweep (`WHERE status = expected`-style guards live here,
/// not in the domain layer, since only the actor talks to the Store).
#[derive(Debug)]
pub enum StateCommand {
    // Task operations
    CreateTask {
        task: Task,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    GetTask {
        id: String,
        reply: oneshot::Sender<StateResponse<Option<Task>>>,
    },
    UpdateTask {
        task: Task,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    /// Conditional update guarded on an indexed-field equality check; used
    /// for status-transition guards (e.g. `WHERE status = 'pending'`).
    UpdateTaskIf {
        task: Task,
        guard: Filter,
        reply: oneshot::Sender<StateResponse<bool>>,
    },
    /// Claim an unassigned task: writes only if `assignee` is still absent.
    /// The race two concurrent assignment passes would otherwise hit.
    ClaimTask {
        task: Task,
        reply: oneshot::Sender<StateResponse<bool>>,
    },
    ListTasks {
        filters: Vec<Filter>,
        reply: oneshot::Sender<StateResponse<Vec<Task>>>,
    },
    DeleteTask {
        id: String,
        reply: oneshot::Sender<StateResponse<()>>,
    },

    // Expert operations
    CreateExpert {
        expert: Expert,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    GetExpert {
        name: String,
        reply: oneshot::Sender<StateResponse<Option<Expert>>>,
    },
    UpdateExpert {
        expert: Expert,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    ListExperts {
        filters: Vec<Filter>,
        reply: oneshot::Sender<StateResponse<Vec<Expert>>>,
    },

    // KnowledgeNode operations
    CreateKnowledgeNode {
        node: KnowledgeNode,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    GetKnowledgeNode {
        id: String,
        reply: oneshot::Sender<StateResponse<Option<KnowledgeNode>>>,
    },
    UpdateKnowledgeNode {
        node: KnowledgeNode,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    ListKnowledgeNodes {
        filters: Vec<Filter>,
        reply: oneshot::Sender<StateResponse<Vec<KnowledgeNode>>>,
    },

    // SessionExchange operations
    GetSessionExchange {
        id: String,
        reply: oneshot::Sender<StateResponse<Option<SessionExchange>>>,
    },
    UpsertSessionExchange {
        session: SessionExchange,
        reply: oneshot::Sender<StateResponse<()>>,
    },

    // BoardDecision operations
    CreateBoardDecision {
        decision: BoardDecision,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    ListBoardDecisions {
        filters: Vec<Filter>,
        reply: oneshot::Sender<StateResponse<Vec<BoardDecision>>>,
    },

    // Sync operations
    Sync {
        reply: oneshot::Sender<StateResponse<()>>,
    },
    RebuildIndexes {
        reply: oneshot::Sender<StateResponse<usize>>,
    },

    // Shutdown
    Shutdown,
}
