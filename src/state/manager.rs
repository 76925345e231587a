//! StateManager - actor that owns the shared taskstore::Store
//!
//! Processes commands via a channel for safe access to persistent state;
//! `rusqlite::Connection` is not `Send`-shared across awaits, so exactly one
//! task ever touches the underlying `Store`.

use std::path::Path;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::domain::{BoardDecision, Expert, Filter, KnowledgeNode, SessionExchange, Store, Task};

use super::messages::{StateCommand, StateError, StateResponse};

/// Handle to send commands to the StateManager actor.
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
}

impl StateManager {
    /// Spawn a new StateManager actor, opening (or creating) the store at
    /// `store_path` and rebuilding every record type's secondary index.
    pub fn spawn(store_path: impl AsRef<Path>) -> eyre::Result<Self> {
        debug!(store_path = %store_path.as_ref().display(), "StateManager::spawn: called");
        let mut store = Store::open(store_path.as_ref())?;

        let task_count = store.rebuild_indexes::<Task>()?;
        let expert_count = store.rebuild_indexes::<Expert>()?;
        let knowledge_count = store.rebuild_indexes::<KnowledgeNode>()?;
        let session_count = store.rebuild_indexes::<SessionExchange>()?;
        let board_count = store.rebuild_indexes::<BoardDecision>()?;
        info!(
            task_count,
            expert_count, knowledge_count, session_count, board_count, "StateManager::spawn: rebuilt indexes"
        );

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(store, rx));

        info!("StateManager spawned");
        Ok(Self { tx })
    }

    // === Task operations ===

    pub async fn create_task(&self, task: Task) -> StateResponse<String> {
        debug!(task_id = %task.id, "StateManager::create_task: called");
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::CreateTask { task, reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    pub async fn get_task(&self, id: &str) -> StateResponse<Option<Task>> {
        debug!(task_id = %id, "StateManager::get_task: called");
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::GetTask { id: id.to_string(), reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    pub async fn get_task_required(&self, id: &str) -> StateResponse<Task> {
        self.get_task(id).await?.ok_or_else(|| StateError::NotFound(id.to_string()))
    }

    pub async fn update_task(&self, task: Task) -> StateResponse<()> {
        debug!(task_id = %task.id, status = %task.status, "StateManager::update_task: called");
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::UpdateTask { task, reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Update `task`, but only if its persisted row still matches `guard`
    /// (an indexed-field equality check). Returns `false` if another writer
    /// already moved the row out from under the guard; the caller should
    /// treat that as "someone else handled it" rather than an error.
    pub async fn update_task_if(&self, task: Task, guard: Filter) -> StateResponse<bool> {
        debug!(task_id = %task.id, guard_field = %guard.field, "StateManager::update_task_if: called");
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::UpdateTaskIf { task, guard, reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Claim an unassigned task: writes the now-assigned `task` only if
    /// `assignee` was still absent on the persisted row. Returns `false` if
    /// a concurrent assignment pass already claimed it first.
    pub async fn claim_task(&self, task: Task) -> StateResponse<bool> {
        debug!(task_id = %task.id, "StateManager::claim_task: called");
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::ClaimTask { task, reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    pub async fn list_tasks(&self, filters: Vec<Filter>) -> StateResponse<Vec<Task>> {
        debug!(filter_count = filters.len(), "StateManager::list_tasks: called");
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::ListTasks { filters, reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    pub async fn delete_task(&self, id: &str) -> StateResponse<()> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::DeleteTask { id: id.to_string(), reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    // === Expert operations ===

    pub async fn create_expert(&self, expert: Expert) -> StateResponse<String> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::CreateExpert { expert, reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    pub async fn get_expert(&self, name: &str) -> StateResponse<Option<Expert>> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::GetExpert {
                name: name.to_string(),
                reply,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    pub async fn update_expert(&self, expert: Expert) -> StateResponse<()> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::UpdateExpert { expert, reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    pub async fn list_experts(&self, filters: Vec<Filter>) -> StateResponse<Vec<Expert>> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::ListExperts { filters, reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    // === KnowledgeNode operations ===

    pub async fn create_knowledge_node(&self, node: KnowledgeNode) -> StateResponse<String> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::CreateKnowledgeNode { node, reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    pub async fn get_knowledge_node(&self, id: &str) -> StateResponse<Option<KnowledgeNode>> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::GetKnowledgeNode { id: id.to_string(), reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    pub async fn update_knowledge_node(&self, node: KnowledgeNode) -> StateResponse<()> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::UpdateKnowledgeNode { node, reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    pub async fn list_knowledge_nodes(&self, filters: Vec<Filter>) -> StateResponse<Vec<KnowledgeNode>> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::ListKnowledgeNodes { filters, reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    // === SessionExchange operations ===

    pub async fn get_session_exchange(&self, session_id: &str) -> StateResponse<Option<SessionExchange>> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::GetSessionExchange {
                id: format!("session-{session_id}"),
                reply,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    pub async fn upsert_session_exchange(&self, session: SessionExchange) -> StateResponse<()> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::UpsertSessionExchange { session, reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    // === BoardDecision operations ===

    pub async fn create_board_decision(&self, decision: BoardDecision) -> StateResponse<String> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::CreateBoardDecision { decision, reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    pub async fn list_board_decisions(&self, filters: Vec<Filter>) -> StateResponse<Vec<BoardDecision>> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::ListBoardDecisions { filters, reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    // === Maintenance ===

    pub async fn sync(&self) -> StateResponse<()> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::Sync { reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    pub async fn rebuild_indexes(&self) -> StateResponse<usize> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::RebuildIndexes { reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    pub async fn shutdown(&self) -> Result<(), StateError> {
        self.tx.send(StateCommand::Shutdown).await.map_err(|_| StateError::ChannelError)
    }
}

async fn actor_loop(mut store: Store, mut rx: mpsc::Receiver<StateCommand>) {
    debug!("state actor_loop: started");
    while let Some(cmd) = rx.recv().await {
        match cmd {
            StateCommand::CreateTask { task, reply } => {
                let result = store.create(task).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::GetTask { id, reply } => {
                let result = store.get::<Task>(&id).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::UpdateTask { task, reply } => {
                let result = store.update(task).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::UpdateTaskIf { task, guard, reply } => {
                let result = store.update_if(task, &guard).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::ClaimTask { task, reply } => {
                let result = store.update_if_absent(task, "assignee").map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::ListTasks { filters, reply } => {
                let result = store.list::<Task>(&filters).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::DeleteTask { id, reply } => {
                let result = store.delete::<Task>(&id).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }

            StateCommand::CreateExpert { expert, reply } => {
                let result = store.create(expert).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::GetExpert { name, reply } => {
                let result = store.get::<Expert>(&name).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::UpdateExpert { expert, reply } => {
                let result = store.update(expert).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::ListExperts { filters, reply } => {
                let result = store.list::<Expert>(&filters).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }

            StateCommand::CreateKnowledgeNode { node, reply } => {
                let result = store.create(node).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::GetKnowledgeNode { id, reply } => {
                let result = store.get::<KnowledgeNode>(&id).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::UpdateKnowledgeNode { node, reply } => {
                let result = store.update(node).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::ListKnowledgeNodes { filters, reply } => {
                let result = store.list::<KnowledgeNode>(&filters).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }

            StateCommand::GetSessionExchange { id, reply } => {
                let result = store.get::<SessionExchange>(&id).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::UpsertSessionExchange { session, reply } => {
                let result = match store.update(session.clone()) {
                    Ok(()) => Ok(()),
                    Err(_) => store.create(session).map(|_| ()).map_err(|e| StateError::StoreError(e.to_string())),
                };
                let _ = reply.send(result);
            }

            StateCommand::CreateBoardDecision { decision, reply } => {
                let result = store.create(decision).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::ListBoardDecisions { filters, reply } => {
                let result = store.list::<BoardDecision>(&filters).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }

            StateCommand::Sync { reply } => {
                let result = store.sync().map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::RebuildIndexes { reply } => {
                let result = (|| {
                    let mut total = 0;
                    total += store.rebuild_indexes::<Task>()?;
                    total += store.rebuild_indexes::<Expert>()?;
                    total += store.rebuild_indexes::<KnowledgeNode>()?;
                    total += store.rebuild_indexes::<SessionExchange>()?;
                    total += store.rebuild_indexes::<BoardDecision>()?;
                    Ok(total)
                })()
                .map_err(|e: taskstore::StoreError| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }

            StateCommand::Shutdown => {
                debug!("state actor_loop: shutdown requested");
                break;
            }
        }
    }
    info!("state actor_loop: stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;
    use tempfile::TempDir;

    async fn manager() -> (StateManager, TempDir) {
        let dir = TempDir::new().unwrap();
        let manager = StateManager::spawn(dir.path()).unwrap();
        (manager, dir)
    }

    #[tokio::test]
    async fn create_then_get_task_roundtrips() {
        let (manager, _dir) = manager().await;
        let task = Task::new("fix the bug", "proj").with_priority(Priority::High);
        let id = manager.create_task(task.clone()).await.unwrap();
        let fetched = manager.get_task(&id).await.unwrap().unwrap();
        assert_eq!(fetched.goal, "fix the bug");
        assert_eq!(fetched.priority, Priority::High);
    }

    #[tokio::test]
    async fn update_persists_status_change() {
        let (manager, _dir) = manager().await;
        let mut task = Task::new("goal", "proj");
        let id = manager.create_task(task.clone()).await.unwrap();
        task.id = id.clone();
        task.start_attempt();
        manager.update_task(task).await.unwrap();
        let fetched = manager.get_task(&id).await.unwrap().unwrap();
        assert_eq!(fetched.attempt_count, 1);
    }

    #[tokio::test]
    async fn list_tasks_filters_by_status() {
        let (manager, _dir) = manager().await;
        manager.create_task(Task::new("a", "proj")).await.unwrap();
        let mut running = Task::new("b", "proj");
        running.start_attempt();
        manager.create_task(running).await.unwrap();

        let pending = manager
            .list_tasks(vec![Filter::eq("status", taskstore::IndexValue::String("pending".to_string()))])
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn expert_create_and_lookup_by_name() {
        let (manager, _dir) = manager().await;
        let expert = Expert::new("ada", "Backend Expert", "engineering", "eng", "You are Ada.");
        manager.create_expert(expert).await.unwrap();
        let fetched = manager.get_expert("ada").await.unwrap().unwrap();
        assert_eq!(fetched.department, "engineering");
    }

    #[tokio::test]
    async fn claim_task_is_exclusive() {
        let (manager, _dir) = manager().await;
        let task = Task::new("goal", "proj");
        let id = manager.create_task(task).await.unwrap();

        let mut first = manager.get_task(&id).await.unwrap().unwrap();
        first.assign("ada", crate::domain::BackendFamily::Fast);
        assert!(manager.claim_task(first).await.unwrap());

        let mut second = Task::new("goal", "proj");
        second.id = id.clone();
        second.assign("grace", crate::domain::BackendFamily::Heavy);
        assert!(!manager.claim_task(second).await.unwrap());

        let fetched = manager.get_task(&id).await.unwrap().unwrap();
        assert_eq!(fetched.assignee.as_deref(), Some("ada"));
    }

    #[tokio::test]
    async fn update_task_if_rejects_stale_guard() {
        let (manager, _dir) = manager().await;
        let id = manager.create_task(Task::new("goal", "proj")).await.unwrap();

        let mut task = manager.get_task(&id).await.unwrap().unwrap();
        task.start_attempt();
        let guard = Filter::eq("status", taskstore::IndexValue::String("pending".to_string()));
        assert!(manager.update_task_if(task.clone(), guard.clone()).await.unwrap());

        // Second caller still thinks it's pending; guard now fails.
        let mut stale = task.clone();
        stale.start_attempt();
        assert!(!manager.update_task_if(stale, guard).await.unwrap());
    }

    #[tokio::test]
    async fn session_exchange_upsert_creates_then_updates() {
        let (manager, _dir) = manager().await;
        let mut session = SessionExchange::new("s-1");
        session.append("hi", "hello");
        manager.upsert_session_exchange(session.clone()).await.unwrap();

        session.append("bye", "goodbye");
        manager.upsert_session_exchange(session).await.unwrap();

        let fetched = manager.get_session_exchange("s-1").await.unwrap().unwrap();
        assert_eq!(fetched.exchanges.len(), 2);
    }
}
