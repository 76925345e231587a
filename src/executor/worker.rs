//! Worker pool: pulls pending assigned tasks and runs each one with
//! heartbeat liveness, bounded retries, and escalation on exhaustion.

use std::sync::Arc;
use std::time::Duration;

use taskstore::{now_ms, Filter, IndexValue};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::domain::{BackendFamily, LastError, Task, TaskStatus, DIRECT_ASSIGNEE};
use crate::llm::{CompletionRequest, Message};
use crate::router::{Router, RouterError, RouterRequest, RouterResponse};
use crate::state::{StateError, StateManager};

use super::config::ExecutorConfig;
use super::error::ExecutorError;
use super::escalation;
use super::host_load;
use super::validator;

/// Owns a heartbeat ticker for one in-progress attempt; aborts the ticker
/// on drop so every exit path (success, failure, panic unwind) stops it.
struct HeartbeatGuard {
    handle: JoinHandle<()>,
}

impl HeartbeatGuard {
    fn start(state: StateManager, task_id: String, interval_secs: u64) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                match state.get_task(&task_id).await {
                    Ok(Some(mut task)) if task.status == TaskStatus::InProgress => {
                        task.heartbeat();
                        let _ = state.update_task(task).await;
                    }
                    _ => break,
                }
            }
        });
        Self { handle }
    }
}

impl Drop for HeartbeatGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Select up to `batch_size` pullable tasks, grouped by `(preferred_source,
/// preferred_model)` and interleaved round-robin across families so both
/// backends stay busy.
pub async fn pull(state: &StateManager, batch_size: usize) -> Result<Vec<Task>, ExecutorError> {
    let now = now_ms();
    let pending = state
        .list_tasks(vec![Filter::eq("status", IndexValue::String(TaskStatus::Pending.to_string()))])
        .await?;
    let pullable: Vec<Task> = pending.into_iter().filter(|t| t.is_pullable(now)).collect();

    let mut fast: Vec<Task> = Vec::new();
    let mut heavy: Vec<Task> = Vec::new();
    for task in pullable {
        match task.metadata.preferred_source {
            Some(BackendFamily::Heavy) => heavy.push(task),
            _ => fast.push(task),
        }
    }

    let mut interleaved = Vec::with_capacity(batch_size);
    let mut fast_iter = fast.into_iter();
    let mut heavy_iter = heavy.into_iter();
    loop {
        if interleaved.len() >= batch_size {
            break;
        }
        let took_fast = if let Some(t) = fast_iter.next() {
            interleaved.push(t);
            true
        } else {
            false
        };
        if interleaved.len() >= batch_size {
            break;
        }
        let took_heavy = if let Some(t) = heavy_iter.next() {
            interleaved.push(t);
            true
        } else {
            false
        };
        if !took_fast && !took_heavy {
            break;
        }
    }
    Ok(interleaved)
}

fn classify_failure(outcome: &Result<RouterResponse, RouterError>) -> LastError {
    match outcome {
        Ok(_) => LastError::ValidationFailed,
        Err(RouterError::Timeout(_)) => LastError::Timeout,
        Err(RouterError::Echo) => LastError::Echo,
        Err(RouterError::Transport(_)) => LastError::ConnectionError,
        Err(RouterError::Unavailable { .. }) => LastError::ConnectionError,
        Err(_) => LastError::Other,
    }
}

async fn record_outcome(state: &StateManager, assignee: &str, succeeded: bool) -> Result<(), ExecutorError> {
    if assignee == DIRECT_ASSIGNEE {
        return Ok(());
    }
    if let Some(mut expert) = state.get_expert(assignee).await? {
        expert.decrement_workload();
        expert.record_outcome(succeeded, 0.3);
        state.update_expert(expert).await?;
    }
    Ok(())
}

/// Run one assigned task to completion via the execute-one-task algorithm:
/// conditionally mark in_progress, heartbeat, call Router, validate, and
/// persist the outcome (success, requeue-with-backoff, or escalation).
pub async fn execute_one_task(
    state: &StateManager,
    router: &Arc<Router>,
    config: &ExecutorConfig,
    mut task: Task,
) -> Result<(), ExecutorError> {
    let task_id = task.id.clone();
    let expected_status_guard = Filter::eq("status", IndexValue::String(task.status.to_string()));
    task.start_attempt();
    let claimed = state.update_task_if(task.clone(), expected_status_guard).await?;
    if !claimed {
        debug!(task_id = %task_id, "execute_one_task: lost race to another worker, skipping");
        return Ok(());
    }

    let _heartbeat = HeartbeatGuard::start(state.clone(), task_id.clone(), config.heartbeat_seconds);

    let assignee = task.assignee.clone().unwrap_or_else(|| DIRECT_ASSIGNEE.to_string());
    let system_prompt = match state.get_expert(&assignee).await? {
        Some(expert) => expert.system_prompt,
        None => "You are a helpful assistant completing a task directly.".to_string(),
    };

    let request = RouterRequest {
        prompt: CompletionRequest {
            system_prompt,
            messages: vec![Message::user(task.goal.clone())],
            max_tokens: 4096,
            tools: vec![],
        },
        category: task.project_context.clone(),
        preferred_source: task.metadata.preferred_source,
        preferred_model: task.metadata.preferred_model.clone(),
        stream: false,
    };

    let outcome = router.complete(request).await;

    let mut task = state.get_task(&task_id).await?.ok_or_else(|| ExecutorError::TaskNotFound(task_id.clone()))?;

    let success = match &outcome {
        Ok(response) => validator::validate(&task.goal, &response.text) >= config.validator_threshold,
        Err(_) => false,
    };

    if success {
        task.complete();
        state.update_task(task).await?;
        record_outcome(state, &assignee, true).await?;
        info!(task_id = %task_id, "execute_one_task: completed");
        return Ok(());
    }

    let kind = classify_failure(&outcome);
    if task.attempt_count >= config.max_attempts {
        let decision = escalation::synthesize(router, &task).await;
        state.create_board_decision(decision).await?;
        task.escalate();
        let attempts = task.attempt_count;
        state.update_task(task).await?;
        record_outcome(state, &assignee, false).await?;
        warn!(task_id = %task_id, attempts, "execute_one_task: escalated to board");
    } else {
        task.fail_attempt(kind, config.retry_delay_sec * 1000);
        state.update_task(task).await?;
        record_outcome(state, &assignee, false).await?;
        debug!(task_id = %task_id, ?kind, "execute_one_task: requeued with backoff");
    }

    Ok(())
}

/// One worker-pool cycle: sweep stuck tasks, run the assignment pass,
/// recompute adaptive concurrency, and pull+execute up to `effective_N`
/// tasks concurrently. Returns how many tasks were picked up this cycle.
pub async fn run_cycle(state: &StateManager, router: &Arc<Router>, config: &ExecutorConfig) -> Result<usize, ExecutorError> {
    crate::state::sweep_stuck_tasks(state, config.stuck_minutes)
        .await
        .map_err(|e| ExecutorError::State(StateError::StoreError(e.to_string())))?;
    super::assignment::run_assignment_pass(state, config).await?;

    let mlx_active = router.active_count(BackendFamily::Heavy);
    let ollama_active = router.active_count(BackendFamily::Fast);
    let router_config = router.config();

    let effective_n = if config.adaptive_concurrency {
        host_load::adaptive(
            config.max_concurrent,
            host_load::sample(),
            mlx_active,
            router_config.max_heavy_mlx,
            ollama_active,
            router_config.max_heavy_ollama,
        )
    } else {
        config.max_concurrent
    };

    let batch = pull(state, config.batch_size.min(effective_n.max(1))).await?;

    // A task is not picked up if doing so would push its family's heavy-model
    // ceiling over MAX_HEAVY_MLX/MAX_HEAVY_OLLAMA; it is left pending for a
    // later cycle rather than run over the ceiling.
    let mlx_ceiling = router_config.max_heavy_mlx;
    let ollama_ceiling = router_config.max_heavy_ollama;
    let mut mlx_in_flight = mlx_active;
    let mut ollama_in_flight = ollama_active;
    let mut runnable = Vec::with_capacity(batch.len());
    for task in batch {
        let ceiling_hit = match task.metadata.preferred_source {
            Some(BackendFamily::Heavy) => {
                let hit = mlx_ceiling > 0 && mlx_in_flight >= mlx_ceiling;
                if !hit {
                    mlx_in_flight += 1;
                }
                hit
            }
            _ => {
                let hit = ollama_ceiling > 0 && ollama_in_flight >= ollama_ceiling;
                if !hit {
                    ollama_in_flight += 1;
                }
                hit
            }
        };
        if ceiling_hit {
            debug!(task_id = %task.id, "run_cycle: heavy-model ceiling hit, leaving task pending");
            continue;
        }
        runnable.push(task);
    }
    let n = runnable.len();

    let mut handles = Vec::with_capacity(n);
    for task in runnable {
        let state = state.clone();
        let router = router.clone();
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = execute_one_task(&state, &router, &config, task).await {
                warn!(error = %e, "run_cycle: task execution failed");
            }
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }

    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Expert;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{CompletionResponse, StopReason, TokenUsage};
    use crate::router::RouterConfig;
    use std::collections::HashMap;
    use tempfile::TempDir;

    async fn manager() -> (StateManager, TempDir) {
        let dir = TempDir::new().unwrap();
        (StateManager::spawn(dir.path()).unwrap(), dir)
    }

    fn router_with_responses(responses: Vec<&str>) -> Arc<Router> {
        let responses = responses
            .into_iter()
            .map(|text| CompletionResponse {
                content: Some(text.to_string()),
                tool_calls: vec![],
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::default(),
            })
            .collect();
        let client = Arc::new(MockLlmClient::new(responses));
        Arc::new(Router::new(RouterConfig::default(), client.clone(), client, HashMap::new()))
    }

    #[tokio::test]
    async fn successful_completion_marks_task_done() {
        let (state, _dir) = manager().await;
        let router = router_with_responses(vec!["a complete and substantial answer to the request"]);
        let mut task = Task::new("do the thing", "proj");
        task.assign(DIRECT_ASSIGNEE, BackendFamily::Fast);
        let id = state.create_task(task.clone()).await.unwrap();
        task.id = id.clone();

        execute_one_task(&state, &router, &ExecutorConfig::default(), task).await.unwrap();

        let saved = state.get_task(&id).await.unwrap().unwrap();
        assert_eq!(saved.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn short_response_requeues_with_backoff() {
        let (state, _dir) = manager().await;
        let router = router_with_responses(vec!["no"]);
        let mut task = Task::new("do the thing", "proj");
        task.assign(DIRECT_ASSIGNEE, BackendFamily::Fast);
        let id = state.create_task(task.clone()).await.unwrap();
        task.id = id.clone();

        execute_one_task(&state, &router, &ExecutorConfig::default(), task).await.unwrap();

        let saved = state.get_task(&id).await.unwrap().unwrap();
        assert_eq!(saved.status, TaskStatus::Pending);
        assert!(saved.next_retry_after.is_some());
    }

    #[tokio::test]
    async fn exhausted_attempts_escalate_to_board() {
        let (state, _dir) = manager().await;
        let router = router_with_responses(vec!["no"]);
        let mut task = Task::new("do the thing", "proj");
        task.assign(DIRECT_ASSIGNEE, BackendFamily::Fast);
        task.attempt_count = 3; // already at MAX_ATTEMPTS before this attempt
        let id = state.create_task(task.clone()).await.unwrap();
        task.id = id.clone();

        execute_one_task(&state, &router, &ExecutorConfig::default(), task).await.unwrap();

        let saved = state.get_task(&id).await.unwrap().unwrap();
        assert_eq!(saved.status, TaskStatus::DeferredToHuman);
        assert!(saved.metadata.board_escalated);

        let decisions = state.list_board_decisions(vec![Filter::eq("task_id", IndexValue::String(id))]).await.unwrap();
        assert_eq!(decisions.len(), 1);
    }

    #[tokio::test]
    async fn escalates_on_the_third_cycle_from_a_fresh_task() {
        let (state, _dir) = manager().await;
        let router = router_with_responses(vec!["no", "no", "no"]);
        let config = ExecutorConfig::default();
        assert_eq!(config.max_attempts, 3);

        let mut task = Task::new("do the thing", "proj");
        task.assign(DIRECT_ASSIGNEE, BackendFamily::Fast);
        assert_eq!(task.attempt_count, 0);
        let id = state.create_task(task.clone()).await.unwrap();
        task.id = id.clone();

        for cycle in 1..=2 {
            let current = state.get_task(&id).await.unwrap().unwrap();
            execute_one_task(&state, &router, &config, current).await.unwrap();
            let saved = state.get_task(&id).await.unwrap().unwrap();
            assert_eq!(saved.status, TaskStatus::Pending, "cycle {cycle} should requeue, not escalate");
            assert_eq!(saved.attempt_count, cycle);
        }

        let current = state.get_task(&id).await.unwrap().unwrap();
        execute_one_task(&state, &router, &config, current).await.unwrap();
        let saved = state.get_task(&id).await.unwrap().unwrap();
        assert_eq!(saved.status, TaskStatus::DeferredToHuman, "3rd cycle should escalate under MAX_ATTEMPTS=3");
        assert_eq!(saved.attempt_count, 3);
        assert!(saved.metadata.board_escalated);
    }

    #[tokio::test]
    async fn pull_interleaves_fast_and_heavy_families() {
        let (state, _dir) = manager().await;
        for i in 0..2 {
            let mut t = Task::new(format!("fast task {i}"), "proj");
            t.assign(DIRECT_ASSIGNEE, BackendFamily::Fast);
            state.create_task(t).await.unwrap();
        }
        for i in 0..2 {
            let mut t = Task::new(format!("heavy task {i}"), "proj");
            t.assign(DIRECT_ASSIGNEE, BackendFamily::Heavy);
            state.create_task(t).await.unwrap();
        }

        let batch = pull(&state, 4).await.unwrap();
        assert_eq!(batch.len(), 4);
        assert_eq!(batch[0].metadata.preferred_source, Some(BackendFamily::Fast));
        assert_eq!(batch[1].metadata.preferred_source, Some(BackendFamily::Heavy));
    }

    #[tokio::test]
    async fn heavy_model_ceiling_leaves_excess_heavy_tasks_pending() {
        let (state, _dir) = manager().await;
        let responses = vec!["a complete and substantial answer to the request"; 3]
            .into_iter()
            .map(|text| CompletionResponse {
                content: Some(text.to_string()),
                tool_calls: vec![],
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::default(),
            })
            .collect();
        let client = Arc::new(MockLlmClient::new(responses));
        let mut router_config = RouterConfig::default();
        router_config.max_heavy_mlx = 1;
        let router = Arc::new(Router::new(router_config, client.clone(), client, HashMap::new()));

        for i in 0..3 {
            let mut t = Task::new(format!("heavy task {i}"), "proj");
            t.assign(DIRECT_ASSIGNEE, BackendFamily::Heavy);
            state.create_task(t).await.unwrap();
        }

        let n = run_cycle(&state, &router, &ExecutorConfig::default()).await.unwrap();
        assert_eq!(n, 1, "only MAX_HEAVY_MLX=1 heavy task should be picked up this cycle");

        let pending = state
            .list_tasks(vec![Filter::eq("status", IndexValue::String(TaskStatus::Pending.to_string()))])
            .await
            .unwrap();
        assert_eq!(pending.len(), 2, "the remaining heavy tasks stay pending rather than violate the ceiling");
    }

    #[tokio::test]
    async fn record_outcome_updates_expert_workload() {
        let (state, _dir) = manager().await;
        let mut expert = Expert::new("ada", "backend expert", "engineering", "eng", "prompt");
        expert.increment_workload();
        state.create_expert(expert).await.unwrap();

        record_outcome(&state, "ada", true).await.unwrap();

        let expert = state.get_expert("ada").await.unwrap().unwrap();
        assert_eq!(expert.workload, 0);
    }
}
