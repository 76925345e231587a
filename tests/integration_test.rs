//! Cross-module integration tests for orchestratord.
//!
//! Unit tests inside each subsystem module already cover their own
//! mechanics in isolation (assignment scoring, stuck-task reclaim, router
//! failover, escalation JSON parsing, ...). These tests instead drive a
//! goal through Conductor/Executor/Router/StateManager together, the way
//! `serve()` in `main.rs` wires them, to catch anything that only breaks
//! at the seams.

use std::collections::HashMap;
use std::sync::Arc;

use orchestrator::domain::{BackendFamily, Filter, IndexValue, Task, TaskStatus};
use orchestrator::llm::client::mock::MockLlmClient;
use orchestrator::llm::{CompletionResponse, StopReason, TokenUsage};
use orchestrator::router::RouterConfig;
use orchestrator::state::StateManager;
use orchestrator::{Conductor, ConductorConfig, Executor, ExecutorConfig, Retrieval, RetrievalConfig, Router};
use orchestrator::conductor::{ChatTurn, RunOutcome, RunRequest, StatusOutcome};
use tempfile::TempDir;

fn canned(responses: Vec<&str>) -> Arc<Router> {
    let completions: Vec<CompletionResponse> = responses
        .into_iter()
        .map(|text| CompletionResponse {
            content: Some(text.to_string()),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        })
        .collect();
    let client = Arc::new(MockLlmClient::new(completions));
    Arc::new(Router::new(RouterConfig::default(), client.clone(), client, HashMap::new()))
}

fn conductor_with(router: Arc<Router>, state: StateManager) -> Conductor {
    let executor = Arc::new(Executor::new(ExecutorConfig::default()));
    let retrieval = Arc::new(Retrieval::new(RetrievalConfig::default()));
    Conductor::new(ConductorConfig::default(), state, router, executor, retrieval)
}

/// Accept a goal async, run one assignment pass and one worker cycle by
/// hand (the same two calls `run_executor_loop` makes in `main.rs`), and
/// confirm the task surfaces as Completed through `Conductor::status`.
#[tokio::test]
async fn async_goal_is_accepted_assigned_and_completed() {
    let dir = TempDir::new().unwrap();
    let state = StateManager::spawn(dir.path()).unwrap();
    let router = canned(vec!["a thorough, substantive answer to the request"]);
    let executor = Executor::new(ExecutorConfig::default());
    let conductor = conductor_with(router.clone(), state.clone());

    let request = RunRequest {
        goal: "write a function that reverses a string".to_string(),
        async_mode: true,
        ..Default::default()
    };
    let task_id = match conductor.run(request).await.unwrap() {
        RunOutcome::Accepted { task_id, .. } => task_id,
        other => panic!("expected Accepted, got {other:?}"),
    };

    assert!(matches!(conductor.status(&task_id).await.unwrap(), StatusOutcome::Queued));

    let assigned = executor.assign(&state).await.unwrap();
    assert_eq!(assigned, 1, "unassigned pending task should be claimed by the assignment pass");

    let ran = executor.run_cycle(&state, &router).await.unwrap();
    assert_eq!(ran, 1);

    let task = state.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
}

/// A task whose heartbeat went stale while `in_progress` (worker crashed,
/// box rebooted, whatever) gets reclaimed by the stuck sweep that
/// `Executor::run_cycle` runs before every pull, then completes normally
/// on the very next cycle.
#[tokio::test]
async fn stuck_in_progress_task_is_reclaimed_then_completed() {
    let dir = TempDir::new().unwrap();
    let state = StateManager::spawn(dir.path()).unwrap();
    let router = canned(vec!["a thorough, substantive answer to the request"]);
    let config = ExecutorConfig {
        stuck_minutes: 15,
        ..Default::default()
    };
    let executor = Executor::new(config);

    let mut task = Task::new("investigate the outage", "proj");
    task.assign("direct", BackendFamily::Fast);
    task.start_attempt();
    task.updated_at = taskstore::now_ms() - (20 * 60 * 1000);
    let task_id = state.create_task(task).await.unwrap();

    let ran = executor.run_cycle(&state, &router).await.unwrap();
    assert_eq!(ran, 1, "reclaimed task should be pulled and executed in the same cycle");

    let task = state.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.attempt_count, 2, "reclaim preserves attempt_count; the retry increments it once more");
}

/// `Conductor::run` in sync mode, routed through a registered expert: the
/// assignment pass never runs here (sync calls don't touch the task
/// store), so this exercises the direct-response path end to end instead.
#[tokio::test]
async fn sync_goal_with_chat_history_returns_output_and_records_memory() {
    let dir = TempDir::new().unwrap();
    let state = StateManager::spawn(dir.path()).unwrap();
    let router = canned(vec!["Reversing a string in Rust: `s.chars().rev().collect()`."]);
    let conductor = conductor_with(router, state.clone());

    let request = RunRequest {
        goal: "how do I reverse a string in rust".to_string(),
        chat_history: vec![ChatTurn {
            user: "what language are we using".to_string(),
            assistant: "Rust".to_string(),
        }],
        ..Default::default()
    };

    let output = match conductor.run(request).await.unwrap() {
        RunOutcome::Success { output, .. } => output,
        other => panic!("expected Success, got {other:?}"),
    };
    assert!(output.contains("rev"));

    let nodes = state.list_knowledge_nodes(vec![]).await.unwrap();
    assert!(!nodes.is_empty(), "a successful direct answer should be recorded to the knowledge store");
}

/// Submitting more sync requests than `max_concurrent_sync` permits rejects
/// the overflow with `Overloaded` rather than queuing unboundedly.
#[tokio::test]
async fn sync_requests_beyond_capacity_are_overloaded() {
    let dir = TempDir::new().unwrap();
    let state = StateManager::spawn(dir.path()).unwrap();
    let router = canned(vec!["first response held up while the semaphore is contended"]);
    let config = ConductorConfig {
        max_concurrent_sync: 1,
        ..Default::default()
    };
    let executor = Arc::new(Executor::new(ExecutorConfig::default()));
    let retrieval = Arc::new(Retrieval::new(RetrievalConfig::default()));
    let conductor = Arc::new(Conductor::new(config, state, router, executor, retrieval));

    let held = conductor.clone();
    let blocker = tokio::spawn(async move {
        held.run(RunRequest {
            goal: "draft a detailed project plan for the migration".to_string(),
            ..Default::default()
        })
        .await
    });
    tokio::task::yield_now().await;

    let overflow = conductor
        .run(RunRequest {
            goal: "draft another detailed project plan".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(matches!(overflow, RunOutcome::Overloaded { .. }));

    blocker.await.unwrap().unwrap();
}

/// Filtering board decisions by `task_id` after an escalation, the way
/// `print_status`/an operator dashboard would, returns exactly the
/// decision tied to that task and none other.
#[tokio::test]
async fn board_decisions_are_queryable_by_task_id() {
    let dir = TempDir::new().unwrap();
    let state = StateManager::spawn(dir.path()).unwrap();
    let router = canned(vec!["no", "no"]);
    let config = ExecutorConfig {
        max_attempts: 1,
        ..Default::default()
    };
    let executor = Executor::new(config);

    let mut task = Task::new("flaky task", "proj");
    task.assign("direct", BackendFamily::Fast);
    task.attempt_count = 1;
    let task_id = state.create_task(task).await.unwrap();

    executor.run_cycle(&state, &router).await.unwrap();

    let task = state.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::DeferredToHuman);

    let decisions = state
        .list_board_decisions(vec![Filter::eq("task_id", IndexValue::String(task_id.clone()))])
        .await
        .unwrap();
    assert_eq!(decisions.len(), 1);
    assert!(decisions[0].recommend_human_review);
}
