//! Conductor: the synchronous/async API surface that classifies a goal,
//! picks a strategy, and either answers directly, fans a plan out across
//! experts, or hands the goal to the durable Executor.
//!
//! Mirrors the Router/Retrieval/Executor shape: one struct holding its own
//! config plus the other subsystems it orchestrates, with the heavyweight
//! work broken out into sibling modules (`classify`, `plan`, `templates`,
//! `http`).

mod classify;
mod config;
mod error;
pub mod http;
mod metrics;
mod plan;
mod templates;

pub use classify::Category;
pub use config::ConductorConfig;
pub use error::ConductorError;
pub use metrics::ConductorMetrics;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::domain::{generate_id, BackendFamily, KnowledgeNode, SessionExchange, Task, DIRECT_ASSIGNEE};
use crate::executor::Executor;
use crate::retrieval::Retrieval;
use crate::router::{Router, RouterRequest};
use crate::state::StateManager;
use classify::{is_ambiguous, is_simple_one_shot, UnderstandCache};
use templates::Templates;

/// One chat-style turn supplied by the caller as short-term context.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub user: String,
    pub assistant: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub goal: String,
    pub project_context: Option<String>,
    pub session_id: Option<String>,
    pub chat_history: Vec<ChatTurn>,
    pub async_mode: bool,
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Success {
        output: String,
        knowledge_refs: Vec<String>,
        correlation_id: String,
    },
    NeedsClarification {
        questions: Vec<String>,
        suggested_restatement: String,
        correlation_id: String,
    },
    Accepted {
        task_id: String,
        correlation_id: String,
        status_url: String,
    },
    Overloaded {
        retry_after_secs: u64,
    },
}

#[derive(Debug, Clone)]
pub enum StatusOutcome {
    Queued,
    Running,
    Completed(RunOutcome),
    Failed(String),
}

/// Owns the cross-subsystem wiring (StateManager, Router, Executor,
/// Retrieval) plus the Conductor's own tuning knobs, cache and sync
/// backpressure semaphore.
pub struct Conductor {
    config: ConductorConfig,
    state: StateManager,
    router: Arc<Router>,
    executor: Arc<Executor>,
    retrieval: Arc<Retrieval>,
    sync_semaphore: Semaphore,
    understand_cache: UnderstandCache,
    templates: Templates,
    metrics: ConductorMetrics,
}

impl Conductor {
    pub fn new(
        config: ConductorConfig,
        state: StateManager,
        router: Arc<Router>,
        executor: Arc<Executor>,
        retrieval: Arc<Retrieval>,
    ) -> Self {
        let understand_cache = UnderstandCache::new(config.understand_max, Duration::from_secs(config.understand_ttl_sec));
        let templates = Templates::new(config.templates_dir.as_ref().map(std::path::PathBuf::from));
        let sync_semaphore = Semaphore::new(config.max_concurrent_sync);
        Self {
            config,
            state,
            router,
            executor,
            retrieval,
            sync_semaphore,
            understand_cache,
            templates,
            metrics: ConductorMetrics::default(),
        }
    }

    pub fn config(&self) -> &ConductorConfig {
        &self.config
    }

    pub fn metrics(&self) -> &ConductorMetrics {
        &self.metrics
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn retrieval(&self) -> &Retrieval {
        &self.retrieval
    }

    pub fn templates(&self) -> &Templates {
        &self.templates
    }

    fn resolve_project_context(&self, requested: Option<String>) -> String {
        match requested {
            Some(pc) if self.config.registered_projects.is_empty() || self.config.registered_projects.contains(&pc) => pc,
            Some(pc) => {
                warn!(requested = %pc, "Conductor: unregistered project_context, using default");
                self.config.default_project_context.clone()
            }
            None => self.config.default_project_context.clone(),
        }
    }

    /// Run one goal through the full classify -> route -> respond pipeline.
    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome, ConductorError> {
        debug!(goal_len = request.goal.len(), async_mode = request.async_mode, "Conductor::run: called");
        if request.goal.trim().is_empty() {
            return Err(ConductorError::EmptyGoal);
        }
        if request.goal.len() > self.config.max_goal_chars {
            return Err(ConductorError::GoalTooLong);
        }

        let correlation_id = request
            .correlation_id
            .clone()
            .unwrap_or_else(|| generate_id("run", &request.goal));
        let project_context = self.resolve_project_context(request.project_context.clone());

        if request.async_mode {
            let mut task = Task::new(request.goal.clone(), project_context);
            task.metadata.web_context_attached = request.session_id.is_some();
            let task_id = self.state.create_task(task).await?;
            return Ok(RunOutcome::Accepted {
                status_url: format!("/run/status/{task_id}"),
                task_id,
                correlation_id,
            });
        }

        let permit = match self.sync_semaphore.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Conductor::run: over capacity, rejecting sync request");
                return Ok(RunOutcome::Overloaded {
                    retry_after_secs: self.config.overload_retry_after_secs,
                });
            }
        };

        let session_summary = request.chat_history.last().map(|turn| turn.assistant.clone());
        let understanding = self
            .understand_cache
            .get_or_compute(&project_context, &request.goal, session_summary.as_deref())
            .await;
        self.metrics.record_understand_cache_access();

        if self.config.strategy_enabled && is_ambiguous(&request.goal, understanding.category) {
            drop(permit);
            return Ok(RunOutcome::NeedsClarification {
                questions: self.clarifying_questions(&request.goal),
                suggested_restatement: format!("Could you restate this more specifically: \"{}\"?", request.goal.trim()),
                correlation_id,
            });
        }

        let output = match understanding.category {
            Category::Greeting => self.templates.greeting(),
            Category::WhatCanYouDo => self.templates.capabilities(),
            Category::StatusQuery => self.templates.status(),
            _ => {
                let context = self
                    .retrieval
                    .context(&self.state, &self.router, &project_context, &request.goal, None)
                    .await?;
                let context_text = context.render(4_000);

                let wants_fanout = self.config.strategy_enabled
                    && matches!(understanding.category, Category::Coding | Category::Execution | Category::MultiStep)
                    && !is_simple_one_shot(&request.goal);

                if wants_fanout {
                    self.metrics.record_fanout();
                    self.run_deep_analysis(&request.goal, &context_text).await?
                } else if matches!(understanding.category, Category::Coding | Category::Execution) {
                    self.run_light_executor(&request.goal, &project_context, &context_text).await?
                } else {
                    self.respond_directly(&request.goal, &context_text, "direct").await?
                }
            }
        };

        drop(permit);

        let knowledge_refs = self
            .record_memory(&request.goal, &output, &project_context, request.session_id.as_deref())
            .await;

        Ok(RunOutcome::Success {
            output,
            knowledge_refs,
            correlation_id,
        })
    }

    /// Check on a task previously accepted via `async_mode`.
    pub async fn status(&self, task_id: &str) -> Result<StatusOutcome, ConductorError> {
        let task = self
            .state
            .get_task(task_id)
            .await?
            .ok_or_else(|| ConductorError::TaskNotFound(task_id.to_string()))?;

        use crate::domain::TaskStatus;
        match task.status {
            TaskStatus::Pending => Ok(StatusOutcome::Queued),
            TaskStatus::InProgress => Ok(StatusOutcome::Running),
            TaskStatus::Completed => Ok(StatusOutcome::Completed(RunOutcome::Success {
                output: "task completed".to_string(),
                knowledge_refs: vec![],
                correlation_id: task.id,
            })),
            TaskStatus::DeferredToHuman => {
                let decisions = self
                    .state
                    .list_board_decisions(vec![taskstore::Filter::eq(
                        "task_id",
                        taskstore::IndexValue::String(task.id.clone()),
                    )])
                    .await?;
                let output = decisions
                    .last()
                    .map(|d| d.rationale.clone())
                    .unwrap_or_else(|| "task was escalated for human review".to_string());
                Ok(StatusOutcome::Completed(RunOutcome::Success {
                    output,
                    knowledge_refs: vec![],
                    correlation_id: task.id,
                }))
            }
            TaskStatus::Failed | TaskStatus::Cancelled => Ok(StatusOutcome::Failed(
                task.metadata.last_error.map(|e| e.to_string()).unwrap_or_else(|| task.status.to_string()),
            )),
        }
    }

    fn clarifying_questions(&self, goal: &str) -> Vec<String> {
        let mut questions = vec![format!("What outcome are you expecting from \"{}\"?", goal.trim())];
        questions.push("Which file, system or component does this concern?".to_string());
        questions.truncate(3);
        questions
    }

    async fn respond_directly(&self, goal: &str, context_text: &str, category: &str) -> Result<String, ConductorError> {
        let system_prompt = if context_text.is_empty() {
            "You are a helpful assistant.".to_string()
        } else {
            format!("You are a helpful assistant. Relevant context:\n{context_text}")
        };
        let request = RouterRequest {
            prompt: crate::llm::CompletionRequest {
                system_prompt,
                messages: vec![crate::llm::Message::user(goal.to_string())],
                max_tokens: 4_096,
                tools: vec![],
            },
            category: category.to_string(),
            preferred_source: None,
            preferred_model: None,
            stream: false,
        };
        Ok(self.router.complete(request).await?.text)
    }

    /// Delegation target for `IsSimpleOneShot` coding/execution goals: a
    /// direct Router call, recorded as a durable (already-terminal) Task row
    /// so one-shot delegations still show up in task history/auditing.
    async fn run_light_executor(&self, goal: &str, project_context: &str, context_text: &str) -> Result<String, ConductorError> {
        let mut task = Task::new(goal, project_context);
        task.assign(DIRECT_ASSIGNEE, BackendFamily::Fast);
        let task_id = self.state.create_task(task.clone()).await?;
        task.id = task_id;
        task.start_attempt();

        match self.respond_directly(goal, context_text, "light_executor").await {
            Ok(output) => {
                task.complete();
                self.state.update_task(task).await?;
                Ok(output)
            }
            Err(e) => {
                task.fail_attempt(crate::domain::LastError::Other, 0);
                self.state.update_task(task).await?;
                Err(e)
            }
        }
    }

    /// Decompose, fan out, and synthesize, re-decomposing once if a
    /// dependent subtask's result came back empty.
    async fn run_deep_analysis(&self, goal: &str, context_text: &str) -> Result<String, ConductorError> {
        let mut revisions_used = 0;
        let mut current_plan = plan::decompose(&self.router, goal, context_text).await;
        let mut outcomes = plan::run_fanout(&self.router, &current_plan, self.config.fanout_max).await;

        while plan::has_empty_dependency_result(&current_plan, &outcomes) && revisions_used < self.config.max_plan_revisions {
            revisions_used += 1;
            info!(revision = revisions_used, "Conductor::run_deep_analysis: revising plan after empty dependency result");
            current_plan = plan::decompose(&self.router, goal, context_text).await;
            outcomes = plan::run_fanout(&self.router, &current_plan, self.config.fanout_max).await;
        }

        Ok(plan::synthesize(&self.router, goal, &outcomes).await)
    }

    /// Persist the exchange to short-term session memory and a long-term
    /// knowledge node, returning the ids of anything newly written.
    async fn record_memory(&self, goal: &str, output: &str, project_context: &str, session_id: Option<&str>) -> Vec<String> {
        if let Some(session_id) = session_id {
            match self.state.get_session_exchange(session_id).await {
                Ok(Some(mut session)) => {
                    session.append(goal, output);
                    let _ = self.state.upsert_session_exchange(session).await;
                }
                Ok(None) => {
                    let mut session = SessionExchange::new(session_id);
                    session.append(goal, output);
                    let _ = self.state.upsert_session_exchange(session).await;
                }
                Err(e) => warn!(error = %e, "Conductor::record_memory: failed to load session exchange"),
            }
        }

        let mut node = KnowledgeNode::new(format!("Goal: {goal}\nOutcome: {output}"), "self");
        if let Ok(embedding) = self.router.embed(goal).await {
            node = node
                .with_embedding(embedding)
                .unwrap_or_else(|_| KnowledgeNode::new(format!("Goal: {goal}\nOutcome: {output}"), "self"));
        }
        node.metadata.domain = Some(project_context.to_string());
        match self.state.create_knowledge_node(node).await {
            Ok(id) => vec![id],
            Err(e) => {
                warn!(error = %e, "Conductor::record_memory: failed to persist knowledge node");
                vec![]
            }
        }
    }

    /// Ad hoc board consultation, independent of any Task: used by
    /// `POST /api/board/consult` when an external caller wants an arbiter
    /// opinion without going through the Executor's escalation path.
    pub async fn consult_board(&self, question: &str) -> crate::domain::BoardDecision {
        const CONSULT_SYSTEM_PROMPT: &str = "You are the escalation board for an autonomous task system, \
consulted directly rather than after a task failure. Respond with JSON only, matching exactly this shape: \
{\"decision\": string, \"rationale\": string, \"risks\": [string], \"confidence\": number between 0 and 1, \
\"recommend_human_review\": boolean}.";

        let request = RouterRequest {
            prompt: crate::llm::CompletionRequest {
                system_prompt: CONSULT_SYSTEM_PROMPT.to_string(),
                messages: vec![crate::llm::Message::user(question.to_string())],
                max_tokens: 1_024,
                tools: vec![],
            },
            category: "board_consult".to_string(),
            preferred_source: Some(BackendFamily::Heavy),
            preferred_model: None,
            stream: false,
        };

        match self.router.complete(request).await {
            Ok(response) => match crate::domain::BoardDecision::from_arbiter_json("consult", &response.text) {
                Some(decision) => decision,
                None => self.fallback_consult_decision(),
            },
            Err(e) => {
                warn!(error = %e, "Conductor::consult_board: arbiter call failed");
                self.fallback_consult_decision()
            }
        }
    }

    fn fallback_consult_decision(&self) -> crate::domain::BoardDecision {
        crate::domain::BoardDecision::new(
            "consult",
            "defer_to_human",
            "The arbiter could not produce a usable response.",
            vec!["arbiter response unavailable or malformed".to_string()],
            0.0,
            true,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{CompletionResponse, StopReason, TokenUsage};
    use crate::router::RouterConfig;
    use std::collections::HashMap;
    use tempfile::TempDir;

    async fn harness(responses: Vec<&str>) -> (Conductor, TempDir) {
        let dir = TempDir::new().unwrap();
        let state = StateManager::spawn(dir.path()).unwrap();
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
        let router = Arc::new(Router::new(RouterConfig::default(), client.clone(), client, HashMap::new()));
        let executor = Arc::new(Executor::new(crate::executor::ExecutorConfig::default()));
        let retrieval = Arc::new(Retrieval::new(crate::retrieval::RetrievalConfig::default()));
        let conductor = Conductor::new(ConductorConfig::default(), state, router, executor, retrieval);
        (conductor, dir)
    }

    #[tokio::test]
    async fn greeting_short_circuits_without_llm_call() {
        let (conductor, _dir) = harness(vec![]).await;
        let outcome = conductor
            .run(RunRequest {
                goal: "hello".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        match outcome {
            RunOutcome::Success { output, .. } => assert!(!output.is_empty()),
            other => panic!("expected Success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn short_pronoun_goal_asks_for_clarification() {
        let (conductor, _dir) = harness(vec![]).await;
        let outcome = conductor
            .run(RunRequest {
                goal: "fix it".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(matches!(outcome, RunOutcome::NeedsClarification { .. }));
    }

    #[tokio::test]
    async fn empty_goal_is_rejected() {
        let (conductor, _dir) = harness(vec![]).await;
        let err = conductor
            .run(RunRequest {
                goal: "   ".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ConductorError::EmptyGoal));
    }

    #[tokio::test]
    async fn async_mode_accepts_and_returns_status_url() {
        let (conductor, _dir) = harness(vec![]).await;
        let outcome = conductor
            .run(RunRequest {
                goal: "do something later".to_string(),
                async_mode: true,
                ..Default::default()
            })
            .await
            .unwrap();
        match outcome {
            RunOutcome::Accepted { task_id, status_url, .. } => assert_eq!(status_url, format!("/run/status/{task_id}")),
            other => panic!("expected Accepted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn simple_one_shot_coding_goal_skips_fanout() {
        let (conductor, _dir) = harness(vec!["here is the fix"]).await;
        let outcome = conductor
            .run(RunRequest {
                goal: "fix the typo in README.md".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        match outcome {
            RunOutcome::Success { output, .. } => assert_eq!(output, "here is the fix"),
            other => panic!("expected Success, got {other:?}"),
        }
    }
}
