//! Deep-analysis planning: decomposes a goal into subtasks, runs them
//! directly in parallel bounded by `fanout-max`, and synthesizes one final
//! answer. Mirrors the board synthesizer's shape (`executor::escalation`):
//! a fixed JSON schema requested from the heavy family, with a deterministic
//! fallback when the model doesn't comply.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::BackendFamily;
use crate::llm::{CompletionRequest, Message};
use crate::router::{Router, RouterRequest};

const PLANNER_SYSTEM_PROMPT: &str = "You are the planning stage of a multi-agent task system. Decompose the \
goal into independent subtasks a small team of experts could execute in parallel where possible. Respond with \
JSON only, matching exactly this shape: {\"subtasks\": [{\"id\": string, \"description\": string, \
\"department\": string, \"role\": string, \"dependencies\": [string], \"can_parallel\": boolean, \
\"success_criteria\": string}], \"execution_order\": [string], \"parallel_groups\": [[string]], \
\"requirements\": [string]}.";

const SYNTHESIS_SYSTEM_PROMPT: &str = "You are synthesizing the results of several subtasks into one final \
answer for the user. Be direct and address the original goal; do not restate the subtask breakdown.";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Subtask {
    pub id: String,
    pub description: String,
    pub department: String,
    pub role: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default = "default_can_parallel")]
    pub can_parallel: bool,
    #[serde(default)]
    pub success_criteria: String,
}

fn default_can_parallel() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Plan {
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub execution_order: Vec<String>,
    #[serde(default)]
    pub parallel_groups: Vec<Vec<String>>,
    #[serde(default)]
    pub requirements: Vec<String>,
}

fn fallback_plan(goal: &str) -> Plan {
    Plan {
        subtasks: vec![Subtask {
            id: "s1".to_string(),
            description: goal.to_string(),
            department: "general".to_string(),
            role: "generalist".to_string(),
            dependencies: vec![],
            can_parallel: true,
            success_criteria: "produces a usable answer to the goal".to_string(),
        }],
        execution_order: vec!["s1".to_string()],
        parallel_groups: vec![vec!["s1".to_string()]],
        requirements: vec![],
    }
}

/// Ask the heavy family to decompose `goal` into a `Plan`, falling back to a
/// single generalist subtask when the response doesn't parse.
pub async fn decompose(router: &Router, goal: &str, context: &str) -> Plan {
    debug!(goal_len = goal.len(), "plan::decompose: called");
    let user_prompt = format!("Goal: {goal}\n\nRelevant context:\n{context}\n\nProduce the decomposition.");
    let request = RouterRequest {
        prompt: CompletionRequest {
            system_prompt: PLANNER_SYSTEM_PROMPT.to_string(),
            messages: vec![Message::user(user_prompt)],
            max_tokens: 2048,
            tools: vec![],
        },
        category: "planning".to_string(),
        preferred_source: Some(BackendFamily::Heavy),
        preferred_model: None,
        stream: false,
    };

    match router.complete(request).await {
        Ok(response) => match serde_json::from_str::<Plan>(&response.text) {
            Ok(plan) if !plan.subtasks.is_empty() => plan,
            _ => {
                warn!("plan::decompose: planner response did not match expected JSON, using fallback plan");
                fallback_plan(goal)
            }
        },
        Err(e) => {
            warn!(error = %e, "plan::decompose: planner call failed, using fallback plan");
            fallback_plan(goal)
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubtaskOutcome {
    pub subtask_id: String,
    pub description: String,
    pub output: String,
    pub success: bool,
}

async fn run_one(router: &Router, subtask: &Subtask) -> SubtaskOutcome {
    let system_prompt = format!(
        "You are the {} department's {}. Success criteria: {}",
        subtask.department, subtask.role, subtask.success_criteria
    );
    let request = RouterRequest {
        prompt: CompletionRequest {
            system_prompt,
            messages: vec![Message::user(subtask.description.clone())],
            max_tokens: 2048,
            tools: vec![],
        },
        category: subtask.department.clone(),
        preferred_source: None,
        preferred_model: None,
        stream: false,
    };

    match router.complete(request).await {
        Ok(response) => SubtaskOutcome {
            subtask_id: subtask.id.clone(),
            description: subtask.description.clone(),
            output: response.text,
            success: true,
        },
        Err(e) => {
            warn!(subtask_id = %subtask.id, error = %e, "plan::run_one: subtask failed");
            SubtaskOutcome {
                subtask_id: subtask.id.clone(),
                description: subtask.description.clone(),
                output: String::new(),
                success: false,
            }
        }
    }
}

/// Run every subtask directly through the Router, chunked by `fanout_max`
/// concurrent calls at a time. Subtasks are not submitted to the durable
/// Executor: the sync caller is waiting on the result, so this stays a
/// plain in-process fan-out rather than a pull-based pipeline.
pub async fn run_fanout(router: &Router, plan: &Plan, fanout_max: usize) -> Vec<SubtaskOutcome> {
    let chunk_size = fanout_max.max(1);
    let mut outcomes = Vec::with_capacity(plan.subtasks.len());
    for chunk in plan.subtasks.chunks(chunk_size) {
        let futures = chunk.iter().map(|subtask| run_one(router, subtask));
        outcomes.extend(join_all(futures).await);
    }
    outcomes
}

/// Ask the heavy family to fold all subtask outcomes into one final answer.
pub async fn synthesize(router: &Router, goal: &str, outcomes: &[SubtaskOutcome]) -> String {
    let mut body = format!("Original goal: {goal}\n\nSubtask results:\n");
    for outcome in outcomes {
        if outcome.success {
            body.push_str(&format!("- [{}] {}: {}\n", outcome.subtask_id, outcome.description, outcome.output));
        } else {
            body.push_str(&format!("- [{}] {}: (failed, no result)\n", outcome.subtask_id, outcome.description));
        }
    }

    let request = RouterRequest {
        prompt: CompletionRequest {
            system_prompt: SYNTHESIS_SYSTEM_PROMPT.to_string(),
            messages: vec![Message::user(body)],
            max_tokens: 2048,
            tools: vec![],
        },
        category: "synthesis".to_string(),
        preferred_source: Some(BackendFamily::Heavy),
        preferred_model: None,
        stream: false,
    };

    match router.complete(request).await {
        Ok(response) => response.text,
        Err(e) => {
            warn!(error = %e, "plan::synthesize: synthesis call failed, concatenating subtask outputs");
            outcomes
                .iter()
                .filter(|o| o.success)
                .map(|o| o.output.clone())
                .collect::<Vec<_>>()
                .join("\n\n")
        }
    }
}

/// Whether any subtask a later one depends on came back empty: the signal
/// that drives one bounded plan revision.
pub fn has_empty_dependency_result(plan: &Plan, outcomes: &[SubtaskOutcome]) -> bool {
    outcomes.iter().any(|o| !o.success || o.output.trim().is_empty())
        && plan.subtasks.iter().any(|s| !s.dependencies.is_empty())
}
