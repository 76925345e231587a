//! Board synthesizer: produces a `BoardDecision` when a task has exhausted
//! its retry budget.
//!
//! Resolves the spec's open question about the arbiter's expected JSON by
//! fixing a small schema (see `BoardDecision::from_arbiter_json`) and
//! asking the heavy family for exactly that shape; a rule-based fallback
//! covers the case where the model doesn't comply.

use tracing::{debug, warn};

use crate::domain::{BackendFamily, BoardDecision, Task};
use crate::llm::{CompletionRequest, Message};
use crate::router::{Router, RouterRequest};

const ARBITER_SYSTEM_PROMPT: &str = "You are the escalation board for an autonomous task system. A task has \
failed repeatedly and is being handed to a human. Respond with JSON only, matching exactly this shape: \
{\"decision\": string, \"rationale\": string, \"risks\": [string], \"confidence\": number between 0 and 1, \
\"recommend_human_review\": boolean}.";

fn fallback_decision(task: &Task) -> BoardDecision {
    BoardDecision::new(
        &task.id,
        "defer_to_human",
        format!(
            "Task exhausted {} attempts without a usable result; automated escalation could not be synthesized.",
            task.attempt_count
        ),
        vec!["arbiter response unavailable or malformed".to_string()],
        0.0,
        true,
    )
}

/// Ask the heavy family to synthesize a board decision for an exhausted
/// task, persisting either its answer or a deterministic fallback.
pub async fn synthesize(router: &Router, task: &Task) -> BoardDecision {
    debug!(task_id = %task.id, attempts = task.attempt_count, "escalation::synthesize: called");

    let prompt = format!(
        "Task goal: {}\nProject: {}\nAttempts made: {}\nLast error: {:?}\n\nDecide what should happen next.",
        task.goal, task.project_context, task.attempt_count, task.metadata.last_error
    );

    let request = RouterRequest {
        prompt: CompletionRequest {
            system_prompt: ARBITER_SYSTEM_PROMPT.to_string(),
            messages: vec![Message::user(prompt)],
            max_tokens: 1024,
            tools: vec![],
        },
        category: "escalation".to_string(),
        preferred_source: Some(BackendFamily::Heavy),
        preferred_model: None,
        stream: false,
    };

    match router.complete(request).await {
        Ok(response) => match BoardDecision::from_arbiter_json(&task.id, &response.text) {
            Some(decision) => decision,
            None => {
                warn!(task_id = %task.id, "escalation::synthesize: arbiter response did not match expected JSON");
                fallback_decision(task)
            }
        },
        Err(e) => {
            warn!(task_id = %task.id, error = %e, "escalation::synthesize: arbiter call failed");
            fallback_decision(task)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{CompletionResponse, StopReason, TokenUsage};
    use crate::router::RouterConfig;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn router_with_response(text: &str) -> Router {
        let client = Arc::new(MockLlmClient::new(vec![CompletionResponse {
            content: Some(text.to_string()),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        }]));
        Router::new(RouterConfig::default(), client.clone(), client, HashMap::new())
    }

    #[tokio::test]
    async fn parses_well_formed_arbiter_json() {
        let router = router_with_response(
            r#"{"decision": "retry with backoff", "rationale": "transient failures", "risks": [], "confidence": 0.7, "recommend_human_review": true}"#,
        );
        let task = Task::new("goal", "proj");
        let decision = synthesize(&router, &task).await;
        assert_eq!(decision.decision, "retry with backoff");
        assert!(decision.recommend_human_review);
    }

    #[tokio::test]
    async fn falls_back_on_malformed_json() {
        let router = router_with_response("not json at all");
        let task = Task::new("goal", "proj");
        let decision = synthesize(&router, &task).await;
        assert_eq!(decision.decision, "defer_to_human");
        assert!(decision.recommend_human_review);
    }
}
