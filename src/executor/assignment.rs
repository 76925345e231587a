//! Assignment pass: matches unassigned pending tasks to experts by a
//! composite score, and claims the winner with a conditional update so two
//! concurrent assignment passes can't both assign the same task.

use taskstore::{Filter, IndexValue};
use tracing::{debug, info};

use crate::domain::{BackendFamily, Task, TaskStatus, DIRECT_ASSIGNEE};
use crate::state::StateManager;

use super::config::ExecutorConfig;
use super::error::ExecutorError;

/// Crude domain-fit heuristic: fraction of the goal's words that appear in
/// the expert's role or department strings. A goal with no overlap with
/// any expert falls back to `DIRECT_ASSIGNEE` (Router-direct, no expert
/// system prompt).
fn domain_fit(goal: &str, role: &str, department: &str) -> f32 {
    let goal_words: Vec<String> = goal.split_whitespace().map(|w| w.to_lowercase()).collect();
    if goal_words.is_empty() {
        return 0.0;
    }
    let haystack = format!("{} {}", role, department).to_lowercase();
    let hits = goal_words.iter().filter(|w| w.len() > 2 && haystack.contains(w.as_str())).count();
    hits as f32 / goal_words.len() as f32
}

/// Department → preferred backend family. Engineering-leaning departments
/// route to the heavy family (more capable, slower); everything else
/// defaults to fast.
fn preferred_family(department: &str) -> BackendFamily {
    match department.to_lowercase().as_str() {
        "engineering" | "architecture" | "research" => BackendFamily::Heavy,
        _ => BackendFamily::Fast,
    }
}

/// Run one assignment pass: for every pending, unassigned task, pick the
/// best-scoring expert (or `direct`) and claim it. Returns the number of
/// tasks newly assigned.
pub async fn run_assignment_pass(state: &StateManager, config: &ExecutorConfig) -> Result<usize, ExecutorError> {
    debug!("run_assignment_pass: called");
    let pending = state
        .list_tasks(vec![Filter::eq("status", IndexValue::String(TaskStatus::Pending.to_string()))])
        .await?;
    let unassigned: Vec<Task> = pending.into_iter().filter(|t| t.assignee.is_none()).collect();
    if unassigned.is_empty() {
        return Ok(0);
    }

    let experts = state.list_experts(vec![]).await?;
    let mut assigned = 0;

    for mut task in unassigned {
        let best = experts
            .iter()
            .map(|expert| {
                let fit = domain_fit(&task.goal, &expert.role, &expert.department);
                let score = expert.composite_score(
                    fit,
                    config.assignment_weight_domain_fit,
                    config.assignment_weight_workload,
                    config.assignment_weight_success_rate,
                );
                (score, expert)
            })
            .filter(|(score, _)| *score > 0.0)
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let (assignee, family) = match best {
            Some((_, expert)) => (expert.name.clone(), preferred_family(&expert.department)),
            None => (DIRECT_ASSIGNEE.to_string(), BackendFamily::Fast),
        };

        task.assign(&assignee, family);
        let claimed = state.claim_task(task).await?;
        if claimed {
            assigned += 1;
            if let Some(mut expert) = state.get_expert(&assignee).await? {
                expert.increment_workload();
                state.update_expert(expert).await?;
            }
        }
    }

    if assigned > 0 {
        info!(assigned, "run_assignment_pass: assigned tasks");
    }
    debug!(assigned, "run_assignment_pass: returning");
    Ok(assigned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Expert;
    use tempfile::TempDir;

    async fn manager() -> (StateManager, TempDir) {
        let dir = TempDir::new().unwrap();
        (StateManager::spawn(dir.path()).unwrap(), dir)
    }

    #[tokio::test]
    async fn assigns_best_fit_expert() {
        let (state, _dir) = manager().await;
        state
            .create_expert(Expert::new("ada", "backend expert", "engineering", "eng", "prompt"))
            .await
            .unwrap();
        state
            .create_expert(Expert::new("grace", "frontend expert", "design", "design", "prompt"))
            .await
            .unwrap();
        let id = state.create_task(Task::new("fix the backend bug", "proj")).await.unwrap();

        let assigned = run_assignment_pass(&state, &ExecutorConfig::default()).await.unwrap();
        assert_eq!(assigned, 1);

        let task = state.get_task(&id).await.unwrap().unwrap();
        assert_eq!(task.assignee.as_deref(), Some("ada"));
        assert_eq!(task.metadata.preferred_source, Some(BackendFamily::Heavy));
    }

    #[tokio::test]
    async fn falls_back_to_direct_with_no_matching_expert() {
        let (state, _dir) = manager().await;
        let id = state.create_task(Task::new("say hello", "proj")).await.unwrap();

        let assigned = run_assignment_pass(&state, &ExecutorConfig::default()).await.unwrap();
        assert_eq!(assigned, 1);

        let task = state.get_task(&id).await.unwrap().unwrap();
        assert_eq!(task.assignee.as_deref(), Some(DIRECT_ASSIGNEE));
    }

    #[tokio::test]
    async fn does_not_reassign_already_assigned_task() {
        let (state, _dir) = manager().await;
        state
            .create_expert(Expert::new("ada", "backend expert", "engineering", "eng", "prompt"))
            .await
            .unwrap();
        let mut task = Task::new("fix the backend bug", "proj");
        task.assign("direct", BackendFamily::Fast);
        state.create_task(task).await.unwrap();

        let assigned = run_assignment_pass(&state, &ExecutorConfig::default()).await.unwrap();
        assert_eq!(assigned, 0);
    }
}
