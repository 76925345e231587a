//! HTTP surface: thin axum handlers translating `Conductor`'s outcomes into
//! the wire JSON contract. Grounded on the same `AppState` + `IntoResponse`
//! error-wrapper idiom used for the cross-pack reference server (one
//! `Router::new().route(...).with_state(state)` tree, a `TraceLayer` for
//! request logging).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router as AxumRouter};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ChatTurn, Conductor, ConductorError, RunOutcome, RunRequest, StatusOutcome};

#[derive(Clone)]
pub struct AppState {
    pub conductor: Arc<Conductor>,
}

pub fn router(conductor: Arc<Conductor>) -> AxumRouter {
    AxumRouter::new()
        .route("/run", post(run_handler))
        .route("/run/status/{task_id}", get(status_handler))
        .route("/status", get(status_summary_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/board/consult", post(board_consult_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(AppState { conductor })
}

struct ApiError(ConductorError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ConductorError::EmptyGoal | ConductorError::GoalTooLong => StatusCode::BAD_REQUEST,
            ConductorError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            ConductorError::Overloaded { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({"status": "error", "message": self.0.to_string()}))).into_response()
    }
}

impl From<ConductorError> for ApiError {
    fn from(e: ConductorError) -> Self {
        ApiError(e)
    }
}

#[derive(Deserialize)]
struct ChatTurnBody {
    user: String,
    assistant: String,
}

#[derive(Deserialize)]
struct RunBody {
    goal: String,
    #[serde(default)]
    project_context: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    chat_history: Vec<ChatTurnBody>,
}

#[derive(Deserialize)]
struct RunQuery {
    #[serde(default)]
    async_mode: bool,
}

async fn run_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<RunQuery>,
    Json(body): Json<RunBody>,
) -> Response {
    let correlation_id = headers.get("X-Correlation-ID").and_then(|v| v.to_str().ok()).map(str::to_string);

    let request = RunRequest {
        goal: body.goal,
        project_context: body.project_context,
        session_id: body.session_id,
        chat_history: body
            .chat_history
            .into_iter()
            .map(|t| ChatTurn {
                user: t.user,
                assistant: t.assistant,
            })
            .collect(),
        async_mode: query.async_mode,
        correlation_id,
    };

    match state.conductor.run(request).await {
        Ok(RunOutcome::Success {
            output,
            knowledge_refs,
            correlation_id,
        }) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "output": output,
                "knowledge": {"refs": knowledge_refs},
                "correlation_id": correlation_id,
            })),
        )
            .into_response(),
        Ok(RunOutcome::NeedsClarification {
            questions,
            suggested_restatement,
            correlation_id,
        }) => (
            StatusCode::OK,
            Json(json!({
                "status": "needs_clarification",
                "clarification_questions": questions,
                "suggested_restatement": suggested_restatement,
                "correlation_id": correlation_id,
            })),
        )
            .into_response(),
        Ok(RunOutcome::Accepted {
            task_id,
            correlation_id,
            status_url,
        }) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "status": "accepted",
                "task_id": task_id,
                "correlation_id": correlation_id,
                "status_url": status_url,
            })),
        )
            .into_response(),
        Ok(RunOutcome::Overloaded { retry_after_secs }) => {
            let mut response = (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "overloaded"}))).into_response();
            if let Ok(value) = retry_after_secs.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
            response
        }
        Err(e) => ApiError(e).into_response(),
    }
}

async fn status_handler(State(state): State<AppState>, Path(task_id): Path<String>) -> Response {
    match state.conductor.status(&task_id).await {
        Ok(StatusOutcome::Queued) => (StatusCode::OK, Json(json!({"status": "queued"}))).into_response(),
        Ok(StatusOutcome::Running) => (StatusCode::OK, Json(json!({"status": "running"}))).into_response(),
        Ok(StatusOutcome::Completed(RunOutcome::Success {
            output,
            knowledge_refs,
            correlation_id,
        })) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "output": output,
                "knowledge": {"refs": knowledge_refs},
                "correlation_id": correlation_id,
            })),
        )
            .into_response(),
        Ok(StatusOutcome::Completed(_)) => (StatusCode::OK, Json(json!({"status": "success"}))).into_response(),
        Ok(StatusOutcome::Failed(reason)) => {
            (StatusCode::OK, Json(json!({"status": "failed", "reason": reason}))).into_response()
        }
        Err(e) => ApiError(e).into_response(),
    }
}

async fn status_summary_handler(State(state): State<AppState>) -> Response {
    let latency = state.conductor.retrieval().latency().snapshot().await;
    (
        StatusCode::OK,
        Json(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "capabilities": state.conductor.templates().capabilities(),
            "levels": {
                "agent": true,
                "enhanced": state.conductor.config().strategy_enabled,
                "initiative": true,
            },
            "rag_latency": latency,
        })),
    )
        .into_response()
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let state_ok = state.conductor.state().list_tasks(vec![]).await.is_ok();
    let status = if state_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(json!({"status": if state_ok {"healthy"} else {"unhealthy"}, "subsystems": {"state": state_ok}}))).into_response()
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    (StatusCode::OK, state.conductor.metrics().render()).into_response()
}

#[derive(Deserialize)]
struct BoardConsultBody {
    question: String,
}

#[derive(Serialize)]
struct BoardConsultResponse {
    decision: String,
    rationale: String,
    risks: Vec<String>,
    confidence: f32,
    recommend_human_review: bool,
}

async fn board_consult_handler(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<BoardConsultBody>) -> Response {
    let key_env = &state.conductor.executor().config().board_api_key_env;
    let expected = std::env::var(key_env).unwrap_or_default();
    let supplied = headers.get("X-API-Key").and_then(|v| v.to_str().ok()).unwrap_or_default();
    if expected.is_empty() || supplied != expected {
        return (StatusCode::UNAUTHORIZED, Json(json!({"status": "error", "message": "invalid or missing X-API-Key"})))
            .into_response();
    }

    let decision = state.conductor.consult_board(&body.question).await;
    (
        StatusCode::OK,
        Json(BoardConsultResponse {
            decision: decision.decision,
            rationale: decision.rationale,
            risks: decision.risks,
            confidence: decision.confidence,
            recommend_human_review: decision.recommend_human_review,
        }),
    )
        .into_response()
}
