//! `/chat*` handlers (§6): synchronous streamed turns, enqueue-only turns, stop, and
//! tool-permission resolution.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use axum::http::StatusCode;
use cowork_engine::action::{Action, AgentSpec, AttachmentPayload, ProviderOverride};
use cowork_engine::toolkit::ApprovalDecision;
use futures_util::Stream;
use serde::Deserialize;
use serde_json::json;
use stream_event::StepKind;

use crate::app::AppState;
use crate::auth::AuthUser;

#[derive(Debug, Deserialize)]
pub struct ImproveBody {
    pub task_id: String,
    pub question: String,
    #[serde(default)]
    pub search_enabled: Option<bool>,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
    #[serde(default)]
    pub provider_override: Option<ProviderOverride>,
    #[serde(default)]
    pub custom_agents: Vec<AgentSpec>,
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub project_id: String,
    #[serde(flatten)]
    pub improve: ImproveBody,
}

fn into_action(project_id: String, auth_token: String, body: ImproveBody) -> Action {
    Action::Improve {
        project_id,
        task_id: body.task_id,
        question: body.question,
        search_enabled: body.search_enabled,
        attachments: body.attachments,
        auth_token: Some(auth_token),
        provider_override: body.provider_override,
        custom_agents: body.custom_agents,
    }
}

/// `POST /chat` — enqueues an `Improve` action and streams its step events as SSE until `end`.
/// Subscribes to the project's event channel *before* enqueuing, so no event between the two
/// calls can be missed (§4.1, a project runs one turn at a time).
pub async fn stream_chat(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<ChatBody>,
) -> impl IntoResponse {
    let lock = state.manager.get_or_create(&body.project_id);
    let mut rx = lock.subscribe_events();
    state
        .manager
        .enqueue(into_action(body.project_id, auth.token, body.improve));

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let terminal = event.step.is_terminal();
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok::<_, Infallible>(Event::default().data(data));
                    if terminal {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    let stream: std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>> = Box::pin(stream);
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

/// `POST /chat/{project_id}/improve` — enqueue-only; no stream is attached so the turn's events
/// simply aren't observed by this request (they're still persisted via `POST /chat/steps`).
pub async fn enqueue_improve(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(project_id): Path<String>,
    Json(body): Json<ImproveBody>,
) -> impl IntoResponse {
    state.manager.enqueue(into_action(project_id, auth.token, body));
    Json(json!({ "status": "queued" }))
}

/// `DELETE /chat/{project_id}` — enqueues a `Stop`; the run loop's next observation point picks
/// it up (§4.2).
pub async fn stop(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    state.manager.enqueue(Action::Stop { project_id, reason: None });
    Json(json!({ "status": "stopping" }))
}

#[derive(Debug, Deserialize)]
pub struct PermissionBody {
    pub request_id: String,
    pub approved: bool,
    #[serde(default)]
    pub remember: bool,
}

/// `POST /chat/{project_id}/permission` — resolves a pending `ask_user` prompt (§4.5).
pub async fn resolve_permission(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(project_id): Path<String>,
    Json(body): Json<PermissionBody>,
) -> impl IntoResponse {
    let Some(lock) = state.manager.get(&project_id) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown project" }))).into_response();
    };
    let decision = if body.approved { ApprovalDecision::Allow } else { ApprovalDecision::Deny };
    if !lock.resolve_approval(&body.request_id, decision, body.remember).await {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown or already-resolved request_id" })),
        )
            .into_response();
    }
    Json(json!({ "status": "recorded" })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_is_the_only_terminal_step_kind() {
        assert!(StepKind::End.is_terminal());
        assert!(!StepKind::Confirmed.is_terminal());
    }
}
