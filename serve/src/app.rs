//! Axum app: shared state and router (§6 "External interfaces").

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use cowork_engine::core_client::CoreClient;
use cowork_engine::manager::ProjectQueueManager;
use cowork_workdir::{Store, UploadStore, WorkdirResolver};
use env_config::Settings;

use crate::{chat, files, ops};

pub struct AppState {
    pub manager: Arc<ProjectQueueManager>,
    pub core: Option<CoreClient>,
    pub settings: Arc<Settings>,
    pub uploads: UploadStore,
    pub workdir: WorkdirResolver,
    pub projects: Option<Arc<Store>>,
    pub deps_state: ops::DepsState,
}

/// Builds the router (§6 "External interfaces"). `/chat*` and `/files*` handlers each take an
/// [`crate::auth::AuthUser`] extractor, so the bearer/cookie check runs before the handler body
/// regardless of which route it is. `/ops/deps*` is operational and unauthenticated, matching the
/// upstream runtime's deployment-internal dependency installer.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat", post(chat::stream_chat))
        .route("/chat/:project_id/improve", post(chat::enqueue_improve))
        .route("/chat/:project_id", delete(chat::stop))
        .route("/chat/:project_id/permission", post(chat::resolve_permission))
        .route("/files/upload", post(files::upload))
        .route("/files/:project_id/:file_id", get(files::download_upload))
        .route(
            "/files/generated/:project_id/download",
            get(files::download_generated),
        )
        .route("/ops/deps/status", get(ops::status))
        .route("/ops/deps/install", post(ops::install))
        .route("/ops/deps/logs", get(ops::logs))
        .route("/ops/deps/stream", get(ops::stream))
        .with_state(state)
}
