//! HTTP surface for the Cowork task orchestration engine (axum).
//!
//! Wires the [`cowork_engine`] run loop behind the REST + SSE surface described in the
//! orchestrator's external interfaces: synchronous and enqueue-only chat, tool-approval
//! resolution, file upload/download, and the dependency-installer operational endpoints.
//!
//! **Public API**: [`run_serve`], [`run_serve_on_listener`].

mod app;
mod auth;
mod chat;
mod files;
mod ops;

use std::sync::Arc;

use cowork_engine::core_client::CoreClient;
use cowork_engine::manager::ProjectQueueManager;
use cowork_engine::run_loop::RunLoopDeps;
use cowork_engine::skills::RuntimeSkill;
use cowork_workdir::{Store, UploadStore, WorkdirResolver};
use env_config::Settings;
use tokio::net::TcpListener;
use tracing::info;

pub use app::AppState;

const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:8080";

/// Runs the HTTP server on an existing listener. Used by tests (bind to `127.0.0.1:0` then pass
/// the listener in).
pub async fn run_serve_on_listener(
    listener: TcpListener,
    skills: Vec<RuntimeSkill>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("HTTP server listening on http://{addr}");

    let settings = Arc::new(Settings::from_env());
    let core = CoreClient::from_settings(settings.core_api_url.clone(), settings.core_api_internal_key.clone());
    let manager = ProjectQueueManager::new(RunLoopDeps::new((*settings).clone(), core.clone(), skills));
    let workdir = WorkdirResolver::new(settings.resolved_workdir());
    let uploads = UploadStore::new(workdir.clone());
    let projects = std::env::var("COWORK_PROJECT_DB")
        .ok()
        .and_then(|path| Store::new(path).ok())
        .map(Arc::new);

    let state = Arc::new(AppState {
        manager,
        core,
        settings,
        uploads,
        workdir,
        projects,
        deps_state: ops::DepsState::from_env(),
    });

    let app = app::router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Runs the HTTP server. Listens on `addr` (default `127.0.0.1:8080`).
pub async fn run_serve(
    addr: Option<&str>,
    skills: Vec<RuntimeSkill>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = addr.unwrap_or(DEFAULT_HTTP_ADDR);
    let listener = TcpListener::bind(addr).await?;
    run_serve_on_listener(listener, skills).await
}
