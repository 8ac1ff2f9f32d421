//! `/ops/deps*` (§6): background installer for the optional browser-automation toolchain
//! (Node/npm/Playwright). Generalized from the upstream runtime's installer, which additionally
//! built a Python-package-local TypeScript toolkit — this crate has no such local toolkit to
//! build, so install here only drives the Playwright browser download.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use crate::app::AppState;

fn deps_root() -> PathBuf {
    std::env::var("COWORK_DEPS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs::home_dir().unwrap_or_else(std::env::temp_dir).join(".cowork").join("deps"))
}

fn status_path(root: &Path) -> PathBuf {
    root.join("status.json")
}

fn log_path(root: &Path) -> PathBuf {
    root.join("install.log")
}

fn lock_path(root: &Path) -> PathBuf {
    root.join("install.lock")
}

fn now_unix_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DepsStatus {
    pub state: String,
    pub progress: u32,
    pub message: String,
    pub error: Option<String>,
    pub started_at: Option<f64>,
    pub finished_at: Option<f64>,
}

impl Default for DepsStatus {
    fn default() -> Self {
        Self {
            state: "idle".to_string(),
            progress: 0,
            message: "idle".to_string(),
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

fn read_status(root: &Path) -> DepsStatus {
    let Ok(content) = std::fs::read_to_string(status_path(root)) else {
        return DepsStatus::default();
    };
    serde_json::from_str(&content).unwrap_or_default()
}

fn write_status(root: &Path, status: &DepsStatus) {
    if let Err(e) = std::fs::create_dir_all(root) {
        tracing::warn!(error = %e, "failed to create deps root");
        return;
    }
    if let Ok(body) = serde_json::to_vec_pretty(status) {
        let _ = std::fs::write(status_path(root), body);
    }
}

fn append_log(root: &Path, line: &str) {
    if std::fs::create_dir_all(root).is_err() {
        return;
    }
    use std::io::Write;
    if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(log_path(root)) {
        let _ = writeln!(file, "{line}");
    }
}

#[derive(Debug, Serialize)]
pub struct DepsChecks {
    pub node: bool,
    pub npm: bool,
    pub npx: bool,
    pub playwright_browsers: bool,
    pub ready: bool,
}

fn check_dependencies(root: &Path) -> DepsChecks {
    let node = which::which("node").is_ok();
    let npm = which::which("npm").is_ok();
    let npx = which::which("npx").is_ok();
    let playwright_browsers = root.join(".playwright_installed").exists();
    DepsChecks {
        node,
        npm,
        npx,
        playwright_browsers,
        ready: playwright_browsers,
    }
}

/// Shared guard against two installs running at once, and the configured deps root.
pub struct DepsState {
    root: PathBuf,
    installing: Arc<Mutex<()>>,
}

impl DepsState {
    pub fn from_env() -> Self {
        Self {
            root: deps_root(),
            installing: Arc::new(Mutex::new(())),
        }
    }
}

fn deps_enabled() -> bool {
    if let Ok(flag) = std::env::var("COWORK_DEPS_API_ENABLED") {
        return matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
    }
    std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()) != "production"
}

/// `GET /ops/deps/status`
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let root = state.deps_state.root.clone();
    let status = read_status(&root);
    let checks = check_dependencies(&root);
    Json(json!({ "status": status, "checks": checks }))
}

#[derive(Debug, Deserialize, Default)]
pub struct InstallQuery {
    #[serde(default)]
    pub force: bool,
}

/// `POST /ops/deps/install` — 403 when disabled (production, unless explicitly opted in).
pub async fn install(State(state): State<Arc<AppState>>, Query(query): Query<InstallQuery>) -> impl IntoResponse {
    if !deps_enabled() {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "dependency install is disabled in this environment" })),
        )
            .into_response();
    }

    let root = state.deps_state.root.clone();
    let installing = state.deps_state.installing.clone();
    let force = query.force;

    if lock_path(&root).exists() && !force {
        return Json(json!({ "status": read_status(&root) })).into_response();
    }

    tokio::spawn(async move {
        let _guard = installing.lock().await;
        run_install(&root, force).await;
    });

    Json(json!({ "status": "installing" })).into_response()
}

async fn run_install(root: &Path, force: bool) {
    let _ = std::fs::write(lock_path(root), std::process::id().to_string());
    let mut status = DepsStatus {
        state: "installing".to_string(),
        progress: 5,
        message: "starting dependency installation".to_string(),
        started_at: Some(now_unix_secs()),
        ..DepsStatus::default()
    };
    write_status(root, &status);
    append_log(root, "info: install started");

    let checks = check_dependencies(root);
    if checks.ready && !force {
        status.state = "completed".to_string();
        status.progress = 100;
        status.message = "dependencies already installed".to_string();
        status.finished_at = Some(now_unix_secs());
        write_status(root, &status);
        append_log(root, "info: dependencies already installed; skipping");
        let _ = std::fs::remove_file(lock_path(root));
        return;
    }

    status.progress = 40;
    status.message = "installing playwright browsers".to_string();
    write_status(root, &status);

    let outcome = if which::which("npx").is_ok() {
        tokio::process::Command::new("npx").args(["playwright", "install"]).output().await
    } else {
        append_log(root, "error: npx not available; cannot install playwright browsers");
        status.state = "error".to_string();
        status.progress = 100;
        status.message = "npx not available".to_string();
        status.error = Some("npx not available".to_string());
        status.finished_at = Some(now_unix_secs());
        write_status(root, &status);
        let _ = std::fs::remove_file(lock_path(root));
        return;
    };

    match outcome {
        Ok(output) if output.status.success() => {
            append_log(root, "info: playwright install completed");
            let _ = std::fs::write(root.join(".playwright_installed"), now_unix_secs().to_string());
            status.state = "completed".to_string();
            status.progress = 100;
            status.message = "dependencies installed".to_string();
        }
        Ok(output) => {
            let message = String::from_utf8_lossy(&output.stderr).to_string();
            append_log(root, &format!("error: playwright install failed: {message}"));
            status.state = "error".to_string();
            status.progress = 100;
            status.message = "playwright install failed".to_string();
            status.error = Some(message);
        }
        Err(e) => {
            append_log(root, &format!("error: playwright install failed to start: {e}"));
            status.state = "error".to_string();
            status.progress = 100;
            status.message = "playwright install failed to start".to_string();
            status.error = Some(e.to_string());
        }
    }
    status.finished_at = Some(now_unix_secs());
    write_status(root, &status);
    let _ = std::fs::remove_file(lock_path(root));
}

#[derive(Debug, Deserialize, Default)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

/// `GET /ops/deps/logs?limit=` — tails the install log.
pub async fn logs(State(state): State<Arc<AppState>>, Query(query): Query<LogsQuery>) -> impl IntoResponse {
    let root = state.deps_state.root.clone();
    let limit = query.limit.unwrap_or(200);
    let lines = std::fs::read_to_string(log_path(&root))
        .map(|content| {
            let all: Vec<String> = content.lines().map(str::to_string).collect();
            let start = all.len().saturating_sub(limit);
            all[start..].to_vec()
        })
        .unwrap_or_default();
    Json(json!({ "lines": lines }))
}

/// `GET /ops/deps/stream` — SSE tail of the install log, polling every 500ms for new lines.
pub async fn stream(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let root = state.deps_state.root.clone();
    let path = log_path(&root);

    let stream = async_stream::stream! {
        let mut offset: u64 = 0;
        loop {
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.len() > offset => {
                    if let Ok(content) = tokio::fs::read_to_string(&path).await {
                        let bytes = content.as_bytes();
                        if (offset as usize) <= bytes.len() {
                            let fresh = String::from_utf8_lossy(&bytes[offset as usize..]).to_string();
                            for line in fresh.lines() {
                                yield Ok::<_, std::convert::Infallible>(
                                    Event::default().data(json!({ "line": line }).to_string()),
                                );
                            }
                        }
                        offset = meta.len();
                    }
                }
                _ => {
                    yield Ok::<_, std::convert::Infallible>(Event::default().comment(""));
                }
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_idle() {
        let status = DepsStatus::default();
        assert_eq!(status.state, "idle");
        assert_eq!(status.progress, 0);
    }

    #[test]
    fn deps_enabled_defaults_true_outside_production() {
        std::env::remove_var("COWORK_DEPS_API_ENABLED");
        std::env::remove_var("APP_ENV");
        assert!(deps_enabled());
        std::env::set_var("APP_ENV", "production");
        assert!(!deps_enabled());
        std::env::remove_var("APP_ENV");
    }
}
