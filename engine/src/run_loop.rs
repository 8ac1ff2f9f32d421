//! Per-project turn state machine (§4.2):
//!
//! ```text
//! idle ─(Improve)→ confirming ─(emit confirmed)→ classifying
//! classifying ─(simple)→ single-shot-stream ─(end)→ idle
//! classifying ─(complex)→ decomposing ─(emit decompose_text*, to_sub_tasks)→ scheduling
//! scheduling ─(workforce start)→ running ─(final summary)→ idle
//! any ─(Stop)→ cancelling ─(emit turn_cancelled, end)→ idle
//! ```
//!
//! The loop never exits while its [`ProjectLock`] is alive: every turn, however it ends, returns
//! control to `lock.get()` and awaits the next Action (§4.2 "crucial invariant").

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::{json, Value};
use stream_event::StepKind;

use env_config::Settings;

use crate::action::{Action, AgentSpec, AttachmentPayload, ProviderOverride, TokenTracker};
use crate::background::spawn_bounded_retry;
use crate::core_client::CoreClient;
use crate::error::EngineError;
use crate::events::EventStream;
use crate::memory_builder::{self, TurnContext};
use crate::provider::{self, ProviderConfig};
use crate::skills::{self, RuntimeSkill, SkillObserver, SkillsMode};
use crate::task_lock::ProjectLock;
use crate::toolkit::{ToolInvoker, ToolRegistry};
use crate::workforce::{self, ToolkitDeps, WorkforceOptions};

/// Shared, process-lifetime dependencies every project's run loop needs. Cheap to clone: the
/// heavy parts are behind `Arc` (skills) or are themselves cheaply-cloneable (`CoreClient`
/// wraps a pooled `reqwest::Client`).
#[derive(Clone)]
pub struct RunLoopDeps {
    pub settings: Arc<Settings>,
    pub core: Option<CoreClient>,
    pub skills: Arc<Vec<RuntimeSkill>>,
}

impl RunLoopDeps {
    pub fn new(settings: Settings, core: Option<CoreClient>, skills: Vec<RuntimeSkill>) -> Self {
        Self {
            settings: Arc::new(settings),
            core,
            skills: Arc::new(skills),
        }
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self::new(Settings::from_env(), None, Vec::new())
    }
}

/// Drives `lock`'s queue for the lifetime of the project. Returns only when the queue's sender
/// side is dropped (the manager has removed this project), never on `Stop` alone.
pub async fn drive(lock: Arc<ProjectLock>, deps: RunLoopDeps) {
    while let Some(action) = lock.get().await {
        match action {
            Action::Improve {
                project_id,
                task_id,
                question,
                search_enabled,
                attachments,
                auth_token,
                provider_override,
                custom_agents,
            } => {
                lock.stop_requested.store(false, Ordering::SeqCst);
                run_turn(
                    &lock,
                    &deps,
                    Turn {
                        project_id,
                        task_id,
                        question,
                        search_enabled,
                        attachments,
                        auth_token,
                        provider_override,
                        custom_agents,
                    },
                )
                .await;
            }
            Action::Stop { project_id, reason } => {
                tracing::debug!(project_id, ?reason, "stop received with no turn in flight");
            }
        }
    }
}

struct Turn {
    project_id: String,
    task_id: String,
    question: String,
    search_enabled: Option<bool>,
    attachments: Vec<AttachmentPayload>,
    auth_token: Option<String>,
    provider_override: Option<ProviderOverride>,
    custom_agents: Vec<AgentSpec>,
}

/// Runs one full turn and reports its outcome on `events`. Never propagates an error to the
/// caller — every failure path is converted into `error` + `end{result:"error"}` here, per
/// §7's propagation policy.
async fn run_turn(lock: &Arc<ProjectLock>, deps: &RunLoopDeps, turn: Turn) {
    let (events, mut receiver) = EventStream::new(turn.task_id.clone());
    let observer = Arc::new(SkillObserver::new());
    let events = events.with_listener(observer.clone());

    // Fan each event out to the project's live subscribers (the `/chat` SSE handler, if one is
    // attached) and persist it durably via the Core service. A turn started through the
    // enqueue-only `/improve` endpoint has no subscriber; `publish_event` is then a no-op.
    tokio::spawn({
        let lock = lock.clone();
        let core = deps.core.clone();
        let auth_token = turn.auth_token.clone();
        async move {
            while let Some(event) = receiver.recv().await {
                lock.publish_event(event.clone());
                if let (Some(core), Some(token)) = (core.clone(), auth_token.clone()) {
                    let Ok(payload) = serde_json::to_value(&event) else {
                        continue;
                    };
                    spawn_bounded_retry("chat-step-persist", move || {
                        let core = core.clone();
                        let token = token.clone();
                        let payload = payload.clone();
                        async move { core.post_chat_step(&token, &payload).await }
                    });
                }
            }
        }
    });

    events.emit(StepKind::Confirmed, json!({ "question": turn.question }));
    events.emit(StepKind::TaskState, json!({ "state": "processing" }));

    let mut history_id = None;
    if let (Some(core), Some(token)) = (&deps.core, &turn.auth_token) {
        history_id = core
            .post_chat_history(
                token,
                &json!({
                    "project_id": turn.project_id,
                    "task_id": turn.task_id,
                    "question": turn.question,
                    "status": "PROCESSING",
                }),
            )
            .await
            .ok()
            .flatten();
    }

    match run_turn_inner(lock, deps, &turn, &events, &observer).await {
        Ok((result, tokens)) => {
            events.emit(StepKind::End, json!({ "result": result, "usage": { "total_tokens": tokens } }));
            persist_terminal_status(deps, &turn, history_id.as_deref(), "DONE", tokens).await;
        }
        Err(EngineError::Cancelled) => {
            events.emit(StepKind::TurnCancelled, json!({ "reason": "user_stop" }));
            events.emit(StepKind::End, json!({ "result": "stopped", "reason": "user_stop" }));
            persist_terminal_status(deps, &turn, history_id.as_deref(), "CANCELLED", 0).await;
        }
        Err(e) => {
            events.emit(StepKind::Error, json!({ "error": e.to_string() }));
            events.emit(StepKind::End, json!({ "result": e.result_reason() }));
            persist_terminal_status(deps, &turn, history_id.as_deref(), "ERROR", 0).await;
        }
    }
}

/// Idempotently updates the history row created at the start of the turn (§8: re-issuing the
/// same terminal update yields the same Core state). A missing `history_id` means the initial
/// create failed; fail-soft means there's nothing to target, so this is a no-op.
async fn persist_terminal_status(deps: &RunLoopDeps, turn: &Turn, history_id: Option<&str>, status: &str, tokens: u64) {
    let (Some(core), Some(token), Some(id)) = (&deps.core, &turn.auth_token, history_id) else {
        return;
    };
    core.put_chat_history(
        token,
        id,
        &json!({
            "project_id": turn.project_id,
            "task_id": turn.task_id,
            "status": status,
            "tokens": tokens,
        }),
    )
    .await
    .ok();
}

async fn run_turn_inner(
    lock: &Arc<ProjectLock>,
    deps: &RunLoopDeps,
    turn: &Turn,
    events: &EventStream,
    observer: &Arc<SkillObserver>,
) -> Result<(String, u64), EngineError> {
    let config = resolve_provider_config(deps, turn).await?;

    let context = hydrate_context(deps, turn).await;

    let skills_mode = SkillsMode::from_env_value(&deps.settings.runtime_skills_v2);
    let attachment_names: Vec<String> = turn.attachments.iter().map(|a| a.filename.clone()).collect();
    let attachment_extensions = skills::attachment_extensions(&attachment_names);
    let explicit_filenames = skills::explicit_filenames(&turn.question);

    let triggered: Vec<&RuntimeSkill> = if skills_mode == SkillsMode::Off {
        Vec::new()
    } else {
        skills::detect_triggered(&deps.skills, &turn.question, &attachment_extensions)
    };

    if skills_mode == SkillsMode::Shadow {
        if !triggered.is_empty() {
            tracing::info!(
                skill_ids = ?triggered.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
                "skills shadow-mode detection"
            );
        }
    }

    let search_enabled = turn.search_enabled.unwrap_or(true);
    let force_complex = skills_mode == SkillsMode::On && triggered.iter().any(|s| s.force_complex);

    if lock.stop_requested.load(Ordering::SeqCst) {
        return Err(EngineError::Cancelled);
    }

    let is_complex = force_complex || classify_complex(&config, &turn.question, &context).await?;

    let (result, tokens) = if is_complex {
        run_complex_branch(lock, deps, turn, &config, events, skills_mode, &triggered, search_enabled).await?
    } else {
        run_simple_branch(lock, &config, &turn.question, &context, events).await?
    };

    if skills_mode == SkillsMode::On {
        if let Some(skill) = triggered.first() {
            validate_and_repair(deps, turn, skill, observer, &explicit_filenames, events).await?;
        }
    }

    if is_complex {
        spawn_note_extraction(deps, turn, &result);
    }

    Ok((result, tokens))
}

async fn resolve_provider_config(deps: &RunLoopDeps, turn: &Turn) -> Result<ProviderConfig, EngineError> {
    if let Some(over) = &turn.provider_override {
        if over.is_complete() {
            return Ok(ProviderConfig {
                id: "override".to_string(),
                provider_name: over.provider_name.clone().unwrap(),
                model_type: over.model_type.clone().unwrap(),
                api_key: over.api_key.clone().unwrap(),
                endpoint_url: over.endpoint_url.clone(),
                temperature: provider::default_temperature(),
                extra_params: Value::Null,
            });
        }
    }

    let (Some(core), Some(token)) = (&deps.core, &turn.auth_token) else {
        return Err(EngineError::ProviderUnavailable);
    };
    let providers = core.providers(token).await.map_err(EngineError::from)?;
    let first = providers.into_iter().next().ok_or(EngineError::ProviderUnavailable)?;
    serde_json::from_value(first).map_err(|_| EngineError::ProviderUnavailable)
}

async fn hydrate_context(deps: &RunLoopDeps, turn: &Turn) -> TurnContext {
    let (Some(core), Some(token)) = (&deps.core, &turn.auth_token) else {
        return TurnContext::default();
    };
    memory_builder::hydrate(core, token, &turn.project_id, Some(&turn.task_id)).await
}

async fn classify_complex(
    config: &ProviderConfig,
    question: &str,
    context: &TurnContext,
) -> Result<bool, EngineError> {
    let block = context.as_prompt_block();
    let prompt = format!(
        "{block}\n\nAnswer with a single leading word, \"yes\" or \"no\": does completing this \
         request require multiple sub-tasks delegated to different specialist agents (coding, \
         research, document writing, multi-modal work)? Request: {question}"
    );
    let classifier_config = ProviderConfig {
        temperature: 0.0,
        ..config.clone()
    };
    let answer = non_streaming_completion(&classifier_config, &prompt).await?;
    let trimmed = answer.trim().to_lowercase();
    if trimmed.starts_with("no") {
        Ok(false)
    } else {
        if !trimmed.starts_with("yes") {
            tracing::debug!(raw = %answer, "classifier response had no clear yes/no prefix, defaulting to complex");
        }
        Ok(true)
    }
}

async fn run_simple_branch(
    lock: &Arc<ProjectLock>,
    config: &ProviderConfig,
    question: &str,
    context: &TurnContext,
    events: &EventStream,
) -> Result<(String, u64), EngineError> {
    let block = context.as_prompt_block();
    let prompt = if block.is_empty() {
        question.to_string()
    } else {
        format!("{block}\n\n{question}")
    };
    let messages = vec![json!({"role": "user", "content": prompt})];
    let mut stream = provider::stream_chat(config.clone(), messages)?;

    let mut text = String::new();
    let mut tracker = TokenTracker::default();
    while let Some(chunk) = stream.next().await {
        if lock.stop_requested.load(Ordering::SeqCst) {
            return Err(EngineError::Cancelled);
        }
        let chunk = chunk?;
        if let Some(delta) = chunk.text {
            events.emit(StepKind::Streaming, json!({ "chunk": delta }));
            text.push_str(&delta);
        }
        if let Some(usage) = chunk.usage {
            tracker.add(usage.total_tokens);
        }
    }
    Ok((text, tracker.total_tokens))
}

async fn run_complex_branch(
    lock: &Arc<ProjectLock>,
    deps: &RunLoopDeps,
    turn: &Turn,
    config: &ProviderConfig,
    events: &EventStream,
    skills_mode: SkillsMode,
    triggered: &[&RuntimeSkill],
    search_enabled: bool,
) -> Result<(String, u64), EngineError> {
    let mut roster = workforce::agents::merge_roster(&turn.custom_agents);
    if skills_mode == SkillsMode::On {
        for skill in triggered {
            skills::inject_policy(&mut roster, skill);
        }
    }

    let resolver = cowork_workdir::WorkdirResolver::new(deps.settings.resolved_workdir());
    let project_dir = resolver.project_dir(&turn.project_id);
    let toolkit = ToolkitDeps {
        registry: Arc::new(ToolRegistry::built_in(resolver)),
        invoker: Arc::new(ToolInvoker::new(
            lock.clone(),
            deps.settings.default_tool_permission_allow(),
            project_dir,
        )),
    };

    let options = WorkforceOptions {
        search_enabled,
        native_search: false,
        memory_search: deps.settings.memory_search_past_chats,
        project_id: turn.project_id.clone(),
        auth_token: turn.auth_token.clone(),
        toolkit,
    };

    let (summary, tokens) = workforce::run(
        config,
        &turn.question,
        &roster,
        &options,
        lock.stop_requested.clone(),
        events,
    )
    .await?;

    if lock.stop_requested.load(Ordering::SeqCst) {
        return Err(EngineError::Cancelled);
    }

    Ok((summary, tokens))
}

async fn validate_and_repair(
    deps: &RunLoopDeps,
    turn: &Turn,
    skill: &RuntimeSkill,
    observer: &Arc<SkillObserver>,
    explicit_filenames: &std::collections::HashSet<String>,
    events: &EventStream,
) -> Result<(), EngineError> {
    let transcript = observer.snapshot_transcript();
    let mut artifacts = observer.snapshot_artifacts();

    let mut outcome = skills::validate_skill_contract(skill, &artifacts, &transcript, explicit_filenames);
    if outcome.success {
        return Ok(());
    }

    if skill.retry_policy.max_attempts == 0 {
        return Err(EngineError::SkillContractFailed("Skill output contract validation failed".to_string()));
    }

    let workdir = project_workdir(&deps.settings, &turn.project_id);
    if let Err(e) = std::fs::create_dir_all(&workdir) {
        tracing::warn!(error = %e, project_id = %turn.project_id, "failed to create project workdir for skill repair");
    }
    let needs_markdown = skill
        .output_contract
        .allowed_extensions
        .iter()
        .any(|ext| ext.eq_ignore_ascii_case(".md"));
    let repaired = skills::repair(
        skill,
        &workdir,
        &turn.question,
        &transcript,
        &artifacts,
        explicit_filenames,
        needs_markdown && outcome.matched_artifacts.is_empty(),
    );

    for artifact in &repaired {
        let payload = skills::repair::artifact_event_payload(artifact);
        events.emit(StepKind::Artifact, payload.clone());
        artifacts.push(payload.clone());
        if matches!(artifact.action, skills::RepairAction::Created) {
            if let (Some(core), Some(token)) = (&deps.core, &turn.auth_token) {
                core.post_chat_artifact(token, &payload).await.ok();
            }
        }
    }

    outcome = skills::validate_skill_contract(skill, &artifacts, &transcript, explicit_filenames);
    if outcome.success {
        Ok(())
    } else {
        Err(EngineError::SkillContractFailed("Skill output contract validation failed".to_string()))
    }
}

fn spawn_note_extraction(deps: &RunLoopDeps, turn: &Turn, transcript: &str) {
    let (Some(core), Some(token)) = (deps.core.clone(), turn.auth_token.clone()) else {
        return;
    };
    let project_id = turn.project_id.clone();
    let task_id = turn.task_id.clone();
    let note = summarize_for_note(transcript);
    spawn_bounded_retry("memory-note-extraction", move || {
        let core = core.clone();
        let token = token.clone();
        let payload = memory_builder::note_payload(&project_id, &task_id, &note);
        async move { core.post_memory_note(&token, &payload).await }
    });
}

fn summarize_for_note(transcript: &str) -> String {
    const MAX: usize = 500;
    if transcript.chars().count() <= MAX {
        transcript.to_string()
    } else {
        transcript.chars().take(MAX).collect::<String>() + "…"
    }
}

fn project_workdir(settings: &Settings, project_id: &str) -> PathBuf {
    cowork_workdir::WorkdirResolver::new(settings.resolved_workdir()).project_dir(project_id)
}

async fn non_streaming_completion(config: &ProviderConfig, prompt: &str) -> Result<String, provider::ProviderError> {
    let messages = vec![json!({"role": "user", "content": prompt})];
    let mut stream = provider::stream_chat(config.clone(), messages)?;
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if let Some(delta) = chunk.text {
            text.push_str(&delta);
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_workdir_sanitizes_path_separators() {
        let settings = Settings::from_env();
        let path = project_workdir(&settings, "../etc/passwd");
        assert!(!path.to_string_lossy().contains(".."));
        assert!(path.starts_with(settings.resolved_workdir()));
    }

    #[test]
    fn summarize_for_note_truncates_long_transcripts() {
        let long = "a".repeat(1000);
        let note = summarize_for_note(&long);
        assert!(note.chars().count() <= 501);
    }
}
