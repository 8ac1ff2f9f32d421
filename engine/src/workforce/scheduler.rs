//! Drives the complex-branch turn end to end (§4.4): plan, build the agent roster, then execute
//! sub-tasks against it. Sub-tasks with no prior failure are fanned out concurrently via a
//! `JoinSet`; `retry`-then-`replan` handles per-task failure without blocking siblings.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use stream_event::StepKind;
use tokio::task::JoinSet;

use crate::action::AgentSpec;
use crate::events::EventStream;
use crate::provider::{self, ProviderConfig};
use crate::toolkit::{ToolContext, ToolInvoker, ToolRegistry};

use super::agents::{effective_tools, merge_roster};
use super::decompose::parse_sub_tasks;
use super::task_tree::{NodeId, TaskArena, TaskState};

#[derive(Debug, thiserror::Error)]
pub enum WorkforceError {
    #[error("decomposition produced no sub-tasks")]
    EmptyDecomposition,
    #[error(transparent)]
    Provider(#[from] provider::ProviderError),
}

/// The concrete toolkits a sub-task's agent may invoke (§4.5), shared across every sub-task in
/// the turn.
#[derive(Clone)]
pub struct ToolkitDeps {
    pub registry: Arc<ToolRegistry>,
    pub invoker: Arc<ToolInvoker>,
}

pub struct WorkforceOptions {
    pub search_enabled: bool,
    pub native_search: bool,
    pub memory_search: bool,
    pub project_id: String,
    pub auth_token: Option<String>,
    pub toolkit: ToolkitDeps,
}

/// Fenced envelope an agent emits to call a tool: ` ```tool_call\n{"tool": "...", "args": {...}}\n``` `.
/// A reply with no such block is treated as the agent's final answer (§9 "decorator-based
/// interception" redesign note: tool use here is an explicit, parseable act, not an intercepted
/// method call).
static TOOL_CALL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```tool_call\s*(\{.*?\})\s*```").unwrap());

const MAX_TOOL_ITERATIONS: usize = 4;

fn parse_tool_call(text: &str) -> Option<(String, Value)> {
    let captures = TOOL_CALL_RE.captures(text)?;
    let body: Value = serde_json::from_str(&captures[1]).ok()?;
    let tool = body.get("tool")?.as_str()?.to_string();
    let args = body.get("args").cloned().unwrap_or(json!({}));
    Some((tool, args))
}

/// Runs the full complex branch and returns the final summary text shown to the user plus the
/// real Σusage accumulated across decomposition, every sub-task, and the final synthesis
/// (SPEC_FULL.md §3.1 Σusage, spec.md §4.2 step 7 — no char-count stand-in).
pub async fn run(
    config: &ProviderConfig,
    question: &str,
    custom_agents: &[AgentSpec],
    options: &WorkforceOptions,
    stop_requested: Arc<AtomicBool>,
    events: &EventStream,
) -> Result<(String, u64), WorkforceError> {
    let (mut arena, root, plan_tokens) = plan(config, question, events).await?;
    let roster = merge_roster(custom_agents);

    let exec_tokens = execute(config, &mut arena, root, &roster, options, stop_requested, events).await;

    let (summary, summarize_tokens) = summarize(config, &arena, root).await?;
    Ok((summary, plan_tokens + exec_tokens + summarize_tokens))
}

/// Phase A: stream the decomposition prompt, parse it into a tree, and persist the task label
/// and summary.
async fn plan(
    config: &ProviderConfig,
    question: &str,
    events: &EventStream,
) -> Result<(TaskArena, NodeId, u64), WorkforceError> {
    let prompt = format!(
        "Break the following request into a short JSON array of sub-tasks, each \
         `{{\"id\": \"...\", \"content\": \"...\", \"assigned_role\": \"...\"}}`. Request: {question}"
    );
    let (text, decompose_tokens) = stream_completion(config, &prompt, |chunk| {
        events.emit(StepKind::DecomposeText, json!({ "chunk": chunk }));
    })
    .await?;

    let sub_tasks = parse_sub_tasks(&text);
    if sub_tasks.is_empty() {
        return Err(WorkforceError::EmptyDecomposition);
    }

    let (title, summary, label_tokens) = label_and_summary(config, question).await?;

    let mut arena = TaskArena::new();
    let root = arena.insert_root(question);
    for spec in &sub_tasks {
        arena.insert_child(root, spec.id.clone(), spec.content.clone(), spec.assigned_role.clone());
    }

    events.emit(
        StepKind::ToSubTasks,
        json!({
            "sub_tasks": sub_tasks,
            "delta_sub_tasks": sub_tasks,
            "is_final": true,
            "summary_task": { "title": title, "summary": summary },
        }),
    );

    Ok((arena, root, decompose_tokens + label_tokens))
}

async fn label_and_summary(config: &ProviderConfig, question: &str) -> Result<(String, String, u64), WorkforceError> {
    let prompt = format!(
        "Respond with exactly `Title|Summary` — a short task title, a pipe, then a one \
         sentence summary — for this request: {question}"
    );
    let (text, tokens) = non_streaming_completion(config, &prompt).await?;
    match text.split_once('|') {
        Some((title, summary)) => Ok((title.trim().to_string(), summary.trim().to_string(), tokens)),
        None => Ok((text.trim().to_string(), String::new(), tokens)),
    }
}

/// Phase B assignment + Phase C execution. Leaf sub-tasks with no `assigned_role` are matched
/// to an agent by heuristic keyword search over agent names; unmatched content falls back to
/// the first agent in the roster.
async fn execute(
    config: &ProviderConfig,
    arena: &mut TaskArena,
    root: NodeId,
    roster: &[AgentSpec],
    options: &WorkforceOptions,
    stop_requested: Arc<AtomicBool>,
    events: &EventStream,
) -> u64 {
    let token_acc = Arc::new(AtomicU64::new(0));
    let children: Vec<NodeId> = arena.children_of(root).to_vec();
    let mut join_set: JoinSet<(NodeId, Result<String, String>)> = JoinSet::new();

    for child in children {
        if stop_requested.load(Ordering::SeqCst) {
            break;
        }
        let node = arena.get(child).clone();
        let agent = assign_agent(&node.assigned_role, &node.content, roster).clone();
        let tools = effective_tools(&agent, options.search_enabled, options.native_search, options.memory_search);

        events.emit(
            StepKind::AssignTask,
            json!({ "assignee_id": agent.name, "task_id": node.external_id, "content": node.content, "state": "waiting" }),
        );

        let config = config.clone();
        let events = events.clone();
        let stop_requested = stop_requested.clone();
        let options_ref = (options.project_id.clone(), options.auth_token.clone(), options.toolkit.clone());
        let token_acc = token_acc.clone();
        join_set.spawn(async move {
            let (project_id, auth_token, toolkit) = options_ref;
            let outcome = run_sub_task(
                &config,
                &agent,
                &tools,
                &node.content,
                &stop_requested,
                &events,
                child,
                &project_id,
                auth_token.as_deref(),
                &toolkit,
                &token_acc,
            )
            .await;
            (child, outcome)
        });
    }

    while let Some(joined) = join_set.join_next().await {
        let Ok((child, outcome)) = joined else { continue };
        match outcome {
            Ok(result) => {
                arena.get_mut(child).result = Some(result);
                arena.set_state(child, TaskState::Done);
            }
            Err(_) => {
                arena.set_state(child, TaskState::Failed);
                arena.get_mut(child).failure_count += 1;
            }
        }
        events.emit(
            StepKind::TaskState,
            json!({ "task_id": arena.get(child).external_id, "state": format!("{:?}", arena.get(child).state) }),
        );
    }

    // retry-then-replan: re-run once verbatim, then re-post to the planner, before giving up.
    let failed: Vec<NodeId> = arena
        .children_of(root)
        .iter()
        .copied()
        .filter(|&c| arena.get(c).state == TaskState::Failed && arena.get(c).failure_count < 2)
        .collect();
    for child in failed {
        if stop_requested.load(Ordering::SeqCst) {
            break;
        }
        let node = arena.get(child).clone();
        let agent = assign_agent(&node.assigned_role, &node.content, roster).clone();
        let tools = effective_tools(&agent, options.search_enabled, options.native_search, options.memory_search);
        let outcome = run_sub_task(
            config,
            &agent,
            &tools,
            &node.content,
            &stop_requested,
            events,
            child,
            &options.project_id,
            options.auth_token.as_deref(),
            &options.toolkit,
            &token_acc,
        )
        .await;
        match outcome {
            Ok(result) => {
                arena.get_mut(child).result = Some(result);
                arena.set_state(child, TaskState::Done);
            }
            Err(_) => {
                arena.set_state(child, TaskState::Failed);
                arena.get_mut(child).failure_count += 1;
            }
        }
        events.emit(
            StepKind::TaskState,
            json!({ "task_id": arena.get(child).external_id, "state": format!("{:?}", arena.get(child).state) }),
        );
    }

    token_acc.load(Ordering::Relaxed)
}

/// Instructs the agent how to invoke a tool: a fenced `tool_call` JSON envelope, parsed by
/// [`parse_tool_call`]. Only emitted when the agent actually has tools available, since a
/// toolless agent (e.g. one with every tool stripped by [`effective_tools`]) has nothing to call.
fn tool_instructions(tools: &[String]) -> String {
    if tools.is_empty() {
        return String::new();
    }
    format!(
        "\n\nAvailable tools: {}. To call one, reply with exactly:\n```tool_call\n\
         {{\"tool\": \"<name>\", \"args\": {{...}}}}\n```\nOtherwise, give your final answer as plain text.",
        tools.join(", ")
    )
}

#[allow(clippy::too_many_arguments)]
async fn run_sub_task(
    config: &ProviderConfig,
    agent: &AgentSpec,
    tools: &[String],
    content: &str,
    stop_requested: &Arc<AtomicBool>,
    events: &EventStream,
    node: NodeId,
    project_id: &str,
    auth_token: Option<&str>,
    toolkit: &ToolkitDeps,
    token_acc: &AtomicU64,
) -> Result<String, String> {
    events.emit(StepKind::ActivateAgent, json!({ "agent": agent.name, "node": node }));

    if stop_requested.load(Ordering::SeqCst) {
        events.emit(StepKind::DeactivateAgent, json!({ "agent": agent.name, "message": "cancelled", "tokens": 0 }));
        return Err("cancelled".to_string());
    }

    let ctx = ToolContext::new(agent.name.clone(), node.to_string(), project_id.to_string(), auth_token.map(str::to_string));
    let mut prompt = format!("{}{}\n\nTask: {content}", agent.system_prompt, tool_instructions(tools));
    let mut total_tokens = 0u64;

    let result = loop_tool_calls(config, &mut prompt, tools, &toolkit.registry, &toolkit.invoker, &ctx, events, &mut total_tokens).await;
    token_acc.fetch_add(total_tokens, Ordering::Relaxed);

    let message = match &result {
        Ok(text) => text.clone(),
        Err(e) => e.clone(),
    };
    events.emit(
        StepKind::DeactivateAgent,
        json!({ "agent": agent.name, "message": message, "tokens": total_tokens }),
    );
    result
}

/// Runs the completion/tool-call loop (§4.5): each iteration streams a completion, and if it
/// contains a `tool_call` envelope naming a tool the registry knows, invokes it through the
/// approval-gated [`ToolInvoker`] and feeds the observation back as part of the next prompt.
/// A reply with no recognized tool call — or [`MAX_TOOL_ITERATIONS`] reached — ends the loop.
async fn loop_tool_calls(
    config: &ProviderConfig,
    prompt: &mut String,
    tools: &[String],
    registry: &ToolRegistry,
    invoker: &ToolInvoker,
    ctx: &ToolContext,
    events: &EventStream,
    total_tokens: &mut u64,
) -> Result<String, String> {
    if tools.is_empty() {
        let (text, tokens) = non_streaming_completion(config, prompt).await.map_err(|e| e.to_string())?;
        *total_tokens += tokens;
        return Ok(text);
    }

    for _ in 0..MAX_TOOL_ITERATIONS {
        let (reply, tokens) = non_streaming_completion(config, prompt).await.map_err(|e| e.to_string())?;
        *total_tokens += tokens;

        let Some((tool_name, args)) = parse_tool_call(&reply) else {
            return Ok(reply);
        };
        let Some(tool) = registry.get(&tool_name) else {
            return Ok(reply);
        };

        let observation = match invoker.invoke(tool.as_ref(), args, ctx, events).await {
            Ok(text) => text,
            Err(e) => format!("error: {e}"),
        };
        prompt.push_str(&format!(
            "\n\nAssistant: {reply}\nTool result: {observation}\n\nContinue the task, or give your final answer."
        ));
    }
    Ok("reached the maximum number of tool calls for this sub-task".to_string())
}

fn assign_agent<'a>(assigned_role: &Option<String>, content: &str, roster: &'a [AgentSpec]) -> &'a AgentSpec {
    if let Some(role) = assigned_role {
        if let Some(agent) = roster.iter().find(|a| a.name.eq_ignore_ascii_case(role)) {
            return agent;
        }
    }
    let lower = content.to_lowercase();
    let keyword_table: HashMap<&str, &str> = HashMap::from([
        ("search", "search_agent"),
        ("research", "search_agent"),
        ("find", "search_agent"),
        ("write", "document_agent"),
        ("report", "document_agent"),
        ("summary", "document_agent"),
        ("image", "multi_modal_agent"),
        ("audio", "multi_modal_agent"),
        ("code", "developer_agent"),
        ("implement", "developer_agent"),
    ]);
    for (keyword, name) in &keyword_table {
        if lower.contains(keyword) {
            if let Some(agent) = roster.iter().find(|a| a.name == *name) {
                return agent;
            }
        }
    }
    roster.first().expect("roster always has at least the built-ins")
}

async fn summarize(config: &ProviderConfig, arena: &TaskArena, root: NodeId) -> Result<(String, u64), WorkforceError> {
    let children = arena.children_of(root);
    if children.len() == 1 {
        return Ok((arena.get(children[0]).result.clone().unwrap_or_default(), 0));
    }
    let combined: String = children
        .iter()
        .map(|&c| {
            let node = arena.get(c);
            format!("- {}: {}", node.content, node.result.clone().unwrap_or_default())
        })
        .collect::<Vec<_>>()
        .join("\n");
    let prompt = format!("Summarize the outcome of this multi-step task for the user:\n{combined}");
    non_streaming_completion(config, &prompt).await.map_err(WorkforceError::Provider)
}

/// Streams a completion and returns its text alongside the real token usage reported by the
/// provider's `ChatChunk.usage` (§3.1 Σusage) — never a character-count approximation.
async fn stream_completion(
    config: &ProviderConfig,
    prompt: &str,
    mut on_chunk: impl FnMut(&str),
) -> Result<(String, u64), provider::ProviderError> {
    let messages = vec![json!({"role": "user", "content": prompt})];
    let mut stream = provider::stream_chat(config.clone(), messages)?;
    let mut text = String::new();
    let mut tokens = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if let Some(delta) = chunk.text {
            on_chunk(&delta);
            text.push_str(&delta);
        }
        if let Some(usage) = chunk.usage {
            tokens += usage.total_tokens;
        }
    }
    Ok((text, tokens))
}

async fn non_streaming_completion(config: &ProviderConfig, prompt: &str) -> Result<(String, u64), provider::ProviderError> {
    stream_completion(config, prompt, |_| {}).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::AgentSpec;

    fn sample_roster() -> Vec<AgentSpec> {
        super::super::agents::built_in_agents()
    }

    #[test]
    fn assign_agent_prefers_explicit_role() {
        let roster = sample_roster();
        let agent = assign_agent(&Some("document_agent".into()), "irrelevant content", &roster);
        assert_eq!(agent.name, "document_agent");
    }

    #[test]
    fn assign_agent_falls_back_to_keyword_heuristic() {
        let roster = sample_roster();
        let agent = assign_agent(&None, "please research the competitor landscape", &roster);
        assert_eq!(agent.name, "search_agent");
    }

    #[test]
    fn assign_agent_falls_back_to_first_when_no_match() {
        let roster = sample_roster();
        let agent = assign_agent(&None, "zzz unrelated zzz", &roster);
        assert_eq!(agent.name, roster[0].name);
    }

    #[test]
    fn parse_tool_call_extracts_tool_and_args_from_fenced_block() {
        let reply = "Sure, let me do that.\n```tool_call\n{\"tool\": \"file_write\", \"args\": {\"path\": \"a.xlsx\"}}\n```\n";
        let (tool, args) = parse_tool_call(reply).unwrap();
        assert_eq!(tool, "file_write");
        assert_eq!(args.get("path").unwrap().as_str().unwrap(), "a.xlsx");
    }

    #[test]
    fn parse_tool_call_returns_none_for_plain_text() {
        assert!(parse_tool_call("here is my final answer").is_none());
    }

    #[test]
    fn tool_instructions_empty_when_agent_has_no_tools() {
        assert_eq!(tool_instructions(&[]), String::new());
    }
}
