//! Hydrates per-turn context from the Core service and extracts new notes in the background
//! (§4.10). Hydration is synchronous and fail-soft: a Core outage degrades to an empty context
//! rather than failing the turn. Note extraction never blocks the turn — it is spawned and
//! retried with a bounded backoff by [`crate::background`].

use serde_json::Value;

use crate::core_client::CoreClient;

/// Context hydrated for one turn: prior thread/task summaries plus standing notes.
#[derive(Clone, Debug, Default)]
pub struct TurnContext {
    pub thread_summary: Option<String>,
    pub last_task_summary: Option<String>,
    pub memory_notes: Vec<String>,
    pub global_memory_notes: Vec<String>,
}

impl TurnContext {
    /// Renders the hydrated context as a single prompt-ready block, skipping empty sections.
    pub fn as_prompt_block(&self) -> String {
        let mut sections = Vec::new();
        if let Some(s) = &self.thread_summary {
            sections.push(format!("Thread summary:\n{s}"));
        }
        if let Some(s) = &self.last_task_summary {
            sections.push(format!("Previous task summary:\n{s}"));
        }
        if !self.memory_notes.is_empty() {
            sections.push(format!("Project notes:\n- {}", self.memory_notes.join("\n- ")));
        }
        if !self.global_memory_notes.is_empty() {
            sections.push(format!(
                "Standing notes:\n- {}",
                self.global_memory_notes.join("\n- ")
            ));
        }
        sections.join("\n\n")
    }
}

/// Hydrates a [`TurnContext`] for `project_id`/`task_id` via Core GETs. Any single endpoint
/// failing leaves that field at its default rather than failing the whole hydration.
pub async fn hydrate(
    core: &CoreClient,
    auth_token: &str,
    project_id: &str,
    task_id: Option<&str>,
) -> TurnContext {
    let thread_summary = core
        .thread_summary(auth_token, project_id)
        .await
        .ok()
        .flatten();
    let last_task_summary = match task_id {
        Some(task_id) => core.task_summary(auth_token, task_id).await.ok().flatten(),
        None => None,
    };
    let memory_notes = core.memory_notes(auth_token, project_id).await.unwrap_or_default();
    let global_memory_notes = core
        .memory_notes(auth_token, "__global__")
        .await
        .unwrap_or_default();

    TurnContext {
        thread_summary,
        last_task_summary,
        memory_notes,
        global_memory_notes,
    }
}

/// Builds the note payload POSTed to `/memory/notes` once extraction finishes.
pub fn note_payload(project_id: &str, task_id: &str, note: &str) -> Value {
    serde_json::json!({
        "project_id": project_id,
        "task_id": task_id,
        "note": note,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_block_skips_empty_sections() {
        let ctx = TurnContext {
            thread_summary: Some("did X".into()),
            ..Default::default()
        };
        let rendered = ctx.as_prompt_block();
        assert!(rendered.contains("Thread summary"));
        assert!(!rendered.contains("Project notes"));
    }

    #[test]
    fn prompt_block_empty_when_nothing_hydrated() {
        let ctx = TurnContext::default();
        assert_eq!(ctx.as_prompt_block(), "");
    }
}
