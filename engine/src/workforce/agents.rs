//! Built-in agent roster (§4.4 Phase B). Each built-in carries a full default system prompt;
//! user-supplied custom specs merge in by case-insensitive name, replacing a built-in of the
//! same name or appending a new one.

use crate::action::AgentSpec;

const DEVELOPER_PROMPT: &str = "\
You are the developer agent. You write, read, and execute code to accomplish the assigned \
sub-task. Prefer small, verifiable steps; report file paths you create or modify.";

const SEARCH_PROMPT: &str = "\
You are the search agent. You find and synthesize information from the web and from any \
configured browser tool. Always cite sources by URL or title.";

const DOCUMENT_PROMPT: &str = "\
You are the document agent. You produce written artifacts (reports, summaries, structured \
documents) from the material gathered so far. Write complete, human-readable prose.";

const MULTI_MODAL_PROMPT: &str = "\
You are the multi-modal agent. You work with images, audio, and other non-text attachments, \
describing, transforming, or extracting information from them as the sub-task requires.";

/// Search-family tool names stripped when search is disabled or replaced by native search.
pub const SEARCH_TOOL_NAMES: &[&str] = &["web_search", "exa_search"];
pub const BROWSER_TOOL_NAMES: &[&str] = &["browser"];
pub const MEMORY_SEARCH_TOOL: &str = "memory_search";

pub fn built_in_agents() -> Vec<AgentSpec> {
    vec![
        AgentSpec {
            name: "developer_agent".into(),
            description: "Writes and runs code to complete development sub-tasks.".into(),
            system_prompt: DEVELOPER_PROMPT.into(),
            tools: vec!["bash".into(), "file_write".into(), "file_read".into()],
        },
        AgentSpec {
            name: "search_agent".into(),
            description: "Finds and synthesizes information from the web.".into(),
            system_prompt: SEARCH_PROMPT.into(),
            tools: vec!["web_search".into(), "browser".into()],
        },
        AgentSpec {
            name: "document_agent".into(),
            description: "Produces written artifacts from gathered material.".into(),
            system_prompt: DOCUMENT_PROMPT.into(),
            tools: vec!["file_write".into()],
        },
        AgentSpec {
            name: "multi_modal_agent".into(),
            description: "Works with images, audio, and other attachments.".into(),
            system_prompt: MULTI_MODAL_PROMPT.into(),
            tools: vec!["file_read".into()],
        },
    ]
}

/// Merges `custom` into `built_in_agents()` by case-insensitive name: a custom spec replaces a
/// built-in of the same name, otherwise it is appended (§4.4 Phase B.1).
pub fn merge_roster(custom: &[AgentSpec]) -> Vec<AgentSpec> {
    let mut roster = built_in_agents();
    for spec in custom {
        let lower = spec.name.to_lowercase();
        if let Some(existing) = roster.iter_mut().find(|a| a.name.to_lowercase() == lower) {
            *existing = spec.clone();
        } else {
            roster.push(spec.clone());
        }
    }
    roster
}

/// Computes the effective tool list for an agent given the turn's search configuration
/// (§4.4 Phase B.2). `native_search` means the provider performs search itself (OpenAI
/// Responses web_search): browser tools stay but the explicit search tool is stripped, same as
/// when search is fully disabled — the difference is only in which upstream dialect is chosen.
pub fn effective_tools(spec: &AgentSpec, search_enabled: bool, native_search: bool, memory_search: bool) -> Vec<String> {
    let mut tools = spec.tools.clone();
    if !search_enabled || native_search {
        tools.retain(|t| !SEARCH_TOOL_NAMES.contains(&t.as_str()));
    }
    if !search_enabled {
        tools.retain(|t| !BROWSER_TOOL_NAMES.contains(&t.as_str()));
    }
    if memory_search && !tools.iter().any(|t| t == MEMORY_SEARCH_TOOL) {
        tools.push(MEMORY_SEARCH_TOOL.to_string());
    }
    tools
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_roster_replaces_by_case_insensitive_name() {
        let custom = vec![AgentSpec {
            name: "Developer_Agent".into(),
            description: "custom".into(),
            system_prompt: "custom prompt".into(),
            tools: vec!["custom_tool".into()],
        }];
        let roster = merge_roster(&custom);
        assert_eq!(roster.len(), 4);
        let dev = roster.iter().find(|a| a.name == "Developer_Agent").unwrap();
        assert_eq!(dev.tools, vec!["custom_tool".to_string()]);
    }

    #[test]
    fn merge_roster_appends_unknown_names() {
        let custom = vec![AgentSpec {
            name: "translator_agent".into(),
            description: "d".into(),
            system_prompt: "p".into(),
            tools: vec![],
        }];
        let roster = merge_roster(&custom);
        assert_eq!(roster.len(), 5);
    }

    #[test]
    fn effective_tools_strips_search_when_disabled() {
        let spec = built_in_agents().into_iter().find(|a| a.name == "search_agent").unwrap();
        let tools = effective_tools(&spec, false, false, false);
        assert!(tools.is_empty());
    }

    #[test]
    fn effective_tools_keeps_browser_for_native_search() {
        let spec = built_in_agents().into_iter().find(|a| a.name == "search_agent").unwrap();
        let tools = effective_tools(&spec, true, true, false);
        assert_eq!(tools, vec!["browser".to_string()]);
    }

    #[test]
    fn effective_tools_adds_memory_search_once() {
        let spec = built_in_agents().into_iter().find(|a| a.name == "document_agent").unwrap();
        let tools = effective_tools(&spec, true, false, true);
        assert_eq!(tools, vec!["file_write".to_string(), MEMORY_SEARCH_TOOL.to_string()]);
    }
}
