//! Trigger detection, policy injection, and step-event observation for loaded skills (§4.6).

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use serde_json::Value;
use stream_event::{StepEvent, StepKind};

use crate::action::AgentSpec;
use crate::events::StepListener;

use super::filenames::extract_explicit_filenames;
use super::schema::RuntimeSkill;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SkillsMode {
    On,
    Shadow,
    Off,
}

impl SkillsMode {
    pub fn from_env_value(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "shadow" => SkillsMode::Shadow,
            "off" | "0" | "false" => SkillsMode::Off,
            _ => SkillsMode::On,
        }
    }
}

/// Selects skills whose triggers match `question`/attachment extensions, preserving the packs'
/// load order (§4.6 "Selection is order-preserving by pack load order").
pub fn detect_triggered<'a>(
    skills: &'a [RuntimeSkill],
    question: &str,
    attachment_extensions: &HashSet<String>,
) -> Vec<&'a RuntimeSkill> {
    skills
        .iter()
        .filter(|s| s.matches_question(question) || s.matches_extensions(attachment_extensions))
        .collect()
}

/// Expands a research-flavored skill's question into 2-4 deduplicated query candidates
/// (§4.6 "Plan preparation").
pub fn expand_research_queries(question: &str) -> Vec<String> {
    let suffixes = ["abstract methodology key findings", "latest updates", "benchmarks"];
    let mut seen = HashSet::new();
    let mut queries = Vec::new();
    if seen.insert(question.to_lowercase()) {
        queries.push(question.to_string());
    }
    for suffix in suffixes {
        let candidate = format!("{question} {suffix}");
        if seen.insert(candidate.to_lowercase()) {
            queries.push(candidate);
        }
        if queries.len() >= 4 {
            break;
        }
    }
    queries
}

/// Injects `skill`'s required tools and prompt context into whichever of `document_agent`/
/// `developer_agent` exists in `roster`, skipping tool/prompt entries already present
/// (§4.6 "idempotent: skip if already present").
pub fn inject_policy(roster: &mut [AgentSpec], skill: &RuntimeSkill) {
    let Some(target) = roster
        .iter_mut()
        .find(|a| a.name == "document_agent")
        .or_else(|| roster.iter_mut().find(|a| a.name == "developer_agent"))
    else {
        return;
    };

    for tool in &skill.required_tools {
        if !target.tools.iter().any(|t| t == tool) {
            target.tools.push(tool.clone());
        }
    }

    for instruction in &skill.prompt_instructions {
        if !target.system_prompt.contains(instruction.as_str()) {
            target.system_prompt.push_str("\n\n");
            target.system_prompt.push_str(instruction);
        }
    }
}

/// State accumulated across a turn by observing step events (§4.6 "Observation").
#[derive(Default)]
pub struct RunState {
    pub transcript: String,
    pub artifacts: Vec<Value>,
    pub query_plan: Vec<String>,
}

/// Subscribes to the turn's [`crate::events::EventStream`] and folds search/artifact/text
/// events into a [`RunState`] for later validation and repair.
pub struct SkillObserver {
    state: Mutex<RunState>,
}

impl SkillObserver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RunState::default()),
        }
    }

    pub fn snapshot_transcript(&self) -> String {
        self.state.lock().unwrap().transcript.clone()
    }

    pub fn snapshot_artifacts(&self) -> Vec<Value> {
        self.state.lock().unwrap().artifacts.clone()
    }
}

impl Default for SkillObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl StepListener for SkillObserver {
    fn on_step(&self, event: &StepEvent) {
        let mut state = self.state.lock().unwrap();
        match event.step {
            StepKind::Streaming | StepKind::DecomposeText => {
                if let Some(chunk) = event.data.get("chunk").and_then(Value::as_str) {
                    state.transcript.push_str(chunk);
                }
            }
            StepKind::Artifact => {
                state.artifacts.push(event.data.clone());
            }
            StepKind::DeactivateToolkit => {
                let is_search = event
                    .data
                    .get("toolkit_name")
                    .and_then(Value::as_str)
                    .map(|n| n.contains("search"))
                    .unwrap_or(false);
                if is_search {
                    dedupe_sources_in_place(&mut state);
                }
            }
            _ => {}
        }
    }
}

fn dedupe_sources_in_place(state: &mut RunState) {
    let mut seen = HashSet::new();
    state.artifacts.retain(|a| {
        let key = a
            .get("url")
            .or_else(|| a.get("title"))
            .and_then(Value::as_str)
            .map(str::to_string);
        match key {
            Some(k) => seen.insert(k),
            None => true,
        }
    });
}

/// Gathers explicit filenames the user wrote in `question`, used to exempt them from the
/// `human_readable_filename` rule and from repair-pass renaming.
pub fn explicit_filenames(question: &str) -> HashSet<String> {
    extract_explicit_filenames(question)
}

/// Attachment extensions derived from uploaded filenames, for trigger matching (§4.6).
pub fn attachment_extensions(filenames: &[String]) -> HashSet<String> {
    filenames
        .iter()
        .filter_map(|name| Path::new(name).extension().map(|e| e.to_string_lossy().to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::schema::SkillPackConfig;

    fn skill(domains: &[&str], triggers: &[&str]) -> RuntimeSkill {
        let config = SkillPackConfig {
            id: "s1".into(),
            name: "S1".into(),
            version: "1.0".into(),
            description: String::new(),
            domains: domains.iter().map(|s| s.to_string()).collect(),
            force_complex: false,
            required_tools: vec!["web_search".into()],
            prompt_instructions: vec!["Always cite sources.".into()],
            triggers: crate::skills::schema::SkillTriggerConfig {
                regex: triggers.iter().map(|s| s.to_string()).collect(),
                extensions: vec![],
            },
            output_contract: Default::default(),
            validation_rules: Default::default(),
            retry_policy: Default::default(),
        };
        RuntimeSkill::from_config(config, String::new(), Default::default())
    }

    #[test]
    fn detect_triggered_matches_by_regex() {
        let skills = vec![skill(&["research"], &["research paper"])];
        let found = detect_triggered(&skills, "write a research paper on RAG", &HashSet::new());
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn expand_research_queries_caps_at_four_and_dedupes() {
        let queries = expand_research_queries("RAG pipelines");
        assert!(queries.len() <= 4);
        assert_eq!(queries[0], "RAG pipelines");
    }

    #[test]
    fn inject_policy_is_idempotent() {
        let mut roster = vec![AgentSpec {
            name: "document_agent".into(),
            description: "d".into(),
            system_prompt: "base prompt".into(),
            tools: vec![],
        }];
        let s = skill(&["research"], &[]);
        inject_policy(&mut roster, &s);
        inject_policy(&mut roster, &s);
        assert_eq!(roster[0].tools, vec!["web_search".to_string()]);
        assert_eq!(roster[0].system_prompt.matches("Always cite sources.").count(), 1);
    }

    #[test]
    fn skills_mode_parses_shadow_and_off() {
        assert_eq!(SkillsMode::from_env_value("shadow"), SkillsMode::Shadow);
        assert_eq!(SkillsMode::from_env_value("off"), SkillsMode::Off);
        assert_eq!(SkillsMode::from_env_value("on"), SkillsMode::On);
    }
}
