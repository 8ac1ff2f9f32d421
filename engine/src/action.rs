//! The tagged union of requests a client can enqueue on a project's lock (§3, §9).

use serde::{Deserialize, Serialize};

/// A file attached to an `Improve` request, already uploaded via `/files/upload`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttachmentPayload {
    pub file_id: String,
    pub filename: String,
    pub content_type: Option<String>,
}

/// A caller-supplied override for one provider config field (§4.2 step 2: "inline override from
/// the Action if complete"). `None` fields fall back to the provider fetched from Core.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProviderOverride {
    pub provider_name: Option<String>,
    pub model_type: Option<String>,
    pub api_key: Option<String>,
    pub endpoint_url: Option<String>,
}

impl ProviderOverride {
    /// True when every field needed to dial a provider directly is present, letting the run
    /// loop skip the Core provider-fetch round trip.
    pub fn is_complete(&self) -> bool {
        self.provider_name.is_some() && self.model_type.is_some() && self.api_key.is_some()
    }
}

/// A custom agent spec supplied by the caller, merged by case-insensitive name against the
/// built-in roster (§3 Agent Profile, §4.4 Phase B).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub tools: Vec<String>,
}

/// One request enqueued on a [`crate::task_lock::ProjectLock`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Improve {
        project_id: String,
        task_id: String,
        question: String,
        #[serde(default)]
        search_enabled: Option<bool>,
        #[serde(default)]
        attachments: Vec<AttachmentPayload>,
        #[serde(default)]
        auth_token: Option<String>,
        #[serde(default)]
        provider_override: Option<ProviderOverride>,
        #[serde(default)]
        custom_agents: Vec<AgentSpec>,
    },
    Stop {
        project_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
}

impl Action {
    pub fn project_id(&self) -> &str {
        match self {
            Action::Improve { project_id, .. } => project_id,
            Action::Stop { project_id, .. } => project_id,
        }
    }
}

/// Accumulates token usage across every provider call in a turn (classification, decomposition,
/// per-agent runs, summary). Reported on the terminal history update as `tokens = Σusage`.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct TokenTracker {
    pub total_tokens: u64,
}

impl TokenTracker {
    pub fn add(&mut self, tokens: u64) {
        self.total_tokens += tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_override_complete_requires_all_three_core_fields() {
        let mut over = ProviderOverride::default();
        assert!(!over.is_complete());
        over.provider_name = Some("openai".into());
        over.model_type = Some("gpt-4o".into());
        assert!(!over.is_complete());
        over.api_key = Some("sk-test".into());
        assert!(over.is_complete());
    }

    #[test]
    fn token_tracker_accumulates() {
        let mut t = TokenTracker::default();
        t.add(10);
        t.add(5);
        assert_eq!(t.total_tokens, 15);
    }

    #[test]
    fn action_project_id_reads_both_variants() {
        let improve = Action::Improve {
            project_id: "p1".into(),
            task_id: "t1".into(),
            question: "hi".into(),
            search_enabled: None,
            attachments: vec![],
            auth_token: None,
            provider_override: None,
            custom_agents: vec![],
        };
        assert_eq!(improve.project_id(), "p1");
        let stop = Action::Stop {
            project_id: "p2".into(),
            reason: None,
        };
        assert_eq!(stop.project_id(), "p2");
    }
}
