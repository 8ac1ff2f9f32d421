//! Human-in-the-loop approval gate (§4.5). Every non-`never_ask` call blocks on a reply from
//! whichever channel owns this project's pending approvals until a timeout, at which point the
//! configured default-allow decides the outcome.

use async_trait::async_trait;
use std::time::Duration;

use super::contract::ToolSpec;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ApprovalTier {
    /// Ask every single time, regardless of a prior answer this turn.
    AlwaysAsk,
    /// Ask once per project per toolkit+method; subsequent calls reuse that answer.
    AskOnce,
    /// Never prompt; always allowed.
    NeverAsk,
}

const ALWAYS_ASK_KEYWORDS: &[&str] = &[
    "terminal", "exec", "execute", "run_command", "shell", "bash",
    "gui", "screen", "click", "keyboard",
    "email", "send_mail", "smtp",
    "delete", "remove", "rm",
    "move", "rename",
];

const ASK_ONCE_KEYWORDS: &[&str] = &[
    "write", "append", "create", "edit", "update", "commit", "push",
    "pull_request", "merge", "upload",
];

const NEVER_ASK_KEYWORDS: &[&str] = &[
    "list", "search", "read", "get", "fetch", "browse", "view", "query", "status",
];

/// Classifies a toolkit method against the §4.5 trigger table. Checked in order: always_ask
/// keywords beat ask_once beat never_ask; an unrecognized method defaults to `ask_once`, the
/// conservative middle tier.
pub fn approval_tier(toolkit_name: &str, method_name: &str) -> ApprovalTier {
    let haystack = format!("{toolkit_name}.{method_name}").to_lowercase();
    if ALWAYS_ASK_KEYWORDS.iter().any(|k| haystack.contains(k)) {
        return ApprovalTier::AlwaysAsk;
    }
    if ASK_ONCE_KEYWORDS.iter().any(|k| haystack.contains(k)) {
        return ApprovalTier::AskOnce;
    }
    if NEVER_ASK_KEYWORDS.iter().any(|k| haystack.contains(k)) {
        return ApprovalTier::NeverAsk;
    }
    ApprovalTier::AskOnce
}

pub const APPROVAL_WAIT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ApprovalDecision {
    Allow,
    Deny,
}

/// Owned by the project lock (`task_lock::ProjectLock`); kept as a trait here so `toolkit`
/// never depends on `task_lock`, avoiding a module cycle.
#[async_trait]
pub trait ApprovalChannelRegistry: Send + Sync {
    /// Registers a pending ask under `request_id` (minted by the caller so it can emit the
    /// matching `ask_user` event before awaiting) and returns a human decision, a cached
    /// ask_once answer, or the timeout's default.
    async fn request_approval(
        &self,
        project_id: &str,
        request_id: &str,
        spec: &ToolSpec,
        preview: &str,
        tier: ApprovalTier,
        default_allow: bool,
    ) -> ApprovalDecision;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_destructive_and_terminal_methods_as_always_ask() {
        assert_eq!(approval_tier("shell", "run_command"), ApprovalTier::AlwaysAsk);
        assert_eq!(approval_tier("files", "delete_file"), ApprovalTier::AlwaysAsk);
        assert_eq!(approval_tier("email", "send_mail"), ApprovalTier::AlwaysAsk);
    }

    #[test]
    fn classifies_mutation_methods_as_ask_once() {
        assert_eq!(approval_tier("files", "write_file"), ApprovalTier::AskOnce);
        assert_eq!(approval_tier("git", "commit"), ApprovalTier::AskOnce);
    }

    #[test]
    fn classifies_read_only_methods_as_never_ask() {
        assert_eq!(approval_tier("files", "list_directory"), ApprovalTier::NeverAsk);
        assert_eq!(approval_tier("web", "search"), ApprovalTier::NeverAsk);
    }
}
