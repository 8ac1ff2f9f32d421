//! Per-project serialization (§4.1): one `ProjectLock` per `project_id`, holding that project's
//! FIFO action queue, its cancellation flag, and its pending tool-approval state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};

use crate::action::Action;
use crate::toolkit::{ApprovalChannelRegistry, ApprovalDecision, ApprovalTier, ToolSpec};
use stream_event::StepEvent;

/// Events from any in-flight turn on this project fan out here. A project runs one turn at a
/// time (§4.1), so a subscriber that calls [`ProjectLock::subscribe_events`] before enqueuing its
/// action is guaranteed to see that turn's full event sequence from `confirmed` through `end`.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One pending human-approval prompt, keyed by a fresh `request_id` (§4.5 "Prompt protocol").
/// Carries the tier and toolkit name it was raised for, since the `/permission` endpoint that
/// resolves it only receives `{request_id, approved, remember}` (§6) — not the tool context.
struct PendingApproval {
    reply: oneshot::Sender<ApprovalDecision>,
    tier: ApprovalTier,
    toolkit_name: String,
}

pub struct ProjectLock {
    project_id: String,
    queue_tx: mpsc::UnboundedSender<Action>,
    queue_rx: Mutex<mpsc::UnboundedReceiver<Action>>,
    pub stop_requested: Arc<AtomicBool>,
    last_accessed_ms: Mutex<i64>,
    pending_approvals: Mutex<HashMap<String, PendingApproval>>,
    /// `ask_once` decisions remembered per toolkit name (§4.5 "remembered if user ticks
    /// remember").
    remembered: Mutex<HashMap<String, bool>>,
    events_tx: broadcast::Sender<StepEvent>,
}

impl ProjectLock {
    pub fn new(project_id: impl Into<String>) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            project_id: project_id.into(),
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
            stop_requested: Arc::new(AtomicBool::new(false)),
            last_accessed_ms: Mutex::new(0),
            pending_approvals: Mutex::new(HashMap::new()),
            remembered: Mutex::new(HashMap::new()),
            events_tx,
        })
    }

    /// Subscribes to this project's live event stream. Call before enqueuing the action whose
    /// events you want to observe — a subscriber only ever misses events sent before it
    /// subscribed, never ones sent after.
    pub fn subscribe_events(&self) -> broadcast::Receiver<StepEvent> {
        self.events_tx.subscribe()
    }

    /// Publishes an event to any live subscribers. A no-op when nobody is listening (e.g. the
    /// project was driven via the enqueue-only `/improve` endpoint).
    pub fn publish_event(&self, event: StepEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Appends `action` to the FIFO queue. A `Stop` also sets `stop_requested` eagerly so a
    /// turn in flight observes it before the queue is next drained (§4.1).
    pub fn put(&self, action: Action) {
        if matches!(action, Action::Stop { .. }) {
            self.stop_requested.store(true, Ordering::SeqCst);
        }
        let _ = self.queue_tx.send(action);
    }

    pub async fn get(&self) -> Option<Action> {
        self.queue_rx.lock().await.recv().await
    }

    pub async fn touch(&self, now_ms: i64) {
        *self.last_accessed_ms.lock().await = now_ms;
    }

    pub async fn last_accessed_ms(&self) -> i64 {
        *self.last_accessed_ms.lock().await
    }

    fn answer_key(&self, toolkit_name: &str) -> String {
        toolkit_name.to_string()
    }

    /// Records the user's decision for `request_id`, and if `remember` is set for an `ask_once`
    /// tier, caches it under the toolkit name so later calls auto-approve (§4.5). Returns `false`
    /// if `request_id` is unknown (already resolved, timed out, or never existed).
    pub async fn resolve_approval(&self, request_id: &str, decision: ApprovalDecision, remember: bool) -> bool {
        let Some(pending) = self.pending_approvals.lock().await.remove(request_id) else {
            return false;
        };
        if remember && pending.tier == ApprovalTier::AskOnce {
            self.remembered
                .lock()
                .await
                .insert(self.answer_key(&pending.toolkit_name), decision == ApprovalDecision::Allow);
        }
        let _ = pending.reply.send(decision);
        true
    }
}

#[async_trait]
impl ApprovalChannelRegistry for ProjectLock {
    async fn request_approval(
        &self,
        _project_id: &str,
        request_id: &str,
        spec: &ToolSpec,
        _preview: &str,
        tier: ApprovalTier,
        default_allow: bool,
    ) -> ApprovalDecision {
        if tier == ApprovalTier::AskOnce {
            if let Some(&allowed) = self.remembered.lock().await.get(&self.answer_key(&spec.toolkit_name)) {
                return if allowed { ApprovalDecision::Allow } else { ApprovalDecision::Deny };
            }
        }

        if self.stop_requested.load(Ordering::SeqCst) {
            return ApprovalDecision::Deny;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending_approvals.lock().await.insert(
            request_id.to_string(),
            PendingApproval {
                reply: reply_tx,
                tier,
                toolkit_name: spec.toolkit_name.clone(),
            },
        );

        // The invoker emits `ask_user` with this same request_id before calling us; the `/chat`
        // handler calls `resolve_approval` when the client answers, or we fall through to the
        // default below when the invoker's own timeout fires first and drops `reply_rx`.
        reply_rx
            .await
            .unwrap_or(if default_allow { ApprovalDecision::Allow } else { ApprovalDecision::Deny })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn spec() -> ToolSpec {
        ToolSpec {
            toolkit_name: "files".into(),
            method_name: "write_file".into(),
            description: "d".into(),
            parameters: json!({}),
        }
    }

    #[tokio::test]
    async fn put_stop_sets_stop_requested_immediately() {
        let lock = ProjectLock::new("p1");
        lock.put(Action::Stop { project_id: "p1".into(), reason: None });
        assert!(lock.stop_requested.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn queue_is_fifo() {
        let lock = ProjectLock::new("p1");
        lock.put(Action::Improve {
            project_id: "p1".into(),
            task_id: "t1".into(),
            question: "first".into(),
            search_enabled: None,
            attachments: vec![],
            auth_token: None,
            provider_override: None,
            custom_agents: vec![],
        });
        lock.put(Action::Improve {
            project_id: "p1".into(),
            task_id: "t2".into(),
            question: "second".into(),
            search_enabled: None,
            attachments: vec![],
            auth_token: None,
            provider_override: None,
            custom_agents: vec![],
        });
        let first = lock.get().await.unwrap();
        assert!(matches!(first, Action::Improve { task_id, .. } if task_id == "t1"));
    }

    #[tokio::test]
    async fn remembered_ask_once_decision_auto_approves() {
        let lock = ProjectLock::new("p1");
        let lock_for_ask = lock.clone();
        let asker = tokio::spawn(async move {
            lock_for_ask
                .request_approval("p1", "req-1", &spec(), "preview", ApprovalTier::AskOnce, false)
                .await
        });
        // Give the spawned request a moment to register before resolving it.
        tokio::task::yield_now().await;
        let resolved = lock.resolve_approval("req-1", ApprovalDecision::Allow, true).await;
        assert!(resolved);
        assert_eq!(asker.await.unwrap(), ApprovalDecision::Allow);

        let decision = lock.request_approval("p1", "req-2", &spec(), "preview", ApprovalTier::AskOnce, false).await;
        assert_eq!(decision, ApprovalDecision::Allow);
    }

    #[tokio::test]
    async fn resolve_approval_returns_false_for_unknown_request_id() {
        let lock = ProjectLock::new("p1");
        let resolved = lock.resolve_approval("no-such-id", ApprovalDecision::Allow, false).await;
        assert!(!resolved);
    }

    #[tokio::test]
    async fn subscriber_registered_before_publish_receives_event() {
        use stream_event::StepKind;

        let lock = ProjectLock::new("p1");
        let mut rx = lock.subscribe_events();
        lock.publish_event(StepEvent::new("t1", StepKind::Confirmed, json!({}), Utc::now()));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.task_id, "t1");
    }

    #[tokio::test]
    async fn stop_requested_denies_new_approval_requests() {
        let lock = ProjectLock::new("p1");
        lock.stop_requested.store(true, Ordering::SeqCst);
        let decision = lock
            .request_approval("p1", "req-1", &spec(), "preview", ApprovalTier::AlwaysAsk, true)
            .await;
        assert_eq!(decision, ApprovalDecision::Deny);
    }
}
