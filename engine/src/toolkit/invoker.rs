//! Typed middleware wrapping every tool call with paired lifecycle events and the approval gate
//! (§4.5, §8). Replaces the upstream module's dynamic decorator-based interception: a caller
//! here holds a concrete `ToolInvoker`, not a monkey-patched method.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::artifacts::{self, ArtifactDedupe};
use crate::events::EventStream;
use stream_event::{ArtifactEvent, StepKind};

use super::approval::{ApprovalChannelRegistry, ApprovalDecision, ApprovalTier};
use super::contract::{Tool, ToolError, ToolSpec};
use super::context::ToolContext;

const PREVIEW_MAX_CHARS: usize = 500;

pub struct ToolInvoker {
    approvals: Arc<dyn ApprovalChannelRegistry>,
    default_allow: bool,
    workdir: PathBuf,
    dedupe: Mutex<ArtifactDedupe>,
}

impl ToolInvoker {
    pub fn new(approvals: Arc<dyn ApprovalChannelRegistry>, default_allow: bool, workdir: PathBuf) -> Self {
        Self {
            approvals,
            default_allow,
            workdir,
            dedupe: Mutex::new(ArtifactDedupe::new()),
        }
    }

    /// Runs `tool` for `args`, emitting `activate_toolkit` before and `deactivate_toolkit`
    /// after no matter how the call ends. A denied or timed-out approval short-circuits the
    /// call but still emits the paired deactivate event (§8 invariant).
    pub async fn invoke(
        &self,
        tool: &dyn Tool,
        args: Value,
        ctx: &ToolContext,
        events: &EventStream,
    ) -> Result<String, ToolError> {
        let spec = tool.spec();
        let preview = truncate_preview(&args.to_string());
        events.emit(
            StepKind::ActivateToolkit,
            json!({
                "toolkit_name": spec.toolkit_name,
                "method_name": spec.method_name,
                "preview": preview,
            }),
        );

        let result = self.invoke_inner(tool, &spec, args, ctx, events).await;

        let (outcome, message) = match &result {
            Ok(text) => ("ok", truncate_preview(text)),
            Err(e) => ("error", e.to_string()),
        };
        events.emit(
            StepKind::DeactivateToolkit,
            json!({
                "toolkit_name": spec.toolkit_name,
                "method_name": spec.method_name,
                "outcome": outcome,
                "preview": message,
            }),
        );

        if let Ok(text) = &result {
            self.emit_artifacts(ctx, text, events).await;
        }

        result
    }

    /// Scans a successful tool result for files it produced (§4.7) and emits one `artifact`
    /// event per new one found, right after the `deactivate_toolkit` that produced it (§4.8).
    async fn emit_artifacts(&self, ctx: &ToolContext, message: &str, events: &EventStream) {
        let mut dedupe = self.dedupe.lock().await;
        let found = artifacts::detect_artifacts(
            &ctx.process_task_id,
            Some(ctx.project_id.as_str()),
            &self.workdir,
            message,
            &mut dedupe,
        );
        drop(dedupe);
        for artifact in found {
            let payload = ArtifactEvent {
                task_id: ctx.process_task_id.clone(),
                artifact_type: artifact.kind,
                name: artifact.name,
                content_url: Some(artifact.content_url),
                created_at: chrono::Utc::now(),
            };
            events.emit(StepKind::Artifact, json!(payload));
        }
    }

    async fn invoke_inner(
        &self,
        tool: &dyn Tool,
        spec: &ToolSpec,
        args: Value,
        ctx: &ToolContext,
        events: &EventStream,
    ) -> Result<String, ToolError> {
        let tier = super::approval::approval_tier(&spec.toolkit_name, &spec.method_name);
        if tier != ApprovalTier::NeverAsk {
            let preview = truncate_preview(&args.to_string());
            let request_id = uuid::Uuid::new_v4().to_string();
            events.emit(
                StepKind::AskUser,
                json!({
                    "request_id": request_id,
                    "tier": format!("{tier:?}"),
                    "human_question": format!("Allow {} to call {}?", spec.toolkit_name, spec.method_name),
                    "detail": preview,
                    "toolkit_name": spec.toolkit_name,
                    "method_name": spec.method_name,
                    "agent_name": ctx.agent_name,
                    "process_task_id": ctx.process_task_id,
                }),
            );
            let decision = tokio::time::timeout(
                super::approval::APPROVAL_WAIT_TIMEOUT,
                self.approvals
                    .request_approval(&ctx.project_id, &request_id, spec, &preview, tier, self.default_allow),
            )
            .await
            .unwrap_or(if self.default_allow {
                ApprovalDecision::Allow
            } else {
                ApprovalDecision::Deny
            });

            if decision == ApprovalDecision::Deny {
                return Err(ToolError::PermissionDenied {
                    toolkit_name: spec.toolkit_name.clone(),
                    method_name: spec.method_name.clone(),
                });
            }
        }

        tool.call(args, ctx).await
    }
}

fn truncate_preview(s: &str) -> String {
    let total = s.chars().count();
    if total <= PREVIEW_MAX_CHARS {
        return s.to_string();
    }
    let truncated: String = s.chars().take(PREVIEW_MAX_CHARS).collect();
    format!("{truncated}... (truncated, total length: {total} chars)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                toolkit_name: "files".into(),
                method_name: "list_directory".into(),
                description: "list a directory".into(),
                parameters: json!({}),
            }
        }

        async fn call(&self, args: Value, _ctx: &ToolContext) -> Result<String, ToolError> {
            Ok(format!("ok:{args}"))
        }
    }

    struct AlwaysDeny;

    #[async_trait]
    impl ApprovalChannelRegistry for AlwaysDeny {
        async fn request_approval(
            &self,
            _project_id: &str,
            _request_id: &str,
            _spec: &ToolSpec,
            _preview: &str,
            _tier: ApprovalTier,
            _default_allow: bool,
        ) -> ApprovalDecision {
            ApprovalDecision::Deny
        }
    }

    struct AlwaysAllow;

    #[async_trait]
    impl ApprovalChannelRegistry for AlwaysAllow {
        async fn request_approval(
            &self,
            _project_id: &str,
            _request_id: &str,
            _spec: &ToolSpec,
            _preview: &str,
            _tier: ApprovalTier,
            _default_allow: bool,
        ) -> ApprovalDecision {
            ApprovalDecision::Allow
        }
    }

    struct WriteTool;

    #[async_trait]
    impl Tool for WriteTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                toolkit_name: "file".into(),
                method_name: "write_to_file".into(),
                description: "write a file".into(),
                parameters: json!({}),
            }
        }

        async fn call(&self, args: Value, _ctx: &ToolContext) -> Result<String, ToolError> {
            Ok(format!("wrote:{args}"))
        }
    }

    #[tokio::test]
    async fn never_ask_tier_skips_approval_entirely() {
        let tmp = tempfile::tempdir().unwrap();
        let invoker = ToolInvoker::new(Arc::new(AlwaysDeny), false, tmp.path().to_path_buf());
        let ctx = ToolContext::new("agent", "task-1", "proj-1", None);
        let (events, mut rx) = EventStream::new("task-1");
        let result = invoker.invoke(&EchoTool, json!({"path": "."}), &ctx, &events).await;
        assert!(result.is_ok());
        assert_eq!(rx.try_recv().unwrap().step, StepKind::ActivateToolkit);
        assert_eq!(rx.try_recv().unwrap().step, StepKind::DeactivateToolkit);
    }

    #[tokio::test]
    async fn ask_once_tier_emits_ask_user_between_activate_and_deactivate() {
        let tmp = tempfile::tempdir().unwrap();
        let invoker = ToolInvoker::new(Arc::new(AlwaysAllow), false, tmp.path().to_path_buf());
        let ctx = ToolContext::new("agent", "task-1", "proj-1", None);
        let (events, mut rx) = EventStream::new("task-1");
        let result = invoker.invoke(&WriteTool, json!({"path": "a.xlsx"}), &ctx, &events).await;
        assert!(result.is_ok());
        assert_eq!(rx.try_recv().unwrap().step, StepKind::ActivateToolkit);
        assert_eq!(rx.try_recv().unwrap().step, StepKind::AskUser);
        assert_eq!(rx.try_recv().unwrap().step, StepKind::DeactivateToolkit);
    }

    struct WriteReportTool;

    #[async_trait]
    impl Tool for WriteReportTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                toolkit_name: "file".into(),
                method_name: "write_to_file".into(),
                description: "write a file".into(),
                parameters: json!({}),
            }
        }

        async fn call(&self, _args: Value, _ctx: &ToolContext) -> Result<String, ToolError> {
            Ok("written to file: report.csv".to_string())
        }
    }

    #[tokio::test]
    async fn successful_write_emits_artifact_event_after_deactivate_toolkit() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("report.csv"), b"data").unwrap();
        let invoker = ToolInvoker::new(Arc::new(AlwaysAllow), false, tmp.path().to_path_buf());
        let ctx = ToolContext::new("agent", "task-1", "proj-1", None);
        let (events, mut rx) = EventStream::new("task-1");
        let result = invoker.invoke(&WriteReportTool, json!({"path": "report.csv"}), &ctx, &events).await;
        assert!(result.is_ok());
        assert_eq!(rx.try_recv().unwrap().step, StepKind::ActivateToolkit);
        assert_eq!(rx.try_recv().unwrap().step, StepKind::AskUser);
        assert_eq!(rx.try_recv().unwrap().step, StepKind::DeactivateToolkit);
        let artifact = rx.try_recv().unwrap();
        assert_eq!(artifact.step, StepKind::Artifact);
        assert_eq!(artifact.data["name"], "report.csv");
    }

    #[test]
    fn preview_truncates_long_args_with_length_marker() {
        let long = "x".repeat(1000);
        let truncated = truncate_preview(&long);
        assert!(truncated.contains("(truncated, total length: 1000 chars)"));
    }
}
