//! `StepEvent`/`ArtifactEvent`: the closed event vocabulary a turn emits (spec §3, §4.8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of step kinds a turn may emit. Intentionally closed (not an open string) so
/// that adding a new step kind is a compile-time decision, not a silent protocol drift.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Confirmed,
    Streaming,
    DecomposeText,
    ToSubTasks,
    AssignTask,
    TaskState,
    CreateAgent,
    ActivateAgent,
    DeactivateAgent,
    ActivateToolkit,
    DeactivateToolkit,
    Artifact,
    AskUser,
    Notice,
    Error,
    TurnCancelled,
    End,
    ContextTooLong,
}

impl StepKind {
    /// True for the one step kind that must terminate every turn's event sequence.
    pub fn is_terminal(self) -> bool {
        matches!(self, StepKind::End)
    }
}

/// One event in a turn's event log: `{task_id, step, data, timestamp}` (spec §3, §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepEvent {
    pub task_id: String,
    pub step: StepKind,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl StepEvent {
    pub fn new(task_id: impl Into<String>, step: StepKind, data: Value, now: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.into(),
            step,
            data,
            timestamp: now,
        }
    }
}

/// File-extension-derived artifact kind used for both the Artifact Detector (§4.7) and skill
/// output-contract validation (§4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Image,
    File,
}

impl ArtifactKind {
    /// Classifies by lowercase extension (without the leading dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" => ArtifactKind::Image,
            _ => ArtifactKind::File,
        }
    }
}

/// A file produced during a turn that the user should be able to download (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtifactEvent {
    pub task_id: String,
    pub artifact_type: ArtifactKind,
    pub name: String,
    pub content_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_kind_round_trips_through_json() {
        let json = serde_json::to_string(&StepKind::DeactivateToolkit).unwrap();
        assert_eq!(json, "\"deactivate_toolkit\"");
        let back: StepKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StepKind::DeactivateToolkit);
    }

    #[test]
    fn only_end_is_terminal() {
        assert!(StepKind::End.is_terminal());
        assert!(!StepKind::Error.is_terminal());
    }

    #[test]
    fn artifact_kind_classifies_known_image_extensions() {
        assert_eq!(ArtifactKind::from_extension("PNG"), ArtifactKind::Image);
        assert_eq!(ArtifactKind::from_extension("xlsx"), ArtifactKind::File);
    }
}
