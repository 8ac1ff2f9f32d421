//! Formats a turn's step events for the terminal (non-`--json` mode).

use stream_event::{StepEvent, StepKind};

/// Truncates a string to at most `max` chars, UTF-8 safe; appends `...` when truncated.
fn truncate(s: &str, max: usize) -> String {
    const SUFFIX: &str = "...";
    if max <= SUFFIX.len() {
        return s.chars().take(max).collect();
    }
    if s.chars().count() <= max {
        return s.to_string();
    }
    format!("{}{}", s.chars().take(max - SUFFIX.len()).collect::<String>(), SUFFIX)
}

/// One line per event: `[step] detail`, with any text payload truncated to keep the terminal
/// readable. Returns `None` for step kinds with nothing worth printing on their own line.
pub fn format_event(event: &StepEvent, max_len: usize) -> Option<String> {
    let detail = match event.step {
        StepKind::Streaming => event.data.get("delta").and_then(|v| v.as_str()).map(str::to_string),
        StepKind::DecomposeText | StepKind::Notice => {
            event.data.get("text").and_then(|v| v.as_str()).map(str::to_string)
        }
        StepKind::AssignTask | StepKind::TaskState => event
            .data
            .get("agent")
            .or_else(|| event.data.get("state"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        StepKind::CreateAgent | StepKind::ActivateAgent | StepKind::DeactivateAgent => {
            event.data.get("name").and_then(|v| v.as_str()).map(str::to_string)
        }
        StepKind::ActivateToolkit | StepKind::DeactivateToolkit => {
            event.data.get("toolkit").and_then(|v| v.as_str()).map(str::to_string)
        }
        StepKind::Artifact => event.data.get("name").and_then(|v| v.as_str()).map(str::to_string),
        StepKind::AskUser => event.data.get("question").and_then(|v| v.as_str()).map(str::to_string),
        StepKind::Error => event.data.get("message").and_then(|v| v.as_str()).map(str::to_string),
        StepKind::TurnCancelled => Some("cancelled".to_string()),
        StepKind::ContextTooLong => Some("context too long".to_string()),
        StepKind::Confirmed | StepKind::End | StepKind::ToSubTasks => None,
    };

    let label = format!("{:?}", event.step);
    match detail {
        Some(text) if !text.is_empty() => Some(format!("[{label}] {}", truncate(&text, max_len))),
        _ => Some(format!("[{label}]")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn formats_streaming_delta_truncated() {
        let event = StepEvent::new("t1", StepKind::Streaming, json!({ "delta": "hello world" }), Utc::now());
        assert_eq!(format_event(&event, 5).unwrap(), "[Streaming] hello...");
    }

    #[test]
    fn formats_bare_label_when_no_payload() {
        let event = StepEvent::new("t1", StepKind::Confirmed, json!({}), Utc::now());
        assert_eq!(format_event(&event, 100).unwrap(), "[Confirmed]");
    }
}
