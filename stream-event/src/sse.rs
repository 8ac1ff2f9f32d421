//! SSE line framing for `StepEvent`s (spec §6): `data: <json>\n\n`.

use serde::Serialize;

/// Frames any serializable payload as a single SSE `data:` line, terminated by the blank line
/// that marks the end of an SSE event.
pub fn to_sse_line<T: Serialize>(payload: &T) -> Result<String, serde_json::Error> {
    let body = serde_json::to_string(payload)?;
    Ok(format!("data: {body}\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{StepEvent, StepKind};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn frames_with_leading_data_prefix_and_trailing_blank_line() {
        let event = StepEvent::new(
            "task-1",
            StepKind::Notice,
            json!({"message": "hello"}),
            Utc.timestamp_opt(0, 0).unwrap(),
        );
        let line = to_sse_line(&event).unwrap();
        assert!(line.starts_with("data: "));
        assert!(line.ends_with("\n\n"));
        assert!(!line[6..line.len() - 2].contains('\n'));
    }
}
