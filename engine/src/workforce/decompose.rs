//! Parses the decomposition completion's text into sub-task records (§4.4 Phase A.2). Tries, in
//! order: a JSON array (tolerating a fenced block and trailing commas), a bullet list, and
//! finally a single catch-all node so the turn can always proceed.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SubTaskSpec {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub assigned_role: Option<String>,
}

static FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap());
static TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*([}\]])").unwrap());
static BULLET_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*[-*\d.)]+\s*(.+)$").unwrap());

const FALLBACK_CONTENT: &str = "Complete the task end-to-end.";

/// Parses `text` into a deduplicated sub-task list. Never returns an empty `Vec` unless `text`
/// is entirely blank after every strategy — callers treat that as a hard decomposition failure
/// (§4.4 "empty decomposition" edge case), since the final fallback node itself never needed.
pub fn parse_sub_tasks(text: &str) -> Vec<SubTaskSpec> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let parsed = parse_json_array(text)
        .or_else(|| parse_bullet_list(text))
        .unwrap_or_else(|| {
            vec![SubTaskSpec {
                id: "1".to_string(),
                content: FALLBACK_CONTENT.to_string(),
                assigned_role: None,
            }]
        });
    dedupe_by_id(parsed)
}

fn parse_json_array(text: &str) -> Option<Vec<SubTaskSpec>> {
    let candidate = FENCE
        .captures(text)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| text.to_string());
    let (start, end) = (candidate.find('[')?, candidate.rfind(']')?);
    if end <= start {
        return None;
    }
    let slice = &candidate[start..=end];
    if let Ok(parsed) = serde_json::from_str::<Vec<SubTaskSpec>>(slice) {
        return Some(parsed);
    }
    let sanitized = TRAILING_COMMA.replace_all(slice, "$1");
    serde_json::from_str::<Vec<SubTaskSpec>>(&sanitized).ok()
}

fn parse_bullet_list(text: &str) -> Option<Vec<SubTaskSpec>> {
    let mut out = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.chars().count() < 3 {
            continue;
        }
        let content = BULLET_LINE
            .captures(trimmed)
            .map(|c| c[1].trim().to_string())
            .unwrap_or_else(|| trimmed.to_string());
        if content.chars().count() < 3 {
            continue;
        }
        out.push(SubTaskSpec {
            id: (out.len() + 1).to_string(),
            content,
            assigned_role: None,
        });
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn dedupe_by_id(specs: Vec<SubTaskSpec>) -> Vec<SubTaskSpec> {
    let mut seen = HashSet::new();
    specs
        .into_iter()
        .filter(|s| seen.insert(s.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_json_array() {
        let text = "Here is the plan:\n```json\n[{\"id\":\"1\",\"content\":\"do a\"},{\"id\":\"2\",\"content\":\"do b\",\"assigned_role\":\"search_agent\"}]\n```";
        let parsed = parse_sub_tasks(text);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].assigned_role.as_deref(), Some("search_agent"));
    }

    #[test]
    fn tolerates_trailing_commas() {
        let text = r#"[{"id":"1","content":"a",},{"id":"2","content":"b",},]"#;
        let parsed = parse_sub_tasks(text);
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn falls_back_to_bullet_list() {
        let text = "- Research the topic\n- Write the report\nok";
        let parsed = parse_sub_tasks(text);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].content, "Research the topic");
    }

    #[test]
    fn falls_back_to_single_catch_all_node() {
        let parsed = parse_sub_tasks("uh");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].content, FALLBACK_CONTENT);
    }

    #[test]
    fn dedupes_by_id_keeping_first() {
        let text = r#"[{"id":"1","content":"first"},{"id":"1","content":"duplicate"}]"#;
        let parsed = parse_sub_tasks(text);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].content, "first");
    }

    #[test]
    fn empty_text_yields_empty_vec() {
        assert!(parse_sub_tasks("   ").is_empty());
    }
}
