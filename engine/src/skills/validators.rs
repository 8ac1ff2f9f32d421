//! Output-contract validation (§4.6). Runs once after a turn's final text is known; if it fails,
//! the repair pass (`repair.rs`) gets one bounded attempt before the turn is failed outright.

use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::filenames::is_machine_style_filename;
use super::schema::RuntimeSkill;

static URL_CITATION: Lazy<Regex> = Lazy::new(|| Regex::new(r#"https?://[^\s\])>"']+"#).unwrap());
static BRACKET_CITATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[Source:\s*([^\]]+)\]").unwrap());

/// De-duplicated (case-insensitive) citations found in `text`: bare URLs and `[Source: ...]`
/// references.
pub fn extract_citations(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let urls = URL_CITATION.find_iter(text).map(|m| m.as_str().to_string());
    let bracketed = BRACKET_CITATION.captures_iter(text).map(|c| c[1].trim().to_string());
    for item in urls.chain(bracketed) {
        let key = item.to_lowercase();
        if seen.insert(key) {
            out.push(item);
        }
    }
    out
}

#[derive(Clone, Debug, Serialize)]
pub struct ValidationIssue {
    pub code: String,
    pub message: String,
    pub severity: Severity,
    pub skill_id: String,
    #[serde(default)]
    pub details: Value,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Clone, Debug, Serialize)]
pub struct SkillValidationResult {
    pub success: bool,
    pub issues: Vec<ValidationIssue>,
    pub score: f64,
    pub matched_artifacts: Vec<Value>,
}

fn artifact_extension(artifact: &Value) -> String {
    let name = artifact
        .get("name")
        .or_else(|| artifact.get("path"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    Path::new(name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

fn matches_output_contract(skill: &RuntimeSkill, artifact: &Value) -> bool {
    let allowed = &skill.output_contract.allowed_extensions;
    if allowed.is_empty() {
        return true;
    }
    let ext = artifact_extension(artifact);
    allowed.iter().any(|a| a.to_lowercase() == ext)
}

/// Validates `artifacts`/`transcript` against every rule the skill declares (§4.6 "Validation").
pub fn validate_skill_contract(
    skill: &RuntimeSkill,
    artifacts: &[Value],
    transcript: &str,
    explicit_filenames: &HashSet<String>,
) -> SkillValidationResult {
    let mut issues = Vec::new();
    let matched_artifacts: Vec<Value> = artifacts
        .iter()
        .filter(|a| matches_output_contract(skill, a))
        .cloned()
        .collect();

    if skill.output_contract.required_artifact {
        let minimum = skill.output_contract.minimum_artifacts.max(1);
        if (matched_artifacts.len() as u32) < minimum {
            issues.push(ValidationIssue {
                code: "artifact_missing".to_string(),
                message: format!(
                    "Skill '{}' requires at least {minimum} artifact(s) with extensions {:?}.",
                    skill.name, skill.output_contract.allowed_extensions
                ),
                severity: Severity::Error,
                skill_id: skill.id.clone(),
                details: Value::Null,
            });
        }
    }

    for rule in &skill.validation_rules {
        match rule.as_str() {
            "require_two_citations" => {
                let citations = extract_citations(transcript);
                if citations.len() < 2 {
                    issues.push(ValidationIssue {
                        code: "citations_insufficient".to_string(),
                        message: "Research output must contain at least two citations.".to_string(),
                        severity: Severity::Error,
                        skill_id: skill.id.clone(),
                        details: serde_json::json!({"citation_count": citations.len()}),
                    });
                }
            }
            "markdown_structure" => {
                if let Some(md) = matched_artifacts.iter().find(|a| artifact_extension(a) == ".md") {
                    let content = load_artifact_content(transcript, md);
                    let has_heading = content.contains('#');
                    let has_body = content.trim().chars().count() >= 40;
                    if !(has_heading && has_body) {
                        issues.push(ValidationIssue {
                            code: "markdown_structure".to_string(),
                            message: "Markdown artifact should contain headings and substantive body content."
                                .to_string(),
                            severity: Severity::Warning,
                            skill_id: skill.id.clone(),
                            details: Value::Null,
                        });
                    }
                }
            }
            "human_readable_filename" => {
                for artifact in &matched_artifacts {
                    let name = artifact.get("name").and_then(Value::as_str).unwrap_or_default();
                    if name.is_empty() || explicit_filenames.contains(name) {
                        continue;
                    }
                    if is_machine_style_filename(name) {
                        issues.push(ValidationIssue {
                            code: "filename_style".to_string(),
                            message: format!(
                                "Artifact '{name}' is machine-style. Prefer human-readable naming unless user requested exact filename."
                            ),
                            severity: Severity::Warning,
                            skill_id: skill.id.clone(),
                            details: serde_json::json!({"artifact": name}),
                        });
                    }
                }
            }
            _ => {}
        }
    }

    let error_count = issues.iter().filter(|i| i.severity == Severity::Error).count() as f64;
    let warning_count = issues.iter().filter(|i| i.severity == Severity::Warning).count() as f64;
    let score = (100.0 - error_count * 18.0 - warning_count * 6.0).max(0.0);

    SkillValidationResult {
        success: error_count == 0.0,
        issues,
        score,
        matched_artifacts,
    }
}

fn load_artifact_content(transcript: &str, artifact: &Value) -> String {
    let Some(path) = artifact.get("path").and_then(Value::as_str) else {
        return transcript.to_string();
    };
    let p = Path::new(path);
    let is_text = matches!(p.extension().and_then(|e| e.to_str()), Some("md") | Some("txt"));
    if p.is_file() && is_text {
        std::fs::read_to_string(p).unwrap_or_else(|_| transcript.to_string())
    } else {
        transcript.to_string()
    }
}
