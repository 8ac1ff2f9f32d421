//! Bounded repair pass run once after a failed validation (§4.6). Discovers artifacts the
//! transcript didn't already surface, renames machine-style filenames, and synthesizes a missing
//! markdown deliverable, before the caller re-validates exactly once.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use super::filenames::{normalize_filename_for_output, suggest_filename};
use super::schema::RuntimeSkill;

const DENYLISTED_SEGMENTS: &[&str] = &[".initial_env", ".venv", "venv", "site-packages", "__pycache__", ".git", "node_modules"];
const DENYLISTED_BASENAMES: &[&str] =
    &["top_level.txt", "entry_points.txt", "dependency_links.txt", "sources.txt", "api_tests.txt"];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RepairAction {
    Created,
    Modified,
}

#[derive(Clone, Debug)]
pub struct RepairedArtifact {
    pub path: PathBuf,
    pub name: String,
    pub action: RepairAction,
}

/// Walks `workdir` for files matching the skill's allowed extensions, ignoring denylisted
/// segments/basenames — used to find artifacts the event-driven detector missed.
pub fn discover_artifacts(workdir: &Path, allowed_extensions: &[String]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for entry in walkdir::WalkDir::new(workdir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if is_denylisted(path) {
            continue;
        }
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        if allowed_extensions.is_empty() || allowed_extensions.iter().any(|a| a.to_lowercase() == ext) {
            found.push(path.to_path_buf());
        }
    }
    found
}

fn is_denylisted(path: &Path) -> bool {
    let segment_hit = path.components().any(|c| {
        let s = c.as_os_str().to_string_lossy();
        DENYLISTED_SEGMENTS.contains(&s.as_ref()) || s.ends_with(".dist-info")
    });
    let basename_hit = path
        .file_name()
        .map(|n| DENYLISTED_BASENAMES.contains(&n.to_string_lossy().as_ref()))
        .unwrap_or(false);
    segment_hit || basename_hit
}

/// Renames `path` to a human-readable form in place if it is machine-style and not one the
/// user named explicitly. Returns `None` if no rename was needed or the target already exists.
pub fn rename_if_machine_style(path: &Path, explicit_names: &HashSet<String>) -> Option<RepairedArtifact> {
    let name = path.file_name()?.to_string_lossy().to_string();
    let humanized = normalize_filename_for_output(&name, explicit_names);
    if humanized == name {
        return None;
    }
    let target = path.with_file_name(&humanized);
    if target.exists() {
        return None;
    }
    std::fs::rename(path, &target).ok()?;
    Some(RepairedArtifact {
        path: target,
        name: humanized,
        action: RepairAction::Modified,
    })
}

/// Synthesizes `<Suggested Title>.md` from the accumulated transcript when the markdown
/// contract is unmet.
pub fn synthesize_markdown(
    workdir: &Path,
    question: &str,
    transcript: &str,
) -> std::io::Result<RepairedArtifact> {
    let filename = suggest_filename(question, "md", "Output");
    let path = workdir.join(&filename);
    std::fs::write(&path, transcript)?;
    Ok(RepairedArtifact {
        path,
        name: filename,
        action: RepairAction::Created,
    })
}

/// Runs the full repair sequence for one skill and returns every artifact it touched, each
/// tagged `created` or `modified` — only `created` artifacts are re-persisted to Core
/// (§4.6 "avoid duplicate rows for the same underlying file").
pub fn repair(
    skill: &RuntimeSkill,
    workdir: &Path,
    question: &str,
    transcript: &str,
    known_artifacts: &[Value],
    explicit_names: &HashSet<String>,
    needs_markdown: bool,
) -> Vec<RepairedArtifact> {
    let mut repaired = Vec::new();
    let known_paths: HashSet<PathBuf> = known_artifacts
        .iter()
        .filter_map(|a| a.get("path").and_then(Value::as_str).map(PathBuf::from))
        .collect();

    for discovered in discover_artifacts(workdir, &skill.output_contract.allowed_extensions) {
        if known_paths.contains(&discovered) {
            continue;
        }
        let name = discovered.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        repaired.push(RepairedArtifact {
            path: discovered,
            name,
            action: RepairAction::Created,
        });
    }

    for artifact in known_artifacts {
        if let Some(path) = artifact.get("path").and_then(Value::as_str) {
            if let Some(renamed) = rename_if_machine_style(Path::new(path), explicit_names) {
                repaired.push(renamed);
            }
        }
    }

    if needs_markdown {
        if let Ok(synthesized) = synthesize_markdown(workdir, question, transcript) {
            repaired.push(synthesized);
        }
    }

    repaired
}

pub fn artifact_event_payload(artifact: &RepairedArtifact) -> Value {
    json!({
        "name": artifact.name,
        "path": artifact.path.to_string_lossy(),
        "action": match artifact.action {
            RepairAction::Created => "created",
            RepairAction::Modified => "modified",
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_artifacts_skips_denylisted_segments() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("node_modules")).unwrap();
        std::fs::write(tmp.path().join("node_modules/x.md"), "x").unwrap();
        std::fs::write(tmp.path().join("report.md"), "y").unwrap();
        let found = discover_artifacts(tmp.path(), &[".md".to_string()]);
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("report.md"));
    }

    #[test]
    fn rename_if_machine_style_renames_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("final_report.md");
        std::fs::write(&path, "content").unwrap();
        let renamed = rename_if_machine_style(&path, &HashSet::new()).unwrap();
        assert_eq!(renamed.name, "Final Report.md");
        assert!(renamed.path.exists());
        assert!(!path.exists());
    }

    #[test]
    fn rename_skips_explicit_names() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("final_report.md");
        std::fs::write(&path, "content").unwrap();
        let mut explicit = HashSet::new();
        explicit.insert("final_report.md".to_string());
        assert!(rename_if_machine_style(&path, &explicit).is_none());
    }

    #[test]
    fn synthesize_markdown_writes_file_and_tags_created() {
        let tmp = tempfile::tempdir().unwrap();
        let artifact = synthesize_markdown(tmp.path(), "write a RAG overview", "body text").unwrap();
        assert_eq!(artifact.action, RepairAction::Created);
        assert!(artifact.path.exists());
    }
}
