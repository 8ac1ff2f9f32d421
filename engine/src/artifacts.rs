//! Detects files produced by a tool call from its result text (§4.7).
//!
//! Three pattern families are tried in priority order; family 3 only runs if 1 and 2 both find
//! nothing. Dedup state is owned by the caller's turn-scoped [`ArtifactDedupe`] — never a
//! process-wide global, per the §9 redesign of the upstream module's module-level cache.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use stream_event::ArtifactKind;

/// Tool-output messages larger than this are skipped before any pattern match (§4.7).
const MAX_SCAN_BYTES: usize = 10 * 1024;

const DENYLISTED_SEGMENTS: &[&str] = &[
    ".initial_env",
    ".venv",
    "venv",
    "site-packages",
    "__pycache__",
    ".git",
    "node_modules",
];

const DENYLISTED_BASENAMES: &[&str] = &[
    "top_level.txt",
    "entry_points.txt",
    "dependency_links.txt",
    "sources.txt",
    "api_tests.txt",
];

static FAMILY_1: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:written|saved|created)\s+to\s+file:\s*([^\n,]+)"#).unwrap()
});
static FAMILY_2: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\b(?:output|artifact|file):\s*([^\s,]+\.[A-Za-z0-9]{1,8})"#).unwrap());
static FAMILY_3: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(/[^\s,'"]+\.[A-Za-z0-9]{1,8})"#).unwrap()
});

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// A detected artifact, ready to be emitted as an `artifact` step event.
#[derive(Clone, Debug)]
pub struct DetectedArtifact {
    pub resolved_path: PathBuf,
    pub name: String,
    pub kind: ArtifactKind,
    pub content_url: String,
}

/// Turn-scoped dedup state: `(task_id, resolved_path)` pairs already emitted this turn.
#[derive(Default)]
pub struct ArtifactDedupe {
    seen: HashSet<(String, PathBuf)>,
}

impl ArtifactDedupe {
    pub fn new() -> Self {
        Self::default()
    }

    fn mark_if_new(&mut self, task_id: &str, path: &Path) -> bool {
        self.seen.insert((task_id.to_string(), path.to_path_buf()))
    }
}

/// Extracts candidate file paths from a `deactivate_toolkit` message and returns those that
/// exist, are files, and have not already been emitted this turn.
pub fn detect_artifacts(
    task_id: &str,
    project_id: Option<&str>,
    workdir: &Path,
    message: &str,
    dedupe: &mut ArtifactDedupe,
) -> Vec<DetectedArtifact> {
    if message.len() > MAX_SCAN_BYTES {
        return Vec::new();
    }

    let mut candidates = extract_candidates(message);
    if candidates.is_empty() {
        candidates = FAMILY_3
            .captures_iter(message)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect();
    }

    let mut out = Vec::new();
    for raw in candidates {
        let cleaned = clean_candidate(&raw);
        let resolved = resolve_path(workdir, &cleaned);
        if !resolved.is_file() {
            continue;
        }
        if is_denylisted(&resolved) {
            continue;
        }
        if !dedupe.mark_if_new(task_id, &resolved) {
            continue;
        }
        let name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| cleaned.clone());
        let kind = extension_kind(&resolved);
        let content_url = build_content_url(project_id, workdir, &resolved);
        out.push(DetectedArtifact {
            resolved_path: resolved,
            name,
            kind,
            content_url,
        });
    }
    out
}

fn extract_candidates(message: &str) -> Vec<String> {
    let mut found: Vec<String> = FAMILY_1
        .captures_iter(message)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect();
    if found.is_empty() {
        found = FAMILY_2
            .captures_iter(message)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect();
    }
    found
}

fn clean_candidate(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'');
    let trimmed = trimmed.trim_end_matches(|c: char| ".,;:)]}".contains(c));
    percent_decode(trimmed)
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3]) {
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).to_string()
}

fn resolve_path(workdir: &Path, candidate: &str) -> PathBuf {
    let path = Path::new(candidate);
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        workdir.join(path)
    };
    joined.canonicalize().unwrap_or(joined)
}

fn is_denylisted(path: &Path) -> bool {
    let in_denylisted_segment = path.components().any(|c| {
        let s = c.as_os_str().to_string_lossy();
        DENYLISTED_SEGMENTS.contains(&s.as_ref()) || s.ends_with(".dist-info")
    });
    let basename_denylisted = path
        .file_name()
        .map(|n| DENYLISTED_BASENAMES.contains(&n.to_string_lossy().as_ref()))
        .unwrap_or(false);
    in_denylisted_segment || basename_denylisted
}

fn extension_kind(path: &Path) -> ArtifactKind {
    path.extension()
        .map(|e| ArtifactKind::from_extension(&e.to_string_lossy()))
        .unwrap_or(ArtifactKind::File)
}

fn build_content_url(project_id: Option<&str>, workdir: &Path, resolved: &Path) -> String {
    let Some(project_id) = project_id else {
        return resolved.to_string_lossy().to_string();
    };
    let relative = resolved.strip_prefix(workdir).unwrap_or(resolved);
    let encoded = percent_encode(&relative.to_string_lossy());
    format!("/files/generated/{project_id}/download?path={encoded}")
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(b as char);
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
