//! Filename humanization for the skill repair pass (§4.6). One unified known-acronym set
//! {AI, ML, NLP, RAG, PDF, DOCX} — the upstream module used two slightly different acronym
//! sets between `humanize_filename` and `suggest_filename`; this port uses one (DESIGN.md).

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

const ACRONYMS: &[&str] = &["ai", "ml", "nlp", "rag", "pdf", "docx"];
const STOPWORDS: &[&str] = &["a", "an", "and", "the", "to", "for", "of", "on", "in", "with", "from", "by"];

static EXPLICIT_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([A-Za-z0-9 _.-]+\.[A-Za-z0-9]{1,8})"#).unwrap());
static LOWER_UPPER_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z][A-Z]").unwrap());
static WORD_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9]+").unwrap());

/// Filenames the user wrote out explicitly in their question, quoted or not — these are never
/// renamed regardless of their style.
pub fn extract_explicit_filenames(question: &str) -> HashSet<String> {
    EXPLICIT_FILENAME
        .find_iter(question)
        .map(|m| {
            let raw = m.as_str().trim().trim_matches(|c| c == '"' || c == '`');
            Path::new(raw)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| raw.to_string())
        })
        .collect()
}

pub fn is_machine_style_filename(filename: &str) -> bool {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    if stem.is_empty() {
        return false;
    }
    stem.contains('_') || LOWER_UPPER_BOUNDARY.is_match(&stem)
}

/// `snake_case`/`kebab-case`/`camelCase` → `Title Case`, uppercasing the known acronym set.
pub fn humanize_filename(filename: &str) -> String {
    let path = Path::new(filename);
    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    if stem.is_empty() {
        return filename.to_string();
    }

    let normalized = stem.replace(['_', '-'], " ");
    let normalized: String = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    let normalized = if normalized.is_empty() { "Output".to_string() } else { normalized };

    let words: Vec<String> = normalized
        .split(' ')
        .map(|token| {
            if token.chars().all(|c| c.is_uppercase()) && token.chars().count() <= 5 {
                token.to_string()
            } else if ACRONYMS.contains(&token.to_lowercase().as_str()) {
                token.to_uppercase()
            } else {
                capitalize(token)
            }
        })
        .collect();
    format!("{}{extension}", words.join(" "))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Builds a fresh filename from the user's question for a synthesized artifact.
pub fn suggest_filename(question: &str, extension: &str, fallback_stem: &str) -> String {
    let extension = if extension.starts_with('.') {
        extension.to_string()
    } else {
        format!(".{extension}")
    };

    let tokens: Vec<String> = WORD_TOKEN
        .find_iter(question)
        .map(|m| m.as_str().to_string())
        .filter(|t| !STOPWORDS.contains(&t.to_lowercase().as_str()))
        .take(6)
        .collect();
    let stem_tokens = if tokens.is_empty() {
        vec![fallback_stem.to_string()]
    } else {
        tokens
    };
    let stem = stem_tokens
        .iter()
        .map(|token| {
            if ACRONYMS.contains(&token.to_lowercase().as_str()) {
                token.to_uppercase()
            } else {
                capitalize(token)
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    format!("{stem}{extension}")
}

/// Renames `filename` only if it is machine-style and not one the user wrote explicitly.
pub fn normalize_filename_for_output(filename: &str, explicit_names: &HashSet<String>) -> String {
    if filename.is_empty() {
        return filename.to_string();
    }
    let name_only = Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| filename.to_string());
    if explicit_names.contains(&name_only) || !is_machine_style_filename(&name_only) {
        return name_only;
    }
    humanize_filename(&name_only)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_machine_style_by_underscore_or_case_boundary() {
        assert!(is_machine_style_filename("market_report.md"));
        assert!(is_machine_style_filename("marketReport.md"));
        assert!(!is_machine_style_filename("Market Report.md"));
    }

    #[test]
    fn humanizes_snake_case_and_uppercases_known_acronyms() {
        assert_eq!(humanize_filename("rag_pipeline_notes.md"), "RAG Pipeline Notes.md");
        assert_eq!(humanize_filename("ai_summary.pdf"), "AI Summary.pdf");
    }

    #[test]
    fn extracts_explicit_filenames_from_question() {
        let found = extract_explicit_filenames("please save it as \"final-report.docx\" today");
        assert!(found.contains("final-report.docx"));
    }

    #[test]
    fn normalize_skips_explicit_names() {
        let mut explicit = HashSet::new();
        explicit.insert("weird_name.md".to_string());
        assert_eq!(normalize_filename_for_output("weird_name.md", &explicit), "weird_name.md");
    }

    #[test]
    fn suggest_filename_drops_stopwords_and_caps_at_six_tokens() {
        let name = suggest_filename("write a report about the new RAG pipeline architecture design", "md", "Output");
        assert!(name.ends_with(".md"));
        assert!(name.contains("RAG") || name.contains("Rag"));
    }
}
