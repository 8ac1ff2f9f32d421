//! Provider-name normalization: lowercase, hyphenate, alias map, idempotent (§4.3).

use once_cell::sync::Lazy;
use std::collections::HashMap;

static ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("claude", "anthropic"),
        ("google", "gemini"),
        ("google-gemini", "gemini"),
        ("azure-openai", "openai"),
        ("oai-compatible", "openai-compatible"),
        ("openai-compat", "openai-compatible"),
    ])
});

/// Folds a raw provider name into its canonical key: lowercased, non-alphanumeric runs
/// collapsed to a single `-`, then passed through the alias table. Normalizing an
/// already-canonical name is a no-op (the alias table only ever maps non-canonical spellings).
pub fn normalize_provider_name(raw: &str) -> String {
    let hyphenated = hyphenate(raw);
    ALIASES
        .get(hyphenated.as_str())
        .map(|canonical| canonical.to_string())
        .unwrap_or(hyphenated)
}

fn hyphenate(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_was_dash = false;
    for c in raw.trim().to_ascii_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            prev_was_dash = false;
        } else if !prev_was_dash {
            out.push('-');
            prev_was_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_aliases_to_canonical_names() {
        assert_eq!(normalize_provider_name("Claude"), "anthropic");
        assert_eq!(normalize_provider_name("Google Gemini"), "gemini");
        assert_eq!(normalize_provider_name("azure_openai"), "openai");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["anthropic", "gemini", "openai", "openai-compatible"] {
            let once = normalize_provider_name(raw);
            let twice = normalize_provider_name(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn collapses_separator_runs_and_trims() {
        assert_eq!(normalize_provider_name("  Open__AI--Compatible  "), "open-ai-compatible");
    }
}
