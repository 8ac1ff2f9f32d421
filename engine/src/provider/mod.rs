//! Provider-name normalization and dialect dispatch for LLM streaming (§3 Provider Config, §4.3).
//!
//! A `ProviderConfig` is dialect-agnostic; [`Provider::dispatch`] picks one of the four wire
//! dialects based on the normalized provider name and whether the caller asked for native
//! OpenAI Responses tool use. All four dialects present the same `stream_chat` contract: a lazy,
//! finite stream of [`ChatChunk`]s, with non-streaming dialects (Gemini, OpenAI Responses)
//! yielding exactly one item.

mod dialects;
mod normalize;
mod sse;

pub use dialects::stream_chat;
pub use normalize::normalize_provider_name;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Every provider HTTP call is bounded at this timeout (§4.3, §5).
pub const PROVIDER_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider '{0}' requires an explicit endpoint_url")]
    EndpointRequired(String),
    #[error("unexpected provider response shape: {0}")]
    MalformedResponse(String),
}

/// A normalized, dialect-agnostic provider configuration (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub provider_name: String,
    pub model_type: String,
    pub api_key: String,
    pub endpoint_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub extra_params: Value,
}

/// Default sampling temperature for a turn's completions when Core doesn't supply one.
pub fn default_temperature() -> f32 {
    0.7
}

/// The sealed dialect variant (§9's explicit redesign of "provider dialects").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAiCompat,
    Anthropic,
    Gemini,
    OpenAiResponses,
}

impl Provider {
    /// Dispatches on the normalized provider name, with OpenAI Responses taking priority when
    /// `extra_params.tools` requests native `web_search` (§4.3 "OpenAI Responses API").
    pub fn dispatch(normalized_name: &str, extra_params: &Value) -> Self {
        if wants_openai_responses(extra_params) {
            return Provider::OpenAiResponses;
        }
        match normalized_name {
            "anthropic" => Provider::Anthropic,
            "gemini" => Provider::Gemini,
            _ => Provider::OpenAiCompat,
        }
    }
}

fn wants_openai_responses(extra_params: &Value) -> bool {
    extra_params
        .get("tools")
        .and_then(Value::as_array)
        .map(|tools| {
            tools
                .iter()
                .any(|t| t.get("type").and_then(Value::as_str) == Some("web_search"))
        })
        .unwrap_or(false)
}

/// Provider names that must not silently fall back to a default base URL (§4.3).
const REQUIRES_EXPLICIT_ENDPOINT: &[&str] = &["openai-compatible", "openai-compatible-custom"];

pub fn requires_explicit_endpoint(normalized_name: &str) -> bool {
    REQUIRES_EXPLICIT_ENDPOINT.contains(&normalized_name)
}

/// A single streamed piece of a chat completion: either a text delta, a terminal usage record,
/// or both (some dialects attach usage to the final content-bearing event).
#[derive(Clone, Debug, Default)]
pub struct ChatChunk {
    pub text: Option<String>,
    pub usage: Option<ChatUsage>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Merges `extra_params` object keys into `body`, skipping any key in `protected` (§4.3
/// "Protected payload keys").
pub fn merge_extra_params(
    body: &mut serde_json::Map<String, Value>,
    extra_params: &Value,
    protected: &[&str],
) {
    if let Some(obj) = extra_params.as_object() {
        for (key, value) in obj {
            if protected.contains(&key.as_str()) {
                continue;
            }
            body.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dispatch_picks_anthropic_and_gemini_by_name() {
        assert_eq!(Provider::dispatch("anthropic", &Value::Null), Provider::Anthropic);
        assert_eq!(Provider::dispatch("gemini", &Value::Null), Provider::Gemini);
        assert_eq!(Provider::dispatch("openai", &Value::Null), Provider::OpenAiCompat);
    }

    #[test]
    fn dispatch_prefers_openai_responses_when_web_search_tool_present() {
        let extra = json!({"tools": [{"type": "web_search"}]});
        assert_eq!(Provider::dispatch("openai", &extra), Provider::OpenAiResponses);
    }

    #[test]
    fn merge_extra_params_skips_protected_keys() {
        let mut body = serde_json::Map::new();
        body.insert("model".to_string(), json!("gpt-4o"));
        let extra = json!({"model": "should-not-win", "temperature": 0.2});
        merge_extra_params(&mut body, &extra, &["model"]);
        assert_eq!(body.get("model"), Some(&json!("gpt-4o")));
        assert_eq!(body.get("temperature"), Some(&json!(0.2)));
    }
}
