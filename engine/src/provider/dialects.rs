//! The four wire dialects dispatched by [`super::Provider`] (§4.3).

use super::sse::forward_sse_lines;
use super::{
    merge_extra_params, normalize_provider_name, requires_explicit_endpoint, ChatChunk, ChatUsage,
    Provider, ProviderConfig, ProviderError, PROVIDER_HTTP_TIMEOUT,
};
use futures_util::Stream;
use reqwest::Client;
use serde_json::{json, Value};
use std::pin::Pin;
use tokio_stream::wrappers::UnboundedReceiverStream;

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, ProviderError>> + Send>>;

fn http_client() -> Client {
    Client::builder()
        .timeout(PROVIDER_HTTP_TIMEOUT)
        .build()
        .expect("static reqwest client config is always valid")
}

/// Dispatches `config` to its dialect and returns the resulting chat stream (§4.3).
pub fn stream_chat(config: ProviderConfig, messages: Vec<Value>) -> Result<ChatStream, ProviderError> {
    let normalized = normalize_provider_name(&config.provider_name);
    match Provider::dispatch(&normalized, &config.extra_params) {
        Provider::OpenAiCompat => openai_compat_stream(config, normalized, messages),
        Provider::Anthropic => anthropic_stream(config, messages),
        Provider::Gemini => Ok(single_shot_stream(gemini_request(config, messages))),
        Provider::OpenAiResponses => Ok(single_shot_stream(openai_responses_request(config, messages))),
    }
}

fn resolve_base_url(config: &ProviderConfig, normalized: &str) -> Result<String, ProviderError> {
    if let Some(url) = &config.endpoint_url {
        return Ok(url.trim_end_matches('/').to_string());
    }
    if requires_explicit_endpoint(normalized) {
        return Err(ProviderError::EndpointRequired(normalized.to_string()));
    }
    Ok(default_base_url(normalized))
}

fn default_base_url(normalized: &str) -> String {
    match normalized {
        "anthropic" => "https://api.anthropic.com".to_string(),
        "gemini" => "https://generativelanguage.googleapis.com/v1beta".to_string(),
        _ => "https://api.openai.com/v1".to_string(),
    }
}

// ---- OpenAI-compatible --------------------------------------------------------------------

const OPENAI_COMPAT_PROTECTED: &[&str] = &["model", "messages", "temperature", "stream", "stream_options"];

fn openai_compat_stream(
    config: ProviderConfig,
    normalized: String,
    messages: Vec<Value>,
) -> Result<ChatStream, ProviderError> {
    let base = resolve_base_url(&config, &normalized)?;
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(async move {
        let client = http_client();
        let url = format!("{base}/chat/completions");

        let mut body = build_openai_compat_body(&config, &messages, true);
        let mut response = match client
            .post(&url)
            .bearer_auth(&config.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                let _ = tx.send(Err(ProviderError::Http(e)));
                return;
            }
        };

        if response.status().is_client_error() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if status.as_u16() == 400
                && (text.contains("stream_options") || text.contains("include_usage"))
            {
                body = build_openai_compat_body(&config, &messages, false);
                response = match client.post(&url).bearer_auth(&config.api_key).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::Http(e)));
                        return;
                    }
                };
            } else {
                let _ = tx.send(Err(ProviderError::MalformedResponse(format!(
                    "{status}: {text}"
                ))));
                return;
            }
        }

        let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel();
        forward_sse_lines(response.bytes_stream(), line_tx).await;
        while let Some(line) = line_rx.recv().await {
            match line {
                Ok(raw) => {
                    if let Ok(value) = serde_json::from_str::<Value>(&raw) {
                        let chunk = ChatChunk {
                            text: extract_openai_delta_text(&value),
                            usage: extract_openai_usage(&value),
                        };
                        if chunk.text.is_some() || chunk.usage.is_some() {
                            let _ = tx.send(Ok(chunk));
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e));
                }
            }
        }
    });

    Ok(Box::pin(UnboundedReceiverStream::new(rx)))
}

fn build_openai_compat_body(config: &ProviderConfig, messages: &[Value], include_usage: bool) -> Value {
    let mut body = serde_json::Map::new();
    body.insert("model".into(), json!(config.model_type));
    body.insert("messages".into(), json!(messages));
    body.insert("temperature".into(), json!(config.temperature));
    body.insert("stream".into(), json!(true));
    if include_usage {
        body.insert("stream_options".into(), json!({"include_usage": true}));
    }
    merge_extra_params(&mut body, &config.extra_params, OPENAI_COMPAT_PROTECTED);
    Value::Object(body)
}

/// First match wins: `choices[0].delta.content`, then `.text`, then `.message.content`.
fn extract_openai_delta_text(value: &Value) -> Option<String> {
    let choice = value.get("choices")?.as_array()?.first()?;
    choice
        .get("delta")
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
        .or_else(|| choice.get("text").and_then(Value::as_str))
        .or_else(|| {
            choice
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(Value::as_str)
        })
        .map(str::to_string)
}

fn extract_openai_usage(value: &Value) -> Option<ChatUsage> {
    let usage = value.get("usage")?;
    Some(ChatUsage {
        prompt_tokens: usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
        completion_tokens: usage.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0),
        total_tokens: usage.get("total_tokens").and_then(Value::as_u64).unwrap_or(0),
    })
}

// ---- Anthropic -----------------------------------------------------------------------------

fn anthropic_stream(config: ProviderConfig, messages: Vec<Value>) -> Result<ChatStream, ProviderError> {
    let base = resolve_base_url(&config, "anthropic")?;
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(async move {
        let client = http_client();
        let url = format!("{base}/v1/messages");
        let mut body = serde_json::Map::new();
        body.insert("model".into(), json!(config.model_type));
        body.insert("messages".into(), json!(messages));
        body.insert("temperature".into(), json!(config.temperature));
        body.insert("stream".into(), json!(true));
        body.insert("max_tokens".into(), json!(4096));
        merge_extra_params(
            &mut body,
            &config.extra_params,
            &["model", "messages", "temperature", "stream"],
        );

        let response = match client
            .post(&url)
            .header("x-api-key", &config.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&Value::Object(body))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                let _ = tx.send(Err(ProviderError::Http(e)));
                return;
            }
        };

        let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel();
        forward_sse_lines(response.bytes_stream(), line_tx).await;
        let mut prompt_tokens = 0u64;
        while let Some(line) = line_rx.recv().await {
            let raw = match line {
                Ok(raw) => raw,
                Err(e) => {
                    let _ = tx.send(Err(e));
                    continue;
                }
            };
            let Ok(event) = serde_json::from_str::<Value>(&raw) else {
                continue;
            };
            match event.get("type").and_then(Value::as_str) {
                Some("message_start") => {
                    prompt_tokens = event
                        .pointer("/message/usage/input_tokens")
                        .and_then(Value::as_u64)
                        .unwrap_or(0);
                }
                Some("content_block_delta") => {
                    if let Some(text) = event.pointer("/delta/text").and_then(Value::as_str) {
                        let _ = tx.send(Ok(ChatChunk {
                            text: Some(text.to_string()),
                            usage: None,
                        }));
                    }
                }
                Some("message_delta") => {
                    let completion_tokens = event
                        .pointer("/usage/output_tokens")
                        .and_then(Value::as_u64)
                        .unwrap_or(0);
                    let _ = tx.send(Ok(ChatChunk {
                        text: None,
                        usage: Some(ChatUsage {
                            prompt_tokens,
                            completion_tokens,
                            total_tokens: prompt_tokens + completion_tokens,
                        }),
                    }));
                }
                _ => {}
            }
        }
    });

    Ok(Box::pin(UnboundedReceiverStream::new(rx)))
}

// ---- Gemini (non-streaming) ----------------------------------------------------------------

async fn gemini_request(config: ProviderConfig, messages: Vec<Value>) -> Result<ChatChunk, ProviderError> {
    let base = resolve_base_url(&config, "gemini")?;
    let url = format!(
        "{base}/models/{model}:generateContent?key={key}",
        model = config.model_type,
        key = config.api_key
    );
    let contents = messages_to_gemini_contents(&messages);
    let mut body = serde_json::Map::new();
    body.insert("contents".into(), json!(contents));
    body.insert(
        "generationConfig".into(),
        json!({"temperature": config.temperature}),
    );
    merge_extra_params(&mut body, &config.extra_params, &["contents", "generationConfig"]);

    let response = http_client()
        .post(&url)
        .json(&Value::Object(body))
        .send()
        .await?;
    let value: Value = response.json().await?;

    let text = value
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(str::to_string);
    let usage = value.get("usageMetadata").map(|u| ChatUsage {
        prompt_tokens: u.get("promptTokenCount").and_then(Value::as_u64).unwrap_or(0),
        completion_tokens: u.get("candidatesTokenCount").and_then(Value::as_u64).unwrap_or(0),
        total_tokens: u.get("totalTokenCount").and_then(Value::as_u64).unwrap_or(0),
    });
    Ok(ChatChunk { text, usage })
}

fn messages_to_gemini_contents(messages: &[Value]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let role = match m.get("role").and_then(Value::as_str) {
                Some("assistant") => "model",
                _ => "user",
            };
            json!({
                "role": role,
                "parts": [{"text": m.get("content").and_then(Value::as_str).unwrap_or("")}],
            })
        })
        .collect()
}

// ---- OpenAI Responses API (non-streaming, native web_search) ------------------------------

async fn openai_responses_request(
    config: ProviderConfig,
    messages: Vec<Value>,
) -> Result<ChatChunk, ProviderError> {
    let base = resolve_base_url(&config, "openai")?;
    let url = format!("{base}/responses");
    let input = messages
        .last()
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mut body = serde_json::Map::new();
    body.insert("model".into(), json!(config.model_type));
    body.insert("input".into(), json!(input));
    body.insert("temperature".into(), json!(config.temperature));
    body.insert("tool_choice".into(), json!("auto"));
    merge_extra_params(
        &mut body,
        &config.extra_params,
        &["model", "input", "temperature"],
    );

    let response = http_client()
        .post(&url)
        .bearer_auth(&config.api_key)
        .json(&Value::Object(body))
        .send()
        .await?;
    let value: Value = response.json().await?;
    Ok(ChatChunk {
        text: extract_responses_text(&value),
        usage: None,
    })
}

fn extract_responses_text(value: &Value) -> Option<String> {
    if let Some(text) = value.get("output_text").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    value.get("output")?.as_array()?.iter().find_map(|item| {
        if item.get("type").and_then(Value::as_str) != Some("message") {
            return None;
        }
        item.get("content")?
            .as_array()?
            .iter()
            .find_map(|c| c.get("text").and_then(Value::as_str))
            .map(str::to_string)
    })
}

fn single_shot_stream(
    fut: impl std::future::Future<Output = Result<ChatChunk, ProviderError>> + Send + 'static,
) -> ChatStream {
    Box::pin(futures_util::stream::once(fut))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_openai_delta_text_prefers_delta_content() {
        let v = json!({"choices": [{"delta": {"content": "hi"}, "text": "ignored"}]});
        assert_eq!(extract_openai_delta_text(&v), Some("hi".to_string()));
    }

    #[test]
    fn extract_openai_delta_text_falls_back_to_message_content() {
        let v = json!({"choices": [{"message": {"content": "final"}}]});
        assert_eq!(extract_openai_delta_text(&v), Some("final".to_string()));
    }

    #[test]
    fn extract_openai_usage_reads_totals() {
        let v = json!({"usage": {"prompt_tokens": 3, "completion_tokens": 5, "total_tokens": 8}});
        let usage = extract_openai_usage(&v).unwrap();
        assert_eq!(usage.total_tokens, 8);
    }

    #[test]
    fn messages_to_gemini_contents_maps_assistant_to_model_role() {
        let msgs = vec![json!({"role": "assistant", "content": "hi"})];
        let contents = messages_to_gemini_contents(&msgs);
        assert_eq!(contents[0]["role"], "model");
    }

    #[test]
    fn extract_responses_text_prefers_output_text() {
        let v = json!({"output_text": "direct"});
        assert_eq!(extract_responses_text(&v), Some("direct".to_string()));
    }

    #[test]
    fn extract_responses_text_falls_back_to_output_message_content() {
        let v = json!({"output": [{"type": "message", "content": [{"text": "nested"}]}]});
        assert_eq!(extract_responses_text(&v), Some("nested".to_string()));
    }

    #[test]
    fn resolve_base_url_requires_explicit_endpoint_for_generic_compat() {
        let config = ProviderConfig {
            id: "p1".into(),
            provider_name: "openai-compatible".into(),
            model_type: "m".into(),
            api_key: "k".into(),
            endpoint_url: None,
            temperature: super::default_temperature(),
            extra_params: Value::Null,
        };
        let err = resolve_base_url(&config, "openai-compatible").unwrap_err();
        assert!(matches!(err, ProviderError::EndpointRequired(_)));
    }
}
