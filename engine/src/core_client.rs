//! Thin client for the surrounding Core service (§4.9, §6): provider configs, chat history
//! persistence, memory summaries/notes, per-project config, and MCP user lookups. Every call is
//! fail-soft — callers treat an error as "nothing available" rather than aborting the turn.

use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

const CORE_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum CoreClientError {
    #[error("core service url not configured")]
    NotConfigured,
    #[error("core http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("core returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Clone)]
pub struct CoreClient {
    base_url: String,
    internal_key: Option<String>,
    http: reqwest::Client,
}

impl CoreClient {
    pub fn new(base_url: impl Into<String>, internal_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            internal_key,
            http: reqwest::Client::builder()
                .timeout(CORE_HTTP_TIMEOUT)
                .build()
                .expect("reqwest client builder"),
        }
    }

    pub fn from_settings(base_url: Option<String>, internal_key: Option<String>) -> Option<Self> {
        base_url.map(|url| Self::new(url, internal_key))
    }

    fn request(&self, method: reqwest::Method, path: &str, auth_token: Option<&str>) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.base_url.trim_end_matches('/'));
        let mut builder = self.http.request(method, url);
        if let Some(token) = auth_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(key) = &self.internal_key {
            builder = builder.header("X-Internal-Key", key);
        }
        builder
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        auth_token: Option<&str>,
    ) -> Result<T, CoreClientError> {
        let resp = self.request(reqwest::Method::GET, path, auth_token).send().await?;
        read_json(resp).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        auth_token: Option<&str>,
        body: &B,
    ) -> Result<T, CoreClientError> {
        let resp = self
            .request(reqwest::Method::POST, path, auth_token)
            .json(body)
            .send()
            .await?;
        read_json(resp).await
    }

    async fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        auth_token: Option<&str>,
        body: &B,
    ) -> Result<T, CoreClientError> {
        let resp = self
            .request(reqwest::Method::PUT, path, auth_token)
            .json(body)
            .send()
            .await?;
        read_json(resp).await
    }

    /// GET `/providers/internal` — the provider configs available to this user.
    pub async fn providers(&self, auth_token: &str) -> Result<Vec<Value>, CoreClientError> {
        self.get_json("/providers/internal", Some(auth_token)).await
    }

    /// GET `/provider/internal/{id}` — a single provider config by id.
    pub async fn provider(&self, auth_token: &str, provider_id: &str) -> Result<Value, CoreClientError> {
        let path = format!("/provider/internal/{provider_id}");
        self.get_json(&path, Some(auth_token)).await
    }

    /// GET `/auth/me` — validates `auth_token` and returns the caller's identity. Used by the
    /// HTTP layer's auth middleware; a non-success response means the token is rejected.
    pub async fn auth_me(&self, auth_token: &str) -> Result<Value, CoreClientError> {
        self.get_json("/auth/me", Some(auth_token)).await
    }

    /// POST `/chat/history` — creates a turn's chat history row, returning its id so the
    /// terminal status update can target it with `put_chat_history` instead of creating a
    /// second row.
    pub async fn post_chat_history(&self, auth_token: &str, entry: &Value) -> Result<Option<String>, CoreClientError> {
        let created: Value = self.post_json("/chat/history", Some(auth_token), entry).await?;
        Ok(created.get("id").and_then(|v| v.as_str()).map(str::to_string))
    }

    /// PUT `/chat/history/{id}` — idempotent update of a turn's history row (status, tokens).
    pub async fn put_chat_history(&self, auth_token: &str, id: &str, update: &Value) -> Result<(), CoreClientError> {
        let path = format!("/chat/history/{id}");
        let _: Value = self.put_json(&path, Some(auth_token), update).await?;
        Ok(())
    }

    /// POST `/chat/steps` — appends a single step event for durable replay.
    pub async fn post_chat_step(&self, auth_token: &str, step: &Value) -> Result<(), CoreClientError> {
        let _: Value = self.post_json("/chat/steps", Some(auth_token), step).await?;
        Ok(())
    }

    /// POST `/chat/artifacts` — records a detected artifact against the task.
    pub async fn post_chat_artifact(&self, auth_token: &str, artifact: &Value) -> Result<(), CoreClientError> {
        let _: Value = self
            .post_json("/chat/artifacts", Some(auth_token), artifact)
            .await?;
        Ok(())
    }

    /// GET `/memory/thread-summary?project_id=`
    pub async fn thread_summary(
        &self,
        auth_token: &str,
        project_id: &str,
    ) -> Result<Option<String>, CoreClientError> {
        let path = format!("/memory/thread-summary?project_id={project_id}");
        let value: Value = self.get_json(&path, Some(auth_token)).await?;
        Ok(value.get("summary").and_then(|v| v.as_str()).map(str::to_string))
    }

    /// GET `/memory/task-summary?task_id=`
    pub async fn task_summary(&self, auth_token: &str, task_id: &str) -> Result<Option<String>, CoreClientError> {
        let path = format!("/memory/task-summary?task_id={task_id}");
        let value: Value = self.get_json(&path, Some(auth_token)).await?;
        Ok(value.get("summary").and_then(|v| v.as_str()).map(str::to_string))
    }

    /// GET `/memory/notes?project_id=`
    pub async fn memory_notes(&self, auth_token: &str, project_id: &str) -> Result<Vec<String>, CoreClientError> {
        let path = format!("/memory/notes?project_id={project_id}");
        let value: Value = self.get_json(&path, Some(auth_token)).await?;
        Ok(value
            .get("notes")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|n| n.as_str().map(str::to_string)).collect())
            .unwrap_or_default())
    }

    /// POST `/memory/notes` — appends an extracted note (background, best-effort).
    pub async fn post_memory_note(&self, auth_token: &str, note: &Value) -> Result<(), CoreClientError> {
        let _: Value = self.post_json("/memory/notes", Some(auth_token), note).await?;
        Ok(())
    }

    /// GET `/configs?project_id=` — per-project runtime configuration overrides.
    pub async fn configs(&self, auth_token: &str, project_id: &str) -> Result<Value, CoreClientError> {
        let path = format!("/configs?project_id={project_id}");
        self.get_json(&path, Some(auth_token)).await
    }

    /// GET `/mcp/users/{user_id}` — MCP connection credentials for a user.
    pub async fn mcp_user(&self, auth_token: &str, user_id: &str) -> Result<Value, CoreClientError> {
        let path = format!("/mcp/users/{user_id}");
        self.get_json(&path, Some(auth_token)).await
    }
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, CoreClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(CoreClientError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp.json::<T>().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_settings_none_when_url_missing() {
        assert!(CoreClient::from_settings(None, None).is_none());
    }

    #[test]
    fn from_settings_some_when_url_present() {
        assert!(CoreClient::from_settings(Some("https://core.internal".into()), None).is_some());
    }
}
