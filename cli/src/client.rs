//! Thin HTTP client over the `cowork-serve` surface (§6): the CLI never touches the engine
//! directly, it talks to a running server the same way any other caller would.

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::{json, Value};
use stream_event::StepEvent;

const HTTP_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not parse step event: {0}")]
    BadEvent(#[from] serde_json::Error),
    #[error("event stream error: {0}")]
    Stream(String),
}

pub struct CoworkClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl CoworkClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token,
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
                .build()
                .expect("reqwest client builder"),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.base_url.trim_end_matches('/'));
        let mut builder = self.http.request(method, url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn post_json(&self, path: &str, body: &impl Serialize) -> Result<Value, ClientError> {
        let resp = self.request(reqwest::Method::POST, path).json(body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status { status: status.as_u16(), body: text });
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
    }

    /// `POST /chat` — streams step events until `end`, invoking `on_event` for each.
    pub async fn stream_chat(
        &self,
        project_id: &str,
        task_id: &str,
        question: &str,
        mut on_event: impl FnMut(StepEvent),
    ) -> Result<(), ClientError> {
        let body = json!({
            "project_id": project_id,
            "task_id": task_id,
            "question": question,
        });
        let resp = self.request(reqwest::Method::POST, "/chat").json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status { status: status.as_u16(), body: text });
        }

        let mut events = resp.bytes_stream().eventsource();
        while let Some(chunk) = events.next().await {
            let chunk = chunk.map_err(|e| ClientError::Stream(e.to_string()))?;
            if chunk.data.is_empty() {
                continue;
            }
            let event: StepEvent = serde_json::from_str(&chunk.data)?;
            let terminal = event.step.is_terminal();
            on_event(event);
            if terminal {
                break;
            }
        }
        Ok(())
    }

    /// `POST /chat/{project_id}/improve` — fire-and-forget.
    pub async fn enqueue_improve(&self, project_id: &str, task_id: &str, question: &str) -> Result<Value, ClientError> {
        let body = json!({ "task_id": task_id, "question": question });
        self.post_json(&format!("/chat/{project_id}/improve"), &body).await
    }

    /// `DELETE /chat/{project_id}`.
    pub async fn stop(&self, project_id: &str) -> Result<Value, ClientError> {
        let resp = self.request(reqwest::Method::DELETE, &format!("/chat/{project_id}")).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status { status: status.as_u16(), body: text });
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
    }

    /// `POST /chat/{project_id}/permission`.
    pub async fn resolve_permission(
        &self,
        project_id: &str,
        request_id: &str,
        approved: bool,
        remember: bool,
    ) -> Result<Value, ClientError> {
        let body = json!({ "request_id": request_id, "approved": approved, "remember": remember });
        self.post_json(&format!("/chat/{project_id}/permission"), &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_client_trims_trailing_slash_from_base_url() {
        let client = CoworkClient::new("http://localhost:8080/", None);
        let req = client.request(reqwest::Method::GET, "/ops/deps/status");
        let built = req.build().unwrap();
        assert_eq!(built.url().as_str(), "http://localhost:8080/ops/deps/status");
    }
}
