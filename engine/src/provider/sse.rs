//! Generic SSE `data:` line extraction shared by the OpenAI-compatible and Anthropic dialects.

use super::ProviderError;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc::UnboundedSender;

/// Drains an HTTP response body as SSE, sending each `data:` payload (prefix/whitespace
/// stripped) to `sender`. Stops silently on `[DONE]` or stream end; forwards byte-stream errors
/// as [`ProviderError::Http`].
pub async fn forward_sse_lines(
    mut bytes_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
    sender: UnboundedSender<Result<String, ProviderError>>,
) {
    let mut buf = String::new();
    while let Some(chunk) = bytes_stream.next().await {
        let bytes = match chunk {
            Ok(b) => b,
            Err(e) => {
                let _ = sender.send(Err(ProviderError::Http(e)));
                return;
            }
        };
        buf.push_str(&String::from_utf8_lossy(&bytes));
        while let Some(pos) = buf.find('\n') {
            let line = buf[..pos].trim_end_matches('\r').to_string();
            buf.drain(..=pos);
            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };
            let payload = payload.trim();
            if payload == "[DONE]" {
                return;
            }
            if !payload.is_empty() && sender.send(Ok(payload.to_string())).is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test]
    async fn stops_at_done_marker_and_ignores_blank_and_comment_lines() {
        let chunks: Vec<Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::from("data: {\"a\":1}\n\n")),
            Ok(Bytes::from(": keep-alive\n")),
            Ok(Bytes::from("data: {\"a\":2}\n")),
            Ok(Bytes::from("data: [DONE]\n")),
            Ok(Bytes::from("data: {\"a\":3}\n")),
        ];
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        forward_sse_lines(stream::iter(chunks), tx).await;

        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line.unwrap());
        }
        assert_eq!(lines, vec!["{\"a\":1}".to_string(), "{\"a\":2}".to_string()]);
    }

    #[tokio::test]
    async fn handles_payload_split_across_chunks() {
        let chunks: Vec<Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::from("data: {\"a\":")),
            Ok(Bytes::from("1}\n")),
            Ok(Bytes::from("data: [DONE]\n")),
        ];
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        forward_sse_lines(stream::iter(chunks), tx).await;
        assert_eq!(rx.try_recv().unwrap().unwrap(), "{\"a\":1}");
        assert!(rx.try_recv().is_err());
    }
}
