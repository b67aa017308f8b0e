use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::SessionError;
use crate::live::codec;

/// Streams answers from the provider's generate endpoint.
///
/// Each call is an independent request/response stream: it shares nothing
/// with the live connection and may run while audio keeps flowing. The
/// cancellation token is checked between chunks; callers pass the session
/// token to tie an answer to session teardown, or their own to outlive it.
pub struct AnswerClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    instruction: String,
}

impl AnswerClient {
    pub fn new(base_url: String, api_key: String, model: String, instruction: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            model,
            instruction,
        }
    }

    /// Stream the answer for one question, forwarding each text chunk.
    ///
    /// Returns the full answer text once the provider finishes the turn.
    pub async fn stream_answer<F>(
        &self,
        question: &str,
        mut on_chunk: F,
        cancel: CancellationToken,
    ) -> Result<String, SessionError>
    where
        F: FnMut(&str),
    {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );

        info!("Requesting answer stream for: {}", question);

        let body = codec::encode_answer_request(question, &self.instruction);

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::Transport(format!("answer request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(SessionError::Provider(format!(
                "answer request returned {}: {}",
                status, detail
            )));
        }

        let mut stream = Box::pin(response.bytes_stream());
        let mut pending = String::new();
        let mut full_text = String::new();
        let mut done = false;

        while !done {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Answer stream cancelled");
                    return Err(SessionError::Cancelled);
                }
                chunk = stream.next() => chunk,
            };

            let bytes = match chunk {
                None => break,
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    return Err(SessionError::Transport(format!(
                        "answer stream failed: {}",
                        e
                    )))
                }
            };

            pending.push_str(&String::from_utf8_lossy(&bytes));

            // SSE framing: one "data: {json}" payload per line
            while let Some(pos) = pending.find('\n') {
                let line = pending[..pos].trim_end_matches('\r').to_string();
                pending.drain(..=pos);

                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };

                if data.trim() == "[DONE]" {
                    done = true;
                    break;
                }

                if let Some(text) = extract_chunk_text(data) {
                    full_text.push_str(&text);
                    on_chunk(&text);
                }
            }
        }

        info!("Answer stream complete ({} chars)", full_text.len());

        Ok(full_text)
    }
}

/// Pull the text out of one streamed response chunk.
fn extract_chunk_text(data: &str) -> Option<String> {
    let value: Value = serde_json::from_str(data).ok()?;

    let parts = value
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let mut text = String::new();
    for part in parts {
        if let Some(fragment) = part.get("text").and_then(|t| t.as_str()) {
            text.push_str(fragment);
        }
    }

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_chunk_text() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"It is "},{"text":"raining."}]}}]}"#;
        assert_eq!(extract_chunk_text(data).as_deref(), Some("It is raining."));
    }

    #[test]
    fn test_extract_chunk_text_no_candidates() {
        assert_eq!(extract_chunk_text(r#"{"usageMetadata":{}}"#), None);
    }

    #[test]
    fn test_extract_chunk_text_malformed() {
        assert_eq!(extract_chunk_text("not json"), None);
    }
}
