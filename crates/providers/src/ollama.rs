//! Native Ollama provider.
//!
//! Talks to Ollama's own API rather than its OpenAI shim:
//! - `POST /api/chat` streams newline-delimited JSON objects, one per token
//!   batch, with `"done": true` on the last one
//! - `POST /api/embed` embeds a batch of inputs
//! - `GET /api/tags` lists local models

use async_trait::async_trait;
use codeloop_core::error::ProviderError;
use codeloop_core::message::Role;
use codeloop_core::provider::*;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::lines::LineBuffer;

/// Default local Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Client for Ollama's HTTP API.
#[derive(Clone)]
pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Create a new Ollama provider.
    ///
    /// `base_url` is the server root (e.g. "http://localhost:11434"); a
    /// trailing `/v1` left over from OpenAI-style configs is stripped.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/');
        let base_url = base_url.strip_suffix("/v1").unwrap_or(base_url).to_string();

        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    fn chat_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                serde_json::json!({ "role": role, "content": m.content })
            })
            .collect();

        let mut options = serde_json::json!({ "temperature": request.temperature });
        if let Some(max_tokens) = request.max_tokens {
            options["num_predict"] = serde_json::json!(max_tokens);
        }
        if !request.stop.is_empty() {
            options["stop"] = serde_json::json!(request.stop);
        }

        serde_json::json!({
            "model": request.model,
            "messages": messages,
            "stream": stream,
            "options": options,
        })
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 404 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ModelNotFound(error_body));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Ollama returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }
        Ok(response)
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_URL)
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        debug!(model = %request.model, "Sending Ollama chat request");

        let body = Self::chat_body(&request, false);
        let response = self.post("/api/chat", &body).await?;

        let line: ChatLine = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse Ollama response: {e}"),
        })?;

        if let Some(error) = line.error {
            return Err(ProviderError::ApiError {
                status_code: 200,
                message: error,
            });
        }

        let usage = line.usage();
        Ok(ProviderResponse {
            content: line.message.map(|m| m.content).unwrap_or_default(),
            usage,
            model: line.model.unwrap_or(request.model),
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        debug!(model = %request.model, "Sending Ollama streaming request");

        let body = Self::chat_body(&request, true);
        let response = self.post("/api/chat", &body).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(forward_ndjson(response.bytes_stream(), tx));

        Ok(rx)
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        debug!(model = %request.model, count = request.inputs.len(), "Sending Ollama embed request");

        let body = serde_json::json!({
            "model": request.model,
            "input": request.inputs,
        });
        let response = self.post("/api/embed", &body).await?;

        let parsed: EmbedResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse Ollama embed response: {e}"),
        })?;

        Ok(EmbeddingResponse {
            embeddings: parsed.embeddings,
            model: parsed.model.unwrap_or(request.model),
        })
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(Vec::new());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(body["models"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["name"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

type ChunkSender = tokio::sync::mpsc::Sender<Result<StreamChunk, ProviderError>>;

/// Forward a `/api/chat` NDJSON body to `tx` until the `done` line.
///
/// Ollama always ends a completed reply with `"done": true`, so a body that
/// closes before it was cut short and ends the stream with an error.
async fn forward_ndjson<S, B, E>(mut body: S, tx: ChunkSender)
where
    S: futures::Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut lines = LineBuffer::new();

    while let Some(next) = body.next().await {
        let bytes = match next {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tx.send(Err(ProviderError::StreamInterrupted(e.to_string()))).await;
                return;
            }
        };
        for line in lines.push(bytes.as_ref()) {
            if !forward_line(&line, &tx).await {
                return;
            }
        }
    }

    if let Some(line) = lines.finish() {
        if !forward_line(&line, &tx).await {
            return;
        }
    }

    warn!("Ollama stream closed without a done line");
    let _ = tx
        .send(Err(ProviderError::StreamInterrupted(
            "stream ended without a done marker".into(),
        )))
        .await;
}

/// Send whatever `line` yields. Returns false once the stream is over.
async fn forward_line(line: &str, tx: &ChunkSender) -> bool {
    match parse_ndjson_line(line) {
        Ok(None) => true,
        Ok(Some(chunk)) => {
            let done = chunk.done;
            tx.send(Ok(chunk)).await.is_ok() && !done
        }
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}

/// Parse one NDJSON line from `/api/chat`.
///
/// Returns `Ok(None)` for blank lines and token-less intermediate objects.
/// An `"error"` object mid-stream is a stream failure.
fn parse_ndjson_line(line: &str) -> Result<Option<StreamChunk>, ProviderError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let parsed: ChatLine = match serde_json::from_str(line) {
        Ok(p) => p,
        Err(e) => {
            trace!(data = %line, error = %e, "Unparseable Ollama line");
            return Err(ProviderError::StreamInterrupted(format!(
                "Malformed stream line: {e}"
            )));
        }
    };

    if let Some(error) = parsed.error {
        return Err(ProviderError::StreamInterrupted(error));
    }

    let content = parsed
        .message
        .as_ref()
        .map(|m| m.content.clone())
        .filter(|c| !c.is_empty());

    if parsed.done {
        // The final object may still carry a last token.
        return Ok(Some(StreamChunk {
            content,
            done: true,
            usage: parsed.usage(),
        }));
    }

    Ok(content.map(StreamChunk::text))
}

// --- Ollama API types (internal) ---

#[derive(Debug, Deserialize)]
struct ChatLine {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

impl ChatLine {
    fn usage(&self) -> Option<Usage> {
        if self.prompt_eval_count.is_none() && self.eval_count.is_none() {
            return None;
        }
        let prompt = self.prompt_eval_count.unwrap_or(0);
        let completion = self.eval_count.unwrap_or(0);
        Some(Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    model: Option<String>,
    embeddings: Vec<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeloop_core::message::Message;

    #[test]
    fn strips_openai_suffix() {
        let p = OllamaProvider::new("http://localhost:11434/v1/");
        assert_eq!(p.base_url, "http://localhost:11434");
        assert_eq!(OllamaProvider::default().base_url, DEFAULT_OLLAMA_URL);
    }

    #[test]
    fn chat_body_maps_options() {
        let request = ProviderRequest {
            model: "llama3.1:8b-instruct-fp16".into(),
            messages: vec![Message::system("rules"), Message::user("Query: hi")],
            temperature: 0.1,
            max_tokens: Some(256),
            stop: vec![],
        };
        let body = OllamaProvider::chat_body(&request, true);
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Query: hi");
        assert_eq!(body["options"]["num_predict"], 256);
    }

    #[test]
    fn parse_token_line() {
        let line = r#"{"model":"llama3.1","message":{"role":"assistant","content":"print"},"done":false}"#;
        let chunk = parse_ndjson_line(line).unwrap().unwrap();
        assert_eq!(chunk.content.as_deref(), Some("print"));
        assert!(!chunk.done);
    }

    #[test]
    fn parse_final_line_with_usage() {
        let line = r#"{"model":"llama3.1","message":{"role":"assistant","content":""},"done":true,"prompt_eval_count":26,"eval_count":290}"#;
        let chunk = parse_ndjson_line(line).unwrap().unwrap();
        assert!(chunk.done);
        assert!(chunk.content.is_none());
        let usage = chunk.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 26);
        assert_eq!(usage.completion_tokens, 290);
        assert_eq!(usage.total_tokens, 316);
    }

    #[test]
    fn empty_token_line_is_skipped() {
        let line = r#"{"message":{"role":"assistant","content":""},"done":false}"#;
        assert!(parse_ndjson_line(line).unwrap().is_none());
        assert!(parse_ndjson_line("   ").unwrap().is_none());
    }

    #[test]
    fn error_line_interrupts_stream() {
        let err = parse_ndjson_line(r#"{"error":"model 'x' not found"}"#).unwrap_err();
        assert!(matches!(err, ProviderError::StreamInterrupted(m) if m.contains("not found")));
    }

    #[test]
    fn malformed_line_interrupts_stream() {
        assert!(parse_ndjson_line("{\"message\":").is_err());
    }

    async fn drain(body: Vec<&'static str>) -> Vec<Result<StreamChunk, ProviderError>> {
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let body = futures::stream::iter(body.into_iter().map(Ok::<_, std::io::Error>));
        forward_ndjson(body, tx).await;

        let mut received = Vec::new();
        while let Some(item) = rx.recv().await {
            received.push(item);
        }
        received
    }

    #[tokio::test]
    async fn stream_stops_at_done_line() {
        let received = drain(vec![
            "{\"message\":{\"content\":\"pri\"},\"done\":false}\n{\"message\":",
            "{\"content\":\"nt\"},\"done\":false}\n{\"done\":true}",
        ])
        .await;

        assert_eq!(received.len(), 3);
        let text: String = received
            .iter()
            .filter_map(|r| r.as_ref().ok()?.content.clone())
            .collect();
        assert_eq!(text, "print");
        assert!(received[2].as_ref().unwrap().done);
    }

    #[tokio::test]
    async fn stream_without_done_line_is_interrupted() {
        let received = drain(vec!["{\"message\":{\"content\":\"print(\"},\"done\":false}\n"]).await;

        assert_eq!(received.len(), 2);
        assert_eq!(received[0].as_ref().unwrap().content.as_deref(), Some("print("));
        assert!(matches!(
            &received[1],
            Err(ProviderError::StreamInterrupted(m)) if m.contains("done")
        ));
    }

    #[test]
    fn parse_embed_response() {
        let data = r#"{"model":"nomic-embed-text","embeddings":[[0.1,0.2],[0.3,0.4]]}"#;
        let parsed: EmbedResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.embeddings.len(), 2);
        assert_eq!(parsed.embeddings[1], vec![0.3, 0.4]);
    }
}
