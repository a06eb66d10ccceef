//! OpenAI-compatible chat provider.
//!
//! Covers hosted APIs (OpenAI, OpenRouter, DeepSeek, Groq, ...) and local
//! servers that speak the same dialect (vLLM, llama.cpp). Streaming uses
//! server-sent events: one `data: {...}` line per delta, closed by
//! `data: [DONE]`.

use async_trait::async_trait;
use codeloop_core::error::ProviderError;
use codeloop_core::message::Role;
use codeloop_core::provider::*;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::lines::LineBuffer;

/// Used when a 429 carries no usable `Retry-After` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Chat, embedding and model-listing client for an OpenAI-style endpoint.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// `base_url` includes the version segment, e.g. `https://api.openai.com/v1`.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
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

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "stream": stream,
        });
        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.stop.is_empty() {
            body["stop"] = serde_json::json!(request.stop);
        }
        body
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }

    async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
        accept: &str,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .authorized(self.client.post(&url))
            .header("Accept", accept)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        check_status(response).await
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        self.authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))
    }
}

/// Map non-200 statuses to provider errors.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();
    match status {
        200 => Ok(response),
        429 => {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            Err(ProviderError::RateLimited { retry_after_secs })
        }
        401 | 403 => Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        )),
        404 => Err(ProviderError::ModelNotFound(
            response.text().await.unwrap_or_default(),
        )),
        _ => {
            let message = response.text().await.unwrap_or_default();
            warn!(status, body = %message, "Provider returned error");
            Err(ProviderError::ApiError {
                status_code: status,
                message,
            })
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let body = Self::chat_body(&request, false);
        let response = self.post("/chat/completions", &body, "application/json").await?;

        let parsed: Completion = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?
            .message
            .content
            .unwrap_or_default();

        Ok(ProviderResponse {
            content,
            usage: parsed.usage.map(Usage::from),
            model: parsed.model.unwrap_or(request.model),
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let body = Self::chat_body(&request, true);
        let response = self.post("/chat/completions", &body, "text/event-stream").await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut lines = LineBuffer::new();

            while let Some(next) = bytes.next().await {
                let chunk = match next {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::StreamInterrupted(e.to_string()))).await;
                        return;
                    }
                };

                for line in lines.push(&chunk) {
                    match parse_sse_line(&line) {
                        Ok(None) => {}
                        Ok(Some(SseEvent::Delta(text))) => {
                            if tx.send(Ok(StreamChunk::text(text))).await.is_err() {
                                return;
                            }
                        }
                        Ok(Some(SseEvent::Done(usage))) => {
                            let _ = tx.send(Ok(StreamChunk::finished(usage))).await;
                            return;
                        }
                        Err(e) => {
                            trace!(provider = %provider_name, line = %line, "Stream reported an error");
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
            }

            // Some servers close the connection without [DONE].
            let _ = tx.send(Ok(StreamChunk::finished(None))).await;
        });

        Ok(rx)
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        debug!(
            provider = %self.name,
            model = %request.model,
            count = request.inputs.len(),
            "Sending embedding request"
        );

        let body = serde_json::json!({
            "model": request.model,
            "input": request.inputs,
            "encoding_format": "float",
        });
        let response = self.post("/embeddings", &body, "application/json").await?;

        let parsed: Embeddings = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse embedding response: {e}"),
        })?;

        Ok(parsed.into_response(request.model))
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let response = check_status(self.get("/models").await?).await?;
        let listing: ModelList = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(listing.data.into_iter().map(|m| m.id).collect())
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(self.get("/models").await?.status().is_success())
    }
}

/// What a `data:` line contributes to the stream.
#[derive(Debug, PartialEq)]
enum SseEvent {
    Delta(String),
    Done(Option<Usage>),
}

/// Interpret one SSE line. Blank lines, comments, other fields and deltas
/// without text yield `None`; an `error` payload ends the stream.
fn parse_sse_line(line: &str) -> Result<Option<SseEvent>, ProviderError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(Some(SseEvent::Done(None)));
    }

    let event: StreamEvent = serde_json::from_str(data)
        .map_err(|e| ProviderError::StreamInterrupted(format!("Malformed stream event: {e}")))?;

    if let Some(error) = event.error {
        return Err(ProviderError::StreamInterrupted(error.message));
    }
    // With include_usage, usage rides on a final event with no choices.
    if let Some(usage) = event.usage {
        return Ok(Some(SseEvent::Done(Some(usage.into()))));
    }

    Ok(event
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|text| !text.is_empty())
        .map(SseEvent::Delta))
}

// --- Wire types (internal) ---

#[derive(Debug, Deserialize)]
struct Completion {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: WireContent,
}

#[derive(Debug, Default, Deserialize)]
struct WireContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(u: WireUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: WireContent,
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Embeddings {
    data: Vec<EmbeddingRow>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl Embeddings {
    /// Rows may arrive out of order; `index` ties them back to the inputs.
    fn into_response(mut self, requested_model: String) -> EmbeddingResponse {
        self.data.sort_by_key(|row| row.index);
        EmbeddingResponse {
            embeddings: self.data.into_iter().map(|row| row.embedding).collect(),
            model: self.model.unwrap_or(requested_model),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}
