//! OpenAI-compatible chat-completion client implementing
//! `edtech_core::traits::LlmProvider`. Generalizes the teacher's
//! `services/llm_service.rs` (`chat_stream`, SSE-chunk parsing via
//! `futures::stream::unfold`) to also implement `generate_complete` for
//! the non-streaming global-query path.

use async_trait::async_trait;
use edtech_core::error::{ApiError, ApiResult};
use edtech_core::prompt::{ChatMessage, MessageRole};
use edtech_core::traits::{LlmProvider, LlmUsage};
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::LlmConfig;

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

fn to_wire(messages: &[ChatMessage]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|m| WireMessage {
            role: match m.role {
                MessageRole::System => "system",
                MessageRole::User => "user",
            },
            content: m.content.clone(),
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize, Default)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<FullChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct FullChoice {
    message: FullMessage,
}

#[derive(Debug, Deserialize)]
struct FullMessage {
    content: String,
}

#[derive(Debug, Deserialize, Default)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

pub struct HttpLlmClient {
    client: Client,
    config: LlmConfig,
}

impl HttpLlmClient {
    pub fn new(config: LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, config }
    }

    fn request(&self, messages: &[ChatMessage], stream: bool) -> reqwest::RequestBuilder {
        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: to_wire(messages),
            stream,
        };
        let mut builder = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.base_url))
            .json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    /// Idempotent-read retry: 3 attempts with exponential backoff (spec §5).
    async fn send_with_retry(&self, messages: &[ChatMessage], stream: bool) -> ApiResult<reqwest::Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.request(messages, stream).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if attempt >= 3 => {
                    return Err(ApiError::external(
                        "llm",
                        format!("request failed with status {}", response.status()),
                    ))
                }
                Err(e) if attempt >= 3 => return Err(ApiError::external("llm", e.to_string())),
                _ => {
                    let backoff = Duration::from_millis(200 * 2u64.pow(attempt - 1));
                    debug!(attempt, "llm request failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[async_trait]
impl LlmProvider for HttpLlmClient {
    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
    ) -> ApiResult<BoxStream<'static, ApiResult<String>>> {
        let response = self.send_with_retry(messages, true).await?;
        let byte_stream = response.bytes_stream();

        let token_stream = byte_stream.flat_map(|chunk| {
            let tokens = match chunk {
                Ok(bytes) => parse_sse_chunk(&bytes),
                Err(e) => vec![Err(ApiError::external("llm", format!("stream error: {e}")))],
            };
            futures::stream::iter(tokens)
        });

        Ok(Box::pin(token_stream))
    }

    async fn generate_complete(&self, messages: &[ChatMessage]) -> ApiResult<(String, LlmUsage)> {
        let response = self.send_with_retry(messages, false).await?;
        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ApiError::external("llm", e.to_string()))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        let usage = parsed.usage.unwrap_or_default();
        Ok((
            text,
            LlmUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            },
        ))
    }
}

fn parse_sse_chunk(bytes: &[u8]) -> Vec<ApiResult<String>> {
    let text = String::from_utf8_lossy(bytes);
    let mut out = Vec::new();
    for line in text.lines() {
        let Some(json_str) = line.strip_prefix("data: ") else { continue };
        if json_str.trim() == "[DONE]" {
            continue;
        }
        if let Ok(chunk) = serde_json::from_str::<ChatCompletionChunk>(json_str) {
            if let Some(content) = chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
                if !content.is_empty() {
                    out.push(Ok(content));
                }
            }
        }
    }
    out
}
