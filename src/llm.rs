//! Text generation against an OpenAI-compatible completions endpoint
//! (OpenAI, llama.cpp server, vLLM, ...).
//!
//! Generation never fails from the caller's point of view: after retries
//! are exhausted the error is logged and [`GENERATION_APOLOGY`] is returned.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, warn};

use jenkins_chatbot_core::generation::{Generator, TextStream, GENERATION_APOLOGY};

use crate::config::LlmConfig;
use crate::http::{build_client, post_json_with_retry};

/// Generator used when `llm.provider = "disabled"`.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    async fn generate(&self, _prompt: &str, _max_tokens: u32) -> String {
        warn!("generation requested but llm.provider is disabled");
        GENERATION_APOLOGY.to_string()
    }
}

/// OpenAI-compatible `/v1/completions` client.
pub struct HttpGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_retries: u32,
}

impl HttpGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("llm.model required for openai provider"))?;
        let api_key = match &config.api_key_env {
            Some(var) => Some(
                std::env::var(var).map_err(|_| anyhow!("{} environment variable not set", var))?,
            ),
            None => None,
        };

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: format!("{}/v1/completions", config.base_url.trim_end_matches('/')),
            model,
            api_key,
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    fn request_body(&self, prompt: &str, max_tokens: u32, stream: bool) -> Value {
        json!({
            "model": self.model,
            "prompt": prompt,
            "max_tokens": max_tokens,
            "temperature": self.temperature,
            "stream": stream,
        })
    }

    async fn try_generate(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let json = post_json_with_retry(
            &self.client,
            &self.url,
            self.api_key.as_deref(),
            &self.request_body(prompt, max_tokens, false),
            self.max_retries,
            "LLM",
        )
        .await?;
        completion_text(&json)
            .map(|t| t.trim().to_string())
            .ok_or_else(|| anyhow!("Invalid completion response: missing choices[0].text"))
    }

    async fn open_stream(&self, prompt: &str, max_tokens: u32) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&self.request_body(prompt, max_tokens, true));
        if let Some(token) = &self.api_key {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("LLM API error {}: {}", status, body));
        }
        Ok(response)
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> String {
        match self.try_generate(prompt, max_tokens).await {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "generation failed");
                GENERATION_APOLOGY.to_string()
            }
        }
    }

    async fn generate_stream(&self, prompt: &str, max_tokens: u32) -> TextStream {
        let response = match self.open_stream(prompt, max_tokens).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "streaming generation failed");
                return Box::pin(stream::once(async { GENERATION_APOLOGY.to_string() }));
            }
        };

        let state = StreamState {
            bytes: Box::pin(response.bytes_stream()),
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            emitted: false,
            done: false,
        };

        Box::pin(stream::unfold(state, |mut st| async move {
            loop {
                if let Some(fragment) = st.pending.pop_front() {
                    st.emitted = true;
                    return Some((fragment, st));
                }
                if st.done {
                    return None;
                }
                match st.bytes.next().await {
                    Some(Ok(chunk)) => {
                        for event in st.decoder.push(&chunk) {
                            match event {
                                SseEvent::Done => st.done = true,
                                SseEvent::Data(payload) => match serde_json::from_str::<Value>(&payload) {
                                    Ok(json) => {
                                        if let Some(text) = completion_text(&json).filter(|t| !t.is_empty()) {
                                            st.pending.push_back(text.to_string());
                                        }
                                    }
                                    Err(e) => debug!(error = %e, "skipping non-JSON stream event"),
                                },
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "generation stream interrupted");
                        st.done = true;
                        if !st.emitted {
                            st.pending.push_back(GENERATION_APOLOGY.to_string());
                        }
                    }
                    None => st.done = true,
                }
            }
        }))
    }
}

struct StreamState<S> {
    bytes: std::pin::Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    emitted: bool,
    done: bool,
}

/// Text of the first choice: `choices[0].text`, or `choices[0].delta.content`
/// for chat-style streams.
pub fn completion_text(json: &Value) -> Option<&str> {
    let choice = json.get("choices")?.get(0)?;
    choice
        .get("text")
        .and_then(Value::as_str)
        .or_else(|| choice.get("delta")?.get("content")?.as_str())
}

/// One server-sent event relevant to completions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Incremental `text/event-stream` line decoder. Bytes may arrive split
/// anywhere, including inside a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };
            let payload = payload.trim_start();
            if payload == "[DONE]" {
                events.push(SseEvent::Done);
            } else if !payload.is_empty() {
                events.push(SseEvent::Data(payload.to_string()));
            }
        }

        events
    }
}

/// Create the configured generator.
pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(HttpGenerator::new(config)?)),
        other => Err(anyhow!("Unknown llm provider: {}", other)),
    }
}
