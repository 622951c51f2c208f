//! Gemini streaming backend for Amicus.
//!
//! Posts to `{base_url}/models/{model}:streamGenerateContent?alt=sse` and
//! forwards each decoded SSE event to the session as a [`RawChunk`] over a
//! bounded channel. Web-search grounding is requested through the
//! `googleSearch` tool; grounding chunks become [`SourceRecord`]s.
//!
//! [`RawChunk`]: amicus_shared::RawChunk
//! [`SourceRecord`]: amicus_shared::SourceRecord

mod sse;
mod wire;

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use url::Url;

use amicus_core::backend::{CHUNK_CHANNEL_CAPACITY, ChunkReceiver, GenerativeBackend};
use amicus_shared::{AmicusError, AppConfig, GeminiConfig, GenerationRequest, RawChunk, Result};

use crate::sse::SseDecoder;
use crate::wire::{GenerateContentRequest, decode_event, http_error};

/// User-Agent sent with every request.
const USER_AGENT: &str = concat!("amicus/", env!("CARGO_PKG_VERSION"));

/// Connection establishment limit, independent of the overall timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Streaming client for the Gemini `generativelanguage` API.
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    client: Client,
    endpoint: Url,
    api_key: String,
    untitled_source: String,
}

impl GeminiBackend {
    /// Build a backend from the `[gemini]` config section.
    pub fn new(
        config: &GeminiConfig,
        api_key: impl Into<String>,
        untitled_source: impl Into<String>,
    ) -> Result<Self> {
        let endpoint = stream_endpoint(&config.base_url, &config.model)?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AmicusError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
            untitled_source: untitled_source.into(),
        })
    }

    /// Build a backend from the full application config and a resolved key.
    pub fn from_app_config(config: &AppConfig, api_key: impl Into<String>) -> Result<Self> {
        Self::new(&config.gemini, api_key, config.messages.untitled_source.clone())
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// `{base_url}/models/{model}:streamGenerateContent?alt=sse`
fn stream_endpoint(base_url: &str, model: &str) -> Result<Url> {
    let model = model.trim();
    if model.is_empty() {
        return Err(AmicusError::config("gemini.model must not be empty"));
    }
    let raw = format!(
        "{}/models/{model}:streamGenerateContent?alt=sse",
        base_url.trim_end_matches('/')
    );
    Url::parse(&raw).map_err(|e| AmicusError::config(format!("invalid Gemini endpoint '{raw}': {e}")))
}

fn transport_error(e: reqwest::Error) -> AmicusError {
    if e.is_timeout() {
        AmicusError::Timeout(e.to_string())
    } else {
        AmicusError::Transport(e.to_string())
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    fn name(&self) -> &'static str {
        "gemini"
    }

    #[instrument(skip_all, fields(endpoint = %self.endpoint.path()))]
    async fn open_stream(&self, request: GenerationRequest) -> Result<ChunkReceiver> {
        let body = GenerateContentRequest::from_request(&request);

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|e| format!("failed to read error response body: {e}"));
            warn!(status = status.as_u16(), "Gemini rejected the request");
            return Err(http_error(status.as_u16(), &text));
        }
        info!(status = status.as_u16(), "Gemini stream opened");

        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let untitled = self.untitled_source.clone();
        let mut bytes = response.bytes_stream();

        tokio::spawn(async move {
            let mut decoder = SseDecoder::new();
            let mut events = 0usize;

            loop {
                let next = tokio::select! {
                    _ = tx.closed() => {
                        debug!(events, "stream consumer went away, dropping connection");
                        return;
                    }
                    next = bytes.next() => next,
                };

                let payloads = match next {
                    Some(Ok(data)) => decoder.push(&data),
                    Some(Err(e)) => {
                        let _ = tx.send(Err(transport_error(e))).await;
                        return;
                    }
                    None => break,
                };

                for payload in payloads {
                    events += 1;
                    if !forward(&tx, &payload, &untitled).await {
                        return;
                    }
                }
            }

            if let Some(payload) = decoder.finish() {
                events += 1;
                if !forward(&tx, &payload, &untitled).await {
                    return;
                }
            }
            debug!(events, "Gemini stream finished");
        });

        Ok(rx)
    }
}

/// Decode one event and send it on. Returns `false` when the stream must
/// stop (terminal error sent, or consumer gone).
async fn forward(tx: &mpsc::Sender<Result<RawChunk>>, payload: &str, untitled: &str) -> bool {
    match decode_event(payload, untitled) {
        Ok(Some(chunk)) => tx.send(Ok(chunk)).await.is_ok(),
        Ok(None) => true,
        Err(e) => {
            warn!(error = %e, "Gemini stream ended with an error");
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}
