//! Generative backend port and a scripted test double.
//!
//! Backends are injected into the session controller as
//! `Arc<dyn GenerativeBackend>`. A backend turns a [`GenerationRequest`]
//! into a channel of [`RawChunk`]s: every item is either a chunk or a
//! terminal error, and the channel closing means natural completion.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use amicus_shared::{AmicusError, GenerationRequest, RawChunk, Result};

/// Buffer size of chunk channels.
pub const CHUNK_CHANNEL_CAPACITY: usize = 32;

/// Ordered stream of chunks for one request. `Err` items are terminal.
pub type ChunkReceiver = mpsc::Receiver<Result<RawChunk>>;

/// A streaming text generator (the network transport lives behind this).
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Open a streaming generation. Errors returned here mean the stream
    /// never started (connection refused, HTTP error status).
    async fn open_stream(&self, request: GenerationRequest) -> Result<ChunkReceiver>;
}

// ---------------------------------------------------------------------------
// Scripted backend
// ---------------------------------------------------------------------------

/// Terminal failure injected by a [`Transcript`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptedFailure {
    Transport { message: String },
    Timeout { message: String },
    Backend { status: u16, message: String },
}

impl ScriptedFailure {
    fn to_error(&self) -> AmicusError {
        match self {
            Self::Transport { message } => AmicusError::Transport(message.clone()),
            Self::Timeout { message } => AmicusError::Timeout(message.clone()),
            Self::Backend { status, message } => AmicusError::Backend {
                status: *status,
                message: message.clone(),
            },
        }
    }
}

/// A canned streaming response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    /// Chunks delivered in order.
    #[serde(default)]
    pub chunks: Vec<RawChunk>,
    /// Failure delivered after the chunks instead of a natural end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ScriptedFailure>,
    /// Keep the stream open after the last chunk until the consumer goes away.
    #[serde(default)]
    pub hold_open: bool,
}

impl Transcript {
    /// A transcript of text-only chunks.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: texts.into_iter().map(RawChunk::text).collect(),
            ..Self::default()
        }
    }

    /// End the stream with `failure` after the scripted chunks.
    pub fn failing_with(mut self, failure: ScriptedFailure) -> Self {
        self.error = Some(failure);
        self
    }

    /// Load a transcript from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| AmicusError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            AmicusError::validation(format!("invalid transcript {}: {e}", path.display()))
        })
    }
}

/// Replays a [`Transcript`] for every request and records the requests it saw.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    transcript: Transcript,
    chunk_delay: Option<Duration>,
    open_error: Option<ScriptedFailure>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    pub fn new(transcript: Transcript) -> Self {
        Self {
            transcript,
            ..Self::default()
        }
    }

    /// Sleep between chunks, to mimic a live stream.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Refuse to open any stream.
    pub fn failing_to_open(failure: ScriptedFailure) -> Self {
        Self {
            open_error: Some(failure),
            ..Self::default()
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn open_stream(&self, request: GenerationRequest) -> Result<ChunkReceiver> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request);
        }

        if let Some(failure) = &self.open_error {
            return Err(failure.to_error());
        }

        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let transcript = self.transcript.clone();
        let delay = self.chunk_delay;

        tokio::spawn(async move {
            for chunk in transcript.chunks {
                if let Some(d) = delay {
                    tokio::time::sleep(d).await;
                }
                if tx.send(Ok(chunk)).await.is_err() {
                    debug!("scripted stream consumer dropped");
                    return;
                }
            }
            if let Some(failure) = transcript.error {
                let _ = tx.send(Err(failure.to_error())).await;
            } else if transcript.hold_open {
                tx.closed().await;
            }
        });

        Ok(rx)
    }
}
