//! Streaming session controller.
//!
//! One session owns one in-flight request:
//!
//! ```text
//! Idle ──begin──▶ Streaming ──stream end──▶ Completed
//!                     │
//!                     └──error / abort──▶ Failed
//! ```
//!
//! Chunks are consumed strictly in arrival order. Each chunk's text is
//! appended to the session buffer and handed to the caller's delta callback
//! as-is; parsing happens once, when the stream ends. A failed session never
//! produces a partial result.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use amicus_shared::{
    AmicusError, AssistantSettings, GenerationRequest, ParsedResponse, RawChunk, Result,
    SessionId, SessionResult,
};

use crate::backend::{ChunkReceiver, GenerativeBackend};
use crate::parser::ResponseParser;
use crate::prompt::{compose_prompt, render_system_instruction};
use crate::sources::SourceAggregator;

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    Completed,
    Failed,
}

// ---------------------------------------------------------------------------
// Session (synchronous state machine)
// ---------------------------------------------------------------------------

/// Accumulated state of one request/response cycle.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    state: SessionState,
    buffer: String,
    sources: SourceAggregator,
    parser: Arc<ResponseParser>,
    chunks: usize,
    outcome: Option<Result<SessionResult>>,
}

impl Session {
    pub fn new(parser: Arc<ResponseParser>) -> Self {
        Self {
            id: SessionId::new(),
            state: SessionState::Idle,
            buffer: String::new(),
            sources: SourceAggregator::new(),
            parser,
            chunks: 0,
            outcome: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Raw text received so far.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    fn expect_streaming(&self, op: &str) -> Result<()> {
        if self.state == SessionState::Streaming {
            Ok(())
        } else {
            Err(AmicusError::invalid_state(format!(
                "cannot {op} a session in state {:?}",
                self.state
            )))
        }
    }

    /// `Idle -> Streaming`.
    pub fn begin(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(AmicusError::invalid_state(format!(
                "cannot begin a session in state {:?}",
                self.state
            )));
        }
        self.state = SessionState::Streaming;
        Ok(())
    }

    /// Accumulate one chunk. Sources go to the aggregator; non-empty text is
    /// appended to the buffer and passed to `on_delta` unchanged.
    pub fn push_chunk<F>(&mut self, chunk: RawChunk, on_delta: &mut F) -> Result<()>
    where
        F: FnMut(&str),
    {
        self.expect_streaming("push a chunk to")?;
        self.chunks += 1;

        if !chunk.sources.is_empty() {
            self.sources.add_records(chunk.sources);
        }

        if let Some(text) = chunk.text.filter(|t| !t.is_empty()) {
            debug!(chunk = self.chunks, len = text.len(), "text delta");
            self.buffer.push_str(&text);
            on_delta(&text);
        }
        Ok(())
    }

    /// `Streaming -> Completed`: parse the full buffer and freeze the result.
    pub fn complete(&mut self) -> Result<SessionResult> {
        self.expect_streaming("complete")?;

        let parsed = self.parser.parse(&self.buffer);
        let result = SessionResult::from_parts(parsed, self.sources.snapshot());

        info!(
            session = %self.id,
            chunks = self.chunks,
            answer_len = result.answer.len(),
            citations = result.citations.len(),
            follow_ups = result.follow_up_questions.len(),
            sources = result.grounding_sources.len(),
            "session completed"
        );

        self.state = SessionState::Completed;
        self.outcome = Some(Ok(result.clone()));
        Ok(result)
    }

    /// `Streaming -> Failed`. The buffer is not parsed. No-op outside
    /// `Streaming`, so a late failure never overwrites a frozen outcome.
    pub fn fail(&mut self, error: AmicusError) {
        if self.state != SessionState::Streaming {
            debug!(state = ?self.state, %error, "ignoring failure outside streaming state");
            return;
        }
        warn!(session = %self.id, chunks = self.chunks, %error, "session failed");
        self.state = SessionState::Failed;
        self.outcome = Some(Err(error));
    }

    /// Abort a streaming session with [`AmicusError::Cancelled`].
    pub fn abort(&mut self) {
        self.fail(AmicusError::Cancelled);
    }

    /// Speculative parse of the text received so far.
    pub fn preview(&self) -> ParsedResponse {
        self.parser.parse(&self.buffer)
    }

    /// The frozen outcome: the result when completed, the failure when
    /// failed, an invalid-state error otherwise.
    pub fn result(&self) -> Result<SessionResult> {
        match &self.outcome {
            Some(outcome) => outcome.clone(),
            None => Err(AmicusError::invalid_state(format!(
                "session has no result in state {:?}",
                self.state
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Abort handle
// ---------------------------------------------------------------------------

/// Cloneable handle that aborts a running session from anywhere (another
/// task, a signal handler, the delta callback itself).
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx: Arc::new(tx) }, rx)
    }

    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

// ---------------------------------------------------------------------------
// Session handle (async driver)
// ---------------------------------------------------------------------------

/// A started session bound to its chunk stream.
#[derive(Debug)]
pub struct SessionHandle {
    session: Session,
    stream: ChunkReceiver,
    abort: AbortHandle,
    abort_rx: watch::Receiver<bool>,
}

enum Next {
    Aborted,
    Item(Option<Result<RawChunk>>),
}

impl SessionHandle {
    fn new(session: Session, stream: ChunkReceiver) -> Self {
        let (abort, abort_rx) = AbortHandle::new();
        Self {
            session,
            stream,
            abort,
            abort_rx,
        }
    }

    pub fn id(&self) -> SessionId {
        self.session.id()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Abort now. The session moves to `Failed` with a cancellation error
    /// and the stream is released.
    pub fn abort(&mut self) {
        self.abort.abort();
        self.session.abort();
        self.stream.close();
    }

    /// Speculative parse of the text received so far.
    pub fn preview(&self) -> ParsedResponse {
        self.session.preview()
    }

    /// Raw text received so far.
    pub fn buffer(&self) -> &str {
        self.session.buffer()
    }

    /// The frozen outcome; see [`Session::result`].
    pub fn result(&self) -> Result<SessionResult> {
        self.session.result()
    }

    /// Consume the stream until it ends, fails or is aborted, invoking
    /// `on_delta` with each new text fragment. Returns the final outcome.
    pub async fn run<F>(&mut self, on_delta: F) -> Result<SessionResult>
    where
        F: FnMut(&str),
    {
        self.drive(on_delta, None::<fn(&ParsedResponse)>).await
    }

    /// Like [`run`](Self::run), but also hands `on_preview` a speculative
    /// parse of the buffer after every chunk that carried text.
    pub async fn run_with_preview<F, P>(&mut self, on_delta: F, on_preview: P) -> Result<SessionResult>
    where
        F: FnMut(&str),
        P: FnMut(&ParsedResponse),
    {
        self.drive(on_delta, Some(on_preview)).await
    }

    #[instrument(skip_all, fields(session = %self.session.id()))]
    async fn drive<F, P>(&mut self, mut on_delta: F, mut on_preview: Option<P>) -> Result<SessionResult>
    where
        F: FnMut(&str),
        P: FnMut(&ParsedResponse),
    {
        while self.session.state() == SessionState::Streaming {
            let next = tokio::select! {
                biased;
                _ = self.abort_rx.wait_for(|aborted| *aborted) => Next::Aborted,
                item = self.stream.recv() => Next::Item(item),
            };

            match next {
                Next::Aborted => {
                    info!("session aborted by caller");
                    self.session.abort();
                }
                Next::Item(Some(Ok(chunk))) => {
                    let before = self.session.buffer().len();
                    self.session.push_chunk(chunk, &mut on_delta)?;
                    if let Some(on_preview) = on_preview.as_mut() {
                        if self.session.buffer().len() > before {
                            on_preview(&self.session.preview());
                        }
                    }
                }
                Next::Item(Some(Err(error))) => self.session.fail(error),
                Next::Item(None) => {
                    self.session.complete()?;
                }
            }
        }

        self.stream.close();
        self.session.result()
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Starts sessions against an injected backend.
pub struct SessionController {
    backend: Arc<dyn GenerativeBackend>,
    settings: Arc<AssistantSettings>,
    parser: Arc<ResponseParser>,
    system_instruction: String,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

impl SessionController {
    pub fn new(backend: Arc<dyn GenerativeBackend>, settings: AssistantSettings) -> Result<Self> {
        let parser = Arc::new(ResponseParser::new(&settings)?);
        let system_instruction = render_system_instruction(&settings);
        Ok(Self {
            backend,
            settings: Arc::new(settings),
            parser,
            system_instruction,
        })
    }

    pub fn settings(&self) -> &AssistantSettings {
        &self.settings
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    /// Compose the prompt, open the backend stream and return a session in
    /// `Streaming` state. Fails without a session if the stream cannot open.
    #[instrument(skip_all, fields(backend = self.backend.name()))]
    pub async fn start(&self, query: &str, document_context: Option<&str>) -> Result<SessionHandle> {
        let prompt = compose_prompt(query, document_context, &self.settings.prompt);
        let request = GenerationRequest {
            prompt,
            system_instruction: self.system_instruction.clone(),
            search_enabled: self.settings.search_enabled,
            temperature: self.settings.temperature,
        };

        let mut session = Session::new(Arc::clone(&self.parser));
        info!(
            session = %session.id(),
            prompt_len = request.prompt.len(),
            has_context = document_context.is_some(),
            "starting session"
        );

        let stream = self.backend.open_stream(request).await?;
        session.begin()?;
        Ok(SessionHandle::new(session, stream))
    }
}
