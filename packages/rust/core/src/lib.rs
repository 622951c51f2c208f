//! Streaming research-assistant core for Amicus.
//!
//! This crate owns the request lifecycle: prompt composition, the
//! [`GenerativeBackend`](backend::GenerativeBackend) port, the streaming
//! session state machine, and the parser that turns the model's Markdown
//! answer into an answer body, structured citations and follow-up questions.

pub mod assistant;
pub mod backend;
pub mod citations;
pub mod followups;
pub mod parser;
pub mod prompt;
pub mod sections;
pub mod session;
pub mod sources;

pub use assistant::{ActiveQuery, Assistant};
pub use backend::{
    CHUNK_CHANNEL_CAPACITY, ChunkReceiver, GenerativeBackend, ScriptedBackend, ScriptedFailure,
    Transcript,
};
pub use parser::ResponseParser;
pub use session::{AbortHandle, Session, SessionController, SessionHandle, SessionState};
pub use sources::SourceAggregator;
