//! Shared types, error model, and configuration for Amicus.
//!
//! This crate is the foundation depended on by all other Amicus crates.
//! It provides:
//! - [`AmicusError`]: the unified error type
//! - Domain types ([`RawChunk`], [`SourceRecord`], [`Citation`], [`SessionResult`])
//! - Configuration ([`AppConfig`], [`AssistantSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, AssistantSettings, AttachmentsConfig, CitationFormat, DETAILS_PLACEHOLDER,
    DelimiterStrategy, GeminiConfig, MessagesConfig, PromptConfig, SectionHeadings, config_dir,
    config_file_path, init_config, init_config_in, load_config, load_config_from,
    resolve_api_key, validate_config,
};
pub use error::{AmicusError, Result};
pub use types::{
    Attachment, Citation, GenerationRequest, ParsedResponse, RawChunk, SessionId, SessionResult,
    SourceRecord,
};
