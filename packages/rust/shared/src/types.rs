//! Core domain types for Amicus request/response cycles.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for session identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a new time-sortable session identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Streaming input
// ---------------------------------------------------------------------------

/// A web reference returned by the backend's search tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Unique key; records with an empty `uri` are dropped by the aggregator.
    pub uri: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
}

impl SourceRecord {
    pub fn new(uri: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            title: title.into(),
        }
    }
}

/// One incrementally delivered fragment of the backend's response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChunk {
    /// Newly generated text, if this chunk carried any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Grounding sources attached to this chunk.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceRecord>,
}

impl RawChunk {
    /// A chunk carrying only text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            sources: Vec::new(),
        }
    }

    /// A chunk carrying only grounding metadata.
    pub fn sources(sources: Vec<SourceRecord>) -> Self {
        Self {
            text: None,
            sources,
        }
    }
}

/// Parameters for one streaming call to the generative backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    /// Effective prompt (document context + user question).
    pub prompt: String,
    /// Fixed instructional prompt describing persona and answer format.
    pub system_instruction: String,
    /// Whether the backend may use its web search tool.
    pub search_enabled: bool,
    /// Sampling temperature.
    pub temperature: f32,
}

// ---------------------------------------------------------------------------
// Parsed output
// ---------------------------------------------------------------------------

/// A quoted passage parsed out of the citations section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Source label (case name, court, instrument).
    pub source: String,
    /// Quoted passage; internal line breaks are preserved.
    pub quote: String,
    /// Link to the document, when the entry carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Structured view of a complete (or partial) raw answer text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub follow_up_questions: Vec<String>,
}

/// Terminal value of one request/response cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub follow_up_questions: Vec<String>,
    /// Deduplicated web sources, in first-seen order.
    pub grounding_sources: Vec<SourceRecord>,
}

impl SessionResult {
    /// Combine a parsed answer with the session's grounding sources.
    pub fn from_parts(parsed: ParsedResponse, grounding_sources: Vec<SourceRecord>) -> Self {
        Self {
            answer: parsed.answer,
            citations: parsed.citations,
            follow_up_questions: parsed.follow_up_questions,
            grounding_sources,
        }
    }
}

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

/// Pre-extracted document text attached to a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// File name shown to the user and to the model.
    pub name: String,
    /// Extracted plain text.
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_roundtrip() {
        let id = SessionId::new();
        let s = id.to_string();
        let parsed: SessionId = s.parse().expect("parse SessionId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn session_result_serializes_camel_case() {
        let result = SessionResult {
            answer: "Sí.".into(),
            citations: vec![Citation {
                source: "Corte IDH".into(),
                quote: "texto".into(),
                url: None,
            }],
            follow_up_questions: vec!["¿Y después?".into()],
            grounding_sources: vec![SourceRecord::new("https://a.org", "A")],
        };

        let json = serde_json::to_value(&result).expect("serialize");
        assert!(json.get("followUpQuestions").is_some());
        assert!(json.get("groundingSources").is_some());
        // Absent URLs are omitted rather than serialized as null.
        assert!(json["citations"][0].get("url").is_none());

        let parsed: SessionResult = serde_json::from_value(json).expect("deserialize");
        assert_eq!(parsed, result);
    }

    #[test]
    fn raw_chunk_deserializes_with_defaults() {
        let chunk: RawChunk = serde_json::from_str(r#"{"text":"Hola"}"#).expect("parse");
        assert_eq!(chunk, RawChunk::text("Hola"));

        let chunk: RawChunk =
            serde_json::from_str(r#"{"sources":[{"uri":"https://x.org"}]}"#).expect("parse");
        assert!(chunk.text.is_none());
        assert_eq!(chunk.sources[0].title, "");
    }
}
