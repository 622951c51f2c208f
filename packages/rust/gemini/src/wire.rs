//! Request and response bodies of the `streamGenerateContent` endpoint.

use serde::{Deserialize, Serialize};

use amicus_shared::{AmicusError, GenerationRequest, RawChunk, Result, SourceRecord};

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    system_instruction: Content<'a>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Debug, Serialize)]
struct GoogleSearch {}

impl<'a> GenerateContentRequest<'a> {
    pub(crate) fn from_request(request: &'a GenerationRequest) -> Self {
        let tools = if request.search_enabled {
            vec![Tool {
                google_search: GoogleSearch {},
            }]
        } else {
            Vec::new()
        };

        Self {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![TextPart {
                    text: &request.prompt,
                }],
            }],
            system_instruction: Content {
                role: None,
                parts: vec![TextPart {
                    text: &request.system_instruction,
                }],
            },
            generation_config: GenerationConfig {
                temperature: request.temperature,
            },
            tools,
        }
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamEvent {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Default, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebSource>,
}

#[derive(Debug, Default, Deserialize)]
struct WebSource {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// Error object, both as an HTTP error body and as an in-stream event.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl ApiError {
    fn into_error(self, fallback_status: u16) -> AmicusError {
        let message = self
            .message
            .filter(|m| !m.trim().is_empty())
            .or(self.status)
            .unwrap_or_else(|| "unknown backend error".to_string());
        AmicusError::Backend {
            status: self.code.unwrap_or(fallback_status),
            message,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ApiError,
}

/// Map a non-success HTTP response body to a backend error. Bodies that are
/// not the usual `{"error": {...}}` object are passed through verbatim.
pub(crate) fn http_error(status: u16, body: &str) -> AmicusError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error.into_error(status),
        Err(_) => AmicusError::Backend {
            status,
            message: if body.trim().is_empty() {
                format!("HTTP {status}")
            } else {
                body.trim().to_string()
            },
        },
    }
}

/// Decode one SSE `data` payload. `Ok(None)` means the event carried
/// neither text nor sources.
pub(crate) fn decode_event(data: &str, untitled_source: &str) -> Result<Option<RawChunk>> {
    let event: StreamEvent = serde_json::from_str(data)
        .map_err(|e| AmicusError::Transport(format!("malformed stream event: {e}")))?;

    if let Some(error) = event.error {
        return Err(error.into_error(500));
    }

    let Some(candidate) = event.candidates.into_iter().next() else {
        return Ok(None);
    };

    let text: String = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter(|p| !p.thought)
        .filter_map(|p| p.text)
        .collect();

    let sources: Vec<SourceRecord> = candidate
        .grounding_metadata
        .map(|m| m.grounding_chunks)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|chunk| chunk.web)
        .map(|web| SourceRecord {
            uri: web.uri.unwrap_or_default(),
            title: web
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| untitled_source.to_string()),
        })
        .collect();

    if text.is_empty() && sources.is_empty() {
        return Ok(None);
    }

    Ok(Some(RawChunk {
        text: (!text.is_empty()).then_some(text),
        sources,
    }))
}
