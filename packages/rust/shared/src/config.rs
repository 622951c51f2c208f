//! Application configuration for Amicus.
//!
//! User config lives at `~/.amicus/amicus.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AmicusError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "amicus.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".amicus";

/// Placeholder replaced by the error detail in the transport error template.
pub const DETAILS_PLACEHOLDER: &str = "{details}";

// ---------------------------------------------------------------------------
// Config structs (matching amicus.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Generative backend settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Instructional prompt and prompt composition markers.
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Section heading vocabulary.
    #[serde(default)]
    pub sections: SectionHeadings,

    /// Citation block markers and delimiter strategy.
    #[serde(default)]
    pub citations: CitationFormat,

    /// User-facing strings.
    #[serde(default)]
    pub messages: MessagesConfig,

    /// Attachment ingestion limits.
    #[serde(default)]
    pub attachments: AttachmentsConfig,
}

/// `[gemini]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// API base URL, without trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Allow the model to ground its answer with web search.
    #[serde(default = "default_true")]
    pub search_enabled: bool,

    /// Whole-request timeout in seconds, enforced by the HTTP client.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            search_enabled: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_true() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    120
}

/// `[prompt]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Persona and analysis rules. Format rules are appended automatically
    /// from `[sections]` and `[citations]`.
    #[serde(default = "default_persona")]
    pub persona: String,

    /// Line opening the attached-document block.
    #[serde(default = "default_document_open")]
    pub document_open: String,

    /// Line closing the attached-document block.
    #[serde(default = "default_document_close")]
    pub document_close: String,

    /// Line introducing the user's literal question after document context.
    #[serde(default = "default_question_marker")]
    pub question_marker: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            persona: default_persona(),
            document_open: default_document_open(),
            document_close: default_document_close(),
            question_marker: default_question_marker(),
        }
    }
}

fn default_persona() -> String {
    "Eres un asistente experto en Derechos Humanos y redactor de documentos legales. \
     Responde con precisión y fundamenta cada afirmación en fuentes verificables.\n\n\
     Reglas de análisis:\n\
     1. Usa siempre la búsqueda web para localizar fuentes autorizadas y verificar los enlaces.\n\
     2. Cuando sea pertinente, realiza un examen de convencionalidad comparando la situación \
     consultada con los estándares internacionales encontrados."
        .into()
}
fn default_document_open() -> String {
    "=== DOCUMENTOS ADJUNTOS (CONTEXTO) ===".into()
}
fn default_document_close() -> String {
    "=== FIN DE LOS DOCUMENTOS ADJUNTOS ===".into()
}
fn default_question_marker() -> String {
    "=== PREGUNTA DEL USUARIO ===".into()
}

/// `[sections]` section: heading markers delimiting the answer regions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionHeadings {
    #[serde(default = "default_answer_heading")]
    pub answer: String,
    #[serde(default = "default_citations_heading")]
    pub citations: String,
    #[serde(default = "default_follow_ups_heading")]
    pub follow_ups: String,
}

impl Default for SectionHeadings {
    fn default() -> Self {
        Self {
            answer: default_answer_heading(),
            citations: default_citations_heading(),
            follow_ups: default_follow_ups_heading(),
        }
    }
}

fn default_answer_heading() -> String {
    "## Respuesta".into()
}
fn default_citations_heading() -> String {
    "## Citaciones".into()
}
fn default_follow_ups_heading() -> String {
    "## Preguntas de Seguimiento".into()
}

/// How entries are separated inside the citations section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DelimiterStrategy {
    /// A separator line (e.g. `---`) sits between entries.
    #[default]
    Separator,
    /// Every source-label line opens a new entry.
    SourcePrefix,
}

/// `[citations]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationFormat {
    /// Label word preceding the source name (matched with or without bold/colon drift).
    #[serde(default = "default_source_label")]
    pub source_label: String,

    /// Label word preceding the quoted passage.
    #[serde(default = "default_quote_label")]
    pub quote_label: String,

    /// Label word preceding the document URL.
    #[serde(default = "default_url_label")]
    pub url_label: String,

    /// Line prefix marking quoted-block lines.
    #[serde(default = "default_quote_prefix")]
    pub quote_prefix: String,

    /// Entry delimiter strategy.
    #[serde(default)]
    pub delimiter: DelimiterStrategy,

    /// Separator line used by [`DelimiterStrategy::Separator`].
    #[serde(default = "default_separator")]
    pub separator: String,
}

impl Default for CitationFormat {
    fn default() -> Self {
        Self {
            source_label: default_source_label(),
            quote_label: default_quote_label(),
            url_label: default_url_label(),
            quote_prefix: default_quote_prefix(),
            delimiter: DelimiterStrategy::default(),
            separator: default_separator(),
        }
    }
}

fn default_source_label() -> String {
    "Fuente".into()
}
fn default_quote_label() -> String {
    "Texto".into()
}
fn default_url_label() -> String {
    "URL".into()
}
fn default_quote_prefix() -> String {
    ">".into()
}
fn default_separator() -> String {
    "---".into()
}

/// `[messages]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesConfig {
    /// Answer used when the backend produced no text at all.
    #[serde(default = "default_fallback_answer")]
    pub fallback_answer: String,

    /// Replaces the in-progress answer when streaming fails.
    /// `{details}` is substituted with the underlying error detail.
    #[serde(default = "default_transport_error")]
    pub transport_error: String,

    /// Title given to grounding sources the backend left untitled.
    #[serde(default = "default_untitled_source")]
    pub untitled_source: String,

    /// First message shown by interactive front ends.
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            fallback_answer: default_fallback_answer(),
            transport_error: default_transport_error(),
            untitled_source: default_untitled_source(),
            greeting: default_greeting(),
        }
    }
}

fn default_fallback_answer() -> String {
    "No se pudo generar una respuesta clara. Por favor, reformule su pregunta.".into()
}
fn default_transport_error() -> String {
    "Lo siento, ha ocurrido un error al procesar su solicitud. Por favor, inténtelo de nuevo \
     más tarde o simplifique su consulta. Detalles del error: {details}"
        .into()
}
fn default_untitled_source() -> String {
    "Fuente sin título".into()
}
fn default_greeting() -> String {
    "¡Hola! Soy tu asistente experto. ¿En qué puedo ayudarte hoy?".into()
}

/// `[attachments]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentsConfig {
    /// Maximum accepted file size in MiB.
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,
}

impl Default for AttachmentsConfig {
    fn default() -> Self {
        Self {
            max_size_mb: default_max_size_mb(),
        }
    }
}

impl AttachmentsConfig {
    /// Size limit in bytes.
    pub fn max_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }
}

fn default_max_size_mb() -> u64 {
    10
}

// ---------------------------------------------------------------------------
// Assistant settings (runtime, derived from config)
// ---------------------------------------------------------------------------

/// Runtime settings for the response pipeline. Read-only once built.
#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub headings: SectionHeadings,
    pub citations: CitationFormat,
    pub prompt: PromptConfig,
    pub fallback_answer: String,
    pub transport_error: String,
    pub search_enabled: bool,
    pub temperature: f32,
}

impl From<&AppConfig> for AssistantSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            headings: config.sections.clone(),
            citations: config.citations.clone(),
            prompt: config.prompt.clone(),
            fallback_answer: config.messages.fallback_answer.clone(),
            transport_error: config.messages.transport_error.clone(),
            search_enabled: config.gemini.search_enabled,
            temperature: config.gemini.temperature,
        }
    }
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.amicus/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| AmicusError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.amicus/amicus.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load and validate the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AmicusError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| AmicusError::config(format!("failed to parse {}: {e}", path.display())))?;

    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    init_config_in(&dir)
}

/// Write a default config file into `dir`, creating it if needed.
pub fn init_config_in(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| AmicusError::io(dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| AmicusError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| AmicusError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject configurations the pipeline cannot work with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    Url::parse(&config.gemini.base_url).map_err(|e| {
        AmicusError::config(format!("invalid gemini.base_url '{}': {e}", config.gemini.base_url))
    })?;

    if !(0.0..=2.0).contains(&config.gemini.temperature) {
        return Err(AmicusError::config(format!(
            "gemini.temperature must be between 0 and 2, got {}",
            config.gemini.temperature
        )));
    }

    let headings = [
        &config.sections.answer,
        &config.sections.citations,
        &config.sections.follow_ups,
    ];
    if headings.iter().any(|h| h.trim().is_empty()) {
        return Err(AmicusError::config("section headings must not be empty"));
    }
    if headings[0] == headings[1] || headings[0] == headings[2] || headings[1] == headings[2] {
        return Err(AmicusError::config("section headings must be distinct"));
    }

    let labels = [
        &config.citations.source_label,
        &config.citations.quote_label,
        &config.citations.url_label,
        &config.citations.quote_prefix,
    ];
    if labels.iter().any(|l| l.trim().is_empty()) {
        return Err(AmicusError::config("citation labels must not be empty"));
    }
    if config.citations.delimiter == DelimiterStrategy::Separator
        && config.citations.separator.trim().is_empty()
    {
        return Err(AmicusError::config(
            "citations.separator is required for the separator delimiter strategy",
        ));
    }

    if config.attachments.max_size_mb == 0 {
        return Err(AmicusError::config("attachments.max_size_mb must be positive"));
    }

    Ok(())
}

/// Read the Gemini API key from the configured env var.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.gemini.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(AmicusError::config(format!(
            "Gemini API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://aistudio.google.com/apikey"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("GEMINI_API_KEY"));
        assert!(toml_str.contains("## Respuesta"));
        assert!(toml_str.contains("delimiter = \"separator\""));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.gemini.model, "gemini-2.5-flash");
        assert_eq!(parsed.sections, SectionHeadings::default());
        assert_eq!(parsed.attachments.max_bytes(), 10 * 1024 * 1024);
        validate_config(&parsed).expect("defaults are valid");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r###"
[sections]
answer = "## Answer"
citations = "## Sources"
follow_ups = "## Follow-ups"

[citations]
source_label = "Source"
delimiter = "source-prefix"
"###;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.sections.citations, "## Sources");
        assert_eq!(config.citations.source_label, "Source");
        assert_eq!(config.citations.quote_label, "Texto");
        assert_eq!(config.citations.delimiter, DelimiterStrategy::SourcePrefix);
        assert!(config.gemini.search_enabled);
    }

    #[test]
    fn settings_from_app_config() {
        let mut app = AppConfig::default();
        app.gemini.temperature = 0.7;
        app.gemini.search_enabled = false;
        let settings = AssistantSettings::from(&app);
        assert_eq!(settings.temperature, 0.7);
        assert!(!settings.search_enabled);
        assert!(settings.transport_error.contains(DETAILS_PLACEHOLDER));
    }

    #[test]
    fn validation_rejects_duplicate_headings() {
        let mut config = AppConfig::default();
        config.sections.follow_ups = config.sections.citations.clone();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("distinct"));
    }

    #[test]
    fn validation_rejects_bad_base_url() {
        let mut config = AppConfig::default();
        config.gemini.base_url = "not a url".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn huge_attachment_limit_saturates() {
        let attachments = AttachmentsConfig {
            max_size_mb: u64::MAX / 2,
        };
        assert_eq!(attachments.max_bytes(), u64::MAX);
        let attachments = AttachmentsConfig { max_size_mb: 1 };
        assert_eq!(attachments.max_bytes(), 1024 * 1024);
    }

    #[test]
    fn init_and_load_from_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = init_config_in(dir.path()).expect("init");
        let loaded = load_config_from(&path).expect("load");
        assert_eq!(loaded.messages.untitled_source, "Fuente sin título");
    }

    #[test]
    fn api_key_resolution() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.gemini.api_key_env = "AMICUS_TEST_NONEXISTENT_KEY_12345".into();
        let result = resolve_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
