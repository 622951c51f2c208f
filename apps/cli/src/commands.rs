//! CLI command definitions, routing, and tracing setup.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use amicus_attachments::load_attachments;
use amicus_core::{Assistant, GenerativeBackend, ResponseParser, ScriptedBackend, Transcript};
use amicus_gemini::GeminiBackend;
use amicus_shared::{
    AmicusError, AppConfig, AssistantSettings, Attachment, ParsedResponse, SessionResult,
    init_config, load_config, load_config_from, resolve_api_key,
};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::chat;
use crate::render;

/// Delay between replayed chunks, so `--replay` looks like a live stream.
const REPLAY_CHUNK_DELAY: Duration = Duration::from_millis(40);

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Amicus: a streaming legal research assistant.
#[derive(Parser)]
#[command(
    name = "amicus",
    version,
    about = "Ask a human-rights law assistant and get cited, grounded answers.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.amicus/amicus.toml.
    #[arg(long, global = true, env = "AMICUS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Ask a single question and stream the answer.
    Ask {
        /// The question.
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// Attach a PDF, DOCX or text file as document context (repeatable).
        #[arg(short, long)]
        attach: Vec<PathBuf>,

        /// Print the structured result as JSON instead of streaming text.
        #[arg(long)]
        json: bool,

        /// Replay a recorded transcript instead of calling Gemini.
        #[arg(long)]
        replay: Option<PathBuf>,
    },

    /// Interactive session: ask, pick follow-ups by number, attach files.
    Chat {
        /// Files attached from the start (repeatable).
        #[arg(short, long)]
        attach: Vec<PathBuf>,

        /// Replay a recorded transcript for every question.
        #[arg(long)]
        replay: Option<PathBuf>,
    },

    /// Parse a saved raw answer (`-` for stdin) into its sections.
    Parse {
        /// Markdown file with the model's raw answer.
        file: PathBuf,

        /// Print JSON instead of formatted text.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr; stdout carries
/// the answer.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "amicus=warn",
        1 => "amicus=info",
        2 => "amicus=debug",
        _ => "amicus=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Ask {
            question,
            attach,
            json,
            replay,
        } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_ask(&config, &question.join(" "), &attach, json, replay.as_deref()).await
        }
        Command::Chat { attach, replay } => {
            let config = resolve_config(config_path.as_deref())?;
            let assistant = build_assistant(&config, replay.as_deref())?;
            let attachments = load_attachments(&attach, config.attachments.max_bytes())?;
            chat::run(&config, &assistant, attachments).await
        }
        Command::Parse { file, json } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_parse(&config, &file, json)
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_deref()).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Pick the backend: a transcript replay when requested, Gemini otherwise.
pub(crate) fn build_assistant(config: &AppConfig, replay: Option<&Path>) -> Result<Assistant> {
    let backend: Arc<dyn GenerativeBackend> = match replay {
        Some(path) => {
            let transcript = Transcript::load(path)?;
            info!(path = %path.display(), chunks = transcript.chunks.len(), "replaying transcript");
            Arc::new(ScriptedBackend::new(transcript).with_chunk_delay(REPLAY_CHUNK_DELAY))
        }
        None => {
            let api_key = resolve_api_key(config)?;
            Arc::new(GeminiBackend::from_app_config(config, api_key)?)
        }
    };
    Ok(Assistant::new(backend, AssistantSettings::from(config))?)
}

// ---------------------------------------------------------------------------
// Query execution
// ---------------------------------------------------------------------------

/// Spinner shown until the first delta arrives.
fn waiting_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.set_message("Consultando fuentes...");
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Spinner text while a quiet query streams.
fn progress_message(preview: &ParsedResponse) -> String {
    format!(
        "Recibiendo respuesta... {} caracteres, {} cita(s)",
        preview.answer.chars().count(),
        preview.citations.len()
    )
}

/// Run one query to completion. Deltas are echoed to stdout unless `quiet`;
/// in quiet mode the spinner tracks a live preview instead.
/// Ctrl-C aborts the session. Stream failures are reported to the user and
/// returned as `Ok(None)`; anything raised before streaming is an error.
pub(crate) async fn run_query(
    assistant: &Assistant,
    question: &str,
    attachments: &[Attachment],
    quiet: bool,
) -> Result<Option<SessionResult>> {
    let spinner = waiting_spinner();
    let mut active = match assistant.begin(question, attachments).await {
        Ok(active) => active,
        Err(e) => {
            spinner.finish_and_clear();
            if e.is_stream_failure() {
                eprintln!("{}", assistant.failure_message(&e));
                return Ok(None);
            }
            return Err(e.into());
        }
    };

    let abort = active.handle().abort_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    let mut first = true;
    let outcome = if quiet {
        active
            .run_with_preview(|_| {}, |preview| spinner.set_message(progress_message(preview)))
            .await
    } else {
        let mut stdout = std::io::stdout();
        active
            .run(|delta| {
                if first {
                    spinner.finish_and_clear();
                    first = false;
                }
                let _ = stdout.write_all(delta.as_bytes());
                let _ = stdout.flush();
            })
            .await
    };
    ctrl_c.abort();
    spinner.finish_and_clear();
    if !first {
        println!();
    }

    match outcome {
        Ok(result) => Ok(Some(result)),
        Err(AmicusError::Cancelled) => {
            eprintln!("(consulta cancelada)");
            Ok(None)
        }
        Err(e) if e.is_stream_failure() => {
            eprintln!("{}", assistant.failure_message(&e));
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ask(
    config: &AppConfig,
    question: &str,
    attach: &[PathBuf],
    json: bool,
    replay: Option<&Path>,
) -> Result<()> {
    let attachments = load_attachments(attach, config.attachments.max_bytes())?;
    let assistant = build_assistant(config, replay)?;

    info!(attachments = attachments.len(), json, "asking");

    let Some(result) = run_query(&assistant, question, &attachments, json).await? else {
        std::process::exit(1);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render::answer_trailer(&result));
    }
    Ok(())
}

fn cmd_parse(config: &AppConfig, file: &Path, json: bool) -> Result<()> {
    let raw = if file == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .wrap_err("failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(file).map_err(|e| AmicusError::io(file, e))?
    };

    let parser = ResponseParser::new(&AssistantSettings::from(config))?;
    let parsed = parser.parse(&raw);

    if json {
        println!("{}", serde_json::to_string_pretty(&parsed)?);
    } else {
        print!("{}", render::parsed_response(&parsed));
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn ask_joins_words_and_collects_attachments() {
        let cli = Cli::try_parse_from([
            "amicus", "-v", "ask", "¿Qué", "es", "el", "amparo?", "--attach", "a.pdf", "-a",
            "b.docx", "--json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Ask {
                question,
                attach,
                json,
                replay,
            } => {
                assert_eq!(question.join(" "), "¿Qué es el amparo?");
                assert_eq!(attach, vec![PathBuf::from("a.pdf"), PathBuf::from("b.docx")]);
                assert!(json);
                assert!(replay.is_none());
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn ask_requires_a_question() {
        assert!(Cli::try_parse_from(["amicus", "ask"]).is_err());
    }

    #[test]
    fn progress_message_counts_answer_and_citations() {
        let preview = ParsedResponse {
            answer: "Sí procede".into(),
            citations: vec![amicus_shared::Citation {
                source: "CPEUM".into(),
                quote: "cita".into(),
                url: None,
            }],
            ..ParsedResponse::default()
        };
        assert_eq!(
            progress_message(&preview),
            "Recibiendo respuesta... 10 caracteres, 1 cita(s)"
        );
    }

    #[tokio::test]
    async fn replayed_query_returns_result() {
        let config = AppConfig::default();
        let assistant = build_assistant(
            &config,
            Some(Path::new("../../fixtures/transcripts/sample.json")),
        )
        .unwrap();
        let result = run_query(&assistant, "¿Qué dice el artículo 1o?", &[], true)
            .await
            .unwrap()
            .expect("completed session");
        assert!(!result.answer.is_empty());
        assert_eq!(result.grounding_sources.len(), 2);
    }
}
