//! Amicus CLI: streaming legal research assistant.
//!
//! Sends questions (optionally with attached documents) to Gemini with web
//! search grounding, streams the answer, and shows its citations, sources
//! and suggested follow-up questions.

mod chat;
mod commands;
mod render;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
