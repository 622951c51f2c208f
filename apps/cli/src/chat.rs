//! Interactive chat loop.

use std::io::Write;
use std::path::{Path, PathBuf};

use amicus_attachments::load_attachment;
use amicus_core::Assistant;
use amicus_shared::{AmicusError, AppConfig, Attachment};
use color_eyre::eyre::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::commands::run_query;
use crate::render;

const HELP: &str = "Comandos: /attach <archivo>, /clear, /help, /quit. \
                    Escriba el número de una pregunta sugerida para hacerla.";

/// One line of user input, interpreted.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Empty,
    Quit,
    Clear,
    Help,
    Attach(PathBuf),
    Question(String),
    Unknown(String),
}

/// A bare number within range picks that follow-up question; anything else
/// that is not a command is asked as-is.
fn interpret(line: &str, follow_ups: &[String]) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }

    if let Some(command) = line.strip_prefix('/') {
        let (name, arg) = command
            .split_once(char::is_whitespace)
            .map(|(n, a)| (n, a.trim()))
            .unwrap_or((command, ""));
        return match name {
            "quit" | "exit" | "q" => Input::Quit,
            "clear" => Input::Clear,
            "help" | "?" => Input::Help,
            "attach" if !arg.is_empty() => Input::Attach(PathBuf::from(arg)),
            _ => Input::Unknown(line.to_string()),
        };
    }

    if let Ok(n) = line.parse::<usize>() {
        if let Some(question) = n.checked_sub(1).and_then(|i| follow_ups.get(i)) {
            return Input::Question(question.clone());
        }
    }
    Input::Question(line.to_string())
}

/// Attachment problems are the user's to fix; anything else is a read error.
fn attach_failure(path: &Path, error: &AmicusError) -> String {
    if error.is_attachment_error() {
        format!("No se pudo adjuntar: {error}")
    } else {
        format!("No se pudo leer {}: {error}", path.display())
    }
}

fn prompt(attachments: &[Attachment]) {
    if attachments.is_empty() {
        print!("› ");
    } else {
        print!("[{} adjunto(s)] › ", attachments.len());
    }
    let _ = std::io::stdout().flush();
}

/// Read questions from stdin until `/quit`, EOF or Ctrl-C at the prompt.
pub(crate) async fn run(
    config: &AppConfig,
    assistant: &Assistant,
    mut attachments: Vec<Attachment>,
) -> Result<()> {
    let max_bytes = config.attachments.max_bytes();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut follow_ups: Vec<String> = Vec::new();

    println!("{}", config.messages.greeting);
    println!("{HELP}\n");

    loop {
        prompt(&attachments);
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        let Some(line) = line else {
            println!();
            break;
        };

        match interpret(&line, &follow_ups) {
            Input::Empty => {}
            Input::Quit => break,
            Input::Help => println!("{HELP}"),
            Input::Unknown(cmd) => println!("Comando desconocido: {cmd}. {HELP}"),
            Input::Clear => {
                attachments.clear();
                follow_ups.clear();
                println!("Adjuntos y sugerencias borrados.");
            }
            Input::Attach(path) => match load_attachment(&path, max_bytes) {
                Ok(attachment) => {
                    println!(
                        "Adjuntado {} ({} caracteres).",
                        attachment.name,
                        attachment.text.chars().count()
                    );
                    attachments.push(attachment);
                }
                Err(e) => println!("{}", attach_failure(&path, &e)),
            },
            Input::Question(question) => {
                debug!(len = question.len(), "chat question");
                println!();
                let Some(result) = run_query(assistant, &question, &attachments, false).await?
                else {
                    continue;
                };

                print!("{}", render::answer_trailer(&result));
                follow_ups = result.follow_up_questions;
                if !follow_ups.is_empty() {
                    println!("\nSugerencias (escriba el número):");
                    print!("{}", render::follow_up_list(&follow_ups));
                }
                println!();
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suggestions() -> Vec<String> {
        vec!["¿Primera?".into(), "¿Segunda?".into()]
    }

    #[test]
    fn commands() {
        assert_eq!(interpret("  ", &[]), Input::Empty);
        assert_eq!(interpret("/quit", &[]), Input::Quit);
        assert_eq!(interpret("/clear", &[]), Input::Clear);
        assert_eq!(
            interpret("/attach  contrato final.docx ", &[]),
            Input::Attach(PathBuf::from("contrato final.docx"))
        );
        assert_eq!(interpret("/attach", &[]), Input::Unknown("/attach".into()));
    }

    #[test]
    fn numbers_pick_follow_ups_in_range() {
        let s = suggestions();
        assert_eq!(interpret("2", &s), Input::Question("¿Segunda?".into()));
        assert_eq!(interpret("0", &s), Input::Question("0".into()));
        assert_eq!(interpret("3", &s), Input::Question("3".into()));
    }

    #[test]
    fn attach_failures_distinguish_rejections_from_read_errors() {
        let path = Path::new("notas.xlsx");
        let rejected = AmicusError::UnsupportedAttachment {
            name: "notas.xlsx".into(),
        };
        assert!(attach_failure(path, &rejected).starts_with("No se pudo adjuntar: "));

        let missing = AmicusError::io(path, std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(attach_failure(path, &missing).starts_with("No se pudo leer notas.xlsx: "));
    }

    #[test]
    fn free_text_is_a_question() {
        assert_eq!(
            interpret("¿Qué es el amparo?", &suggestions()),
            Input::Question("¿Qué es el amparo?".into())
        );
    }
}
