//! Caller-facing assistant boundary.
//!
//! The assistant accepts one query at a time. A second submission while a
//! session is still streaming is rejected with [`AmicusError::Busy`]; the
//! busy flag is released when the [`ActiveQuery`] is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, instrument};

use amicus_shared::{
    AmicusError, AssistantSettings, Attachment, DETAILS_PLACEHOLDER, ParsedResponse, Result,
    SessionResult,
};

use crate::backend::GenerativeBackend;
use crate::prompt::document_context;
use crate::session::{SessionController, SessionHandle};

/// Resets the busy flag on drop.
#[derive(Debug)]
struct BusyGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// A running query. Holds the assistant's busy slot until dropped.
#[derive(Debug)]
pub struct ActiveQuery {
    handle: SessionHandle,
    _guard: BusyGuard,
}

impl ActiveQuery {
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn handle_mut(&mut self) -> &mut SessionHandle {
        &mut self.handle
    }

    /// Drive the session to completion; see [`SessionHandle::run`].
    pub async fn run<F>(&mut self, on_delta: F) -> Result<SessionResult>
    where
        F: FnMut(&str),
    {
        self.handle.run(on_delta).await
    }

    /// Drive the session with live previews; see
    /// [`SessionHandle::run_with_preview`].
    pub async fn run_with_preview<F, P>(&mut self, on_delta: F, on_preview: P) -> Result<SessionResult>
    where
        F: FnMut(&str),
        P: FnMut(&ParsedResponse),
    {
        self.handle.run_with_preview(on_delta, on_preview).await
    }
}

/// Single-flight front end over a [`SessionController`].
#[derive(Debug)]
pub struct Assistant {
    controller: SessionController,
    busy: Arc<AtomicBool>,
}

impl Assistant {
    pub fn new(backend: Arc<dyn GenerativeBackend>, settings: AssistantSettings) -> Result<Self> {
        Ok(Self {
            controller: SessionController::new(backend, settings)?,
            busy: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Validate the question, claim the busy slot and start a session.
    #[instrument(skip_all, fields(attachments = attachments.len()))]
    pub async fn begin(&self, text: &str, attachments: &[Attachment]) -> Result<ActiveQuery> {
        let query = text.trim();
        if query.is_empty() {
            return Err(AmicusError::validation("the question is empty"));
        }

        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("rejecting query while another one is streaming");
            return Err(AmicusError::Busy);
        }
        let guard = BusyGuard {
            flag: Arc::clone(&self.busy),
        };

        let context = document_context(attachments);
        let handle = self.controller.start(query, context.as_deref()).await?;
        Ok(ActiveQuery {
            handle,
            _guard: guard,
        })
    }

    /// Start a query and drive it to its outcome in one call.
    pub async fn submit_query<F>(
        &self,
        text: &str,
        attachments: &[Attachment],
        on_delta: F,
    ) -> Result<SessionResult>
    where
        F: FnMut(&str),
    {
        let mut active = self.begin(text, attachments).await?;
        active.run(on_delta).await
    }

    /// User-facing message for a failed query.
    pub fn failure_message(&self, error: &AmicusError) -> String {
        self.controller
            .settings()
            .transport_error
            .replace(DETAILS_PLACEHOLDER, &error.detail())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::{ScriptedBackend, Transcript};

    fn assistant(transcript: Transcript) -> Assistant {
        Assistant::new(
            Arc::new(ScriptedBackend::new(transcript)),
            AssistantSettings::default(),
        )
        .expect("assistant")
    }

    #[tokio::test]
    async fn submit_query_returns_structured_result() {
        let a = assistant(Transcript::from_texts([
            "## Respuesta\nSí.\n",
            "## Preguntas de Seguimiento\n- ¿Y después?\n",
        ]));
        let mut streamed = String::new();
        let result = a
            .submit_query("¿Procede?", &[], |d| streamed.push_str(d))
            .await
            .expect("result");

        assert_eq!(result.answer, "Sí.");
        assert_eq!(result.follow_up_questions, vec!["¿Y después?"]);
        assert!(streamed.starts_with("## Respuesta"));
        assert!(!a.is_busy());
    }

    #[tokio::test]
    async fn empty_question_is_rejected() {
        let a = assistant(Transcript::default());
        let err = a.submit_query("   ", &[], |_| {}).await.unwrap_err();
        assert!(matches!(err, AmicusError::Validation { .. }));
        assert!(!a.is_busy());
    }

    #[tokio::test]
    async fn second_query_while_streaming_is_busy() {
        let transcript = Transcript {
            hold_open: true,
            ..Transcript::from_texts(["## Respuesta\n"])
        };
        let backend = ScriptedBackend::new(transcript).with_chunk_delay(Duration::from_millis(5));
        let a = Assistant::new(Arc::new(backend), AssistantSettings::default()).expect("assistant");

        let active = a.begin("primera", &[]).await.expect("first");
        assert!(a.is_busy());
        let err = a.begin("segunda", &[]).await.unwrap_err();
        assert!(matches!(err, AmicusError::Busy));

        drop(active);
        assert!(!a.is_busy());
        let mut again = a.begin("tercera", &[]).await.expect("slot released");
        again.handle_mut().abort();
        assert!(matches!(again.run(|_| {}).await, Err(AmicusError::Cancelled)));
    }

    #[tokio::test]
    async fn open_failure_releases_busy_slot() {
        let backend = ScriptedBackend::failing_to_open(crate::backend::ScriptedFailure::Transport {
            message: "dns error".into(),
        });
        let a = Assistant::new(Arc::new(backend), AssistantSettings::default()).expect("assistant");
        let err = a.submit_query("q", &[], |_| {}).await.unwrap_err();
        assert!(matches!(err, AmicusError::Transport(_)));
        assert!(!a.is_busy());

        let message = a.failure_message(&err);
        assert!(message.contains("dns error"));
        assert!(!message.contains(DETAILS_PLACEHOLDER));
    }

    #[tokio::test]
    async fn attachments_reach_the_prompt() {
        let backend = Arc::new(ScriptedBackend::new(Transcript::default()));
        let a = Assistant::new(backend.clone(), AssistantSettings::default()).expect("assistant");
        let docs = [Attachment {
            name: "contrato.docx".into(),
            text: "Cláusula primera".into(),
        }];
        a.submit_query("¿Es abusiva?", &docs, |_| {})
            .await
            .expect("result");

        let prompt = &backend.requests()[0].prompt;
        assert!(prompt.contains("[contrato.docx]\nCláusula primera"));
        assert!(prompt.ends_with("¿Es abusiva?"));
    }
}
