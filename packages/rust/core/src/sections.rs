//! Section extraction over the raw answer text.
//!
//! The backend is instructed to emit three headed regions (answer,
//! citations, follow-up questions). The extractor walks the text line by
//! line with a small state machine, switching state on recognized heading
//! lines:
//!
//! ```text
//! Seeking ──answer──▶ InAnswer ──citations──▶ InCitations ──follow-ups──▶ InFollowUps
//!    │                   any first-time heading moves to that section
//!    └── any repeated heading ──▶ Discarding (until the next first-time heading)
//! ```
//!
//! Only the first occurrence of each heading is honored. Text following a
//! repeated heading is unreachable and dropped; sections are never merged.

use tracing::debug;

use amicus_shared::SectionHeadings;

/// The three regions of a structured answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Answer,
    Citations,
    FollowUps,
}

impl SectionKind {
    const ALL: [SectionKind; 3] = [Self::Answer, Self::Citations, Self::FollowUps];

    fn index(self) -> usize {
        match self {
            Self::Answer => 0,
            Self::Citations => 1,
            Self::FollowUps => 2,
        }
    }
}

/// Extracted section bodies, trimmed of surrounding whitespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sections {
    /// Answer body, or `None` when the answer heading never appeared.
    pub answer: Option<String>,
    /// Citations body (empty when absent).
    pub citations: String,
    /// Follow-up questions body (empty when absent).
    pub follow_ups: String,
}

/// Scanner state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before the first recognized heading.
    Seeking,
    InAnswer,
    InCitations,
    InFollowUps,
    /// After a repeated heading; lines are dropped.
    Discarding,
}

impl State {
    fn entering(kind: SectionKind) -> Self {
        match kind {
            SectionKind::Answer => Self::InAnswer,
            SectionKind::Citations => Self::InCitations,
            SectionKind::FollowUps => Self::InFollowUps,
        }
    }

    fn section(self) -> Option<SectionKind> {
        match self {
            Self::InAnswer => Some(SectionKind::Answer),
            Self::InCitations => Some(SectionKind::Citations),
            Self::InFollowUps => Some(SectionKind::FollowUps),
            Self::Seeking | Self::Discarding => None,
        }
    }
}

/// Splits raw answer text into [`Sections`] using a configured heading vocabulary.
#[derive(Debug, Clone)]
pub struct SectionExtractor {
    headings: SectionHeadings,
}

impl SectionExtractor {
    pub fn new(headings: SectionHeadings) -> Self {
        Self { headings }
    }

    fn marker(&self, kind: SectionKind) -> &str {
        match kind {
            SectionKind::Answer => &self.headings.answer,
            SectionKind::Citations => &self.headings.citations,
            SectionKind::FollowUps => &self.headings.follow_ups,
        }
    }

    /// Classify a line as a heading. The marker must start the line
    /// (case-sensitive) and be followed by nothing but whitespace.
    fn classify(&self, line: &str) -> Option<SectionKind> {
        SectionKind::ALL.into_iter().find(|&kind| {
            line.strip_prefix(self.marker(kind))
                .is_some_and(|rest| rest.trim().is_empty())
        })
    }

    /// Extract section bodies from `raw`, which may be a partial stream.
    pub fn extract(&self, raw: &str) -> Sections {
        let mut bodies: [Vec<&str>; 3] = Default::default();
        let mut seen = [false; 3];
        let mut state = State::Seeking;

        for line in raw.lines() {
            if let Some(kind) = self.classify(line) {
                let idx = kind.index();
                if seen[idx] {
                    debug!(?kind, "repeated section heading, dropping following text");
                    state = State::Discarding;
                } else {
                    seen[idx] = true;
                    state = State::entering(kind);
                }
                continue;
            }

            if let Some(kind) = state.section() {
                bodies[kind.index()].push(line);
            }
        }

        let [answer, citations, follow_ups] = bodies.map(|lines| lines.join("\n").trim().to_string());

        Sections {
            answer: seen[SectionKind::Answer.index()].then_some(answer),
            citations,
            follow_ups,
        }
    }
}
