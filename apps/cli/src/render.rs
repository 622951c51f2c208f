//! Plain-text rendering of parsed answers for the terminal.

use std::fmt::Write as _;

use amicus_shared::{Citation, ParsedResponse, SessionResult, SourceRecord};

/// One citation as a labelled block with the quote indented.
pub(crate) fn citation_block(index: usize, citation: &Citation) -> String {
    let mut out = format!("[{index}] {}\n", citation.source);
    for line in citation.quote.lines() {
        if line.trim().is_empty() {
            out.push_str("    \n");
        } else {
            let _ = writeln!(out, "    │ {line}");
        }
    }
    if let Some(url) = &citation.url {
        let _ = writeln!(out, "    {url}");
    }
    out
}

/// The citations section, numbered from one. Empty when there are none.
pub(crate) fn citation_list(citations: &[Citation]) -> String {
    if citations.is_empty() {
        return String::new();
    }
    let mut out = String::from("\nCitaciones\n");
    for (i, citation) in citations.iter().enumerate() {
        out.push('\n');
        out.push_str(&citation_block(i + 1, citation));
    }
    out
}

/// Numbered follow-up questions, one per line.
pub(crate) fn follow_up_list(questions: &[String]) -> String {
    questions
        .iter()
        .enumerate()
        .map(|(i, q)| format!("  {}. {q}\n", i + 1))
        .collect()
}

/// Web sources as `title <uri>` lines.
pub(crate) fn source_list(sources: &[SourceRecord]) -> String {
    sources
        .iter()
        .map(|s| format!("  • {} <{}>\n", s.title, s.uri))
        .collect()
}

/// Citations and web sources printed after a streamed answer.
pub(crate) fn answer_trailer(result: &SessionResult) -> String {
    let mut out = citation_list(&result.citations);
    if !result.grounding_sources.is_empty() {
        out.push_str("\nFuentes consultadas\n");
        out.push_str(&source_list(&result.grounding_sources));
    }
    out
}

/// Full structured rendering of a parsed response.
pub(crate) fn parsed_response(parsed: &ParsedResponse) -> String {
    let mut out = String::new();
    out.push_str(parsed.answer.trim());
    out.push('\n');

    out.push_str(&citation_list(&parsed.citations));

    if !parsed.follow_up_questions.is_empty() {
        out.push_str("\nPreguntas de seguimiento\n");
        out.push_str(&follow_up_list(&parsed.follow_up_questions));
    }
    out
}
