//! Follow-up question list parsing.

use std::sync::LazyLock;

use regex::Regex;

/// Matches a leading list marker: `-`, `* `, `•`, `1.` or `1)`.
/// A bare `*` needs trailing whitespace so bold text is left intact.
static LIST_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[-•]\s*|\*\s+|\d{1,2}[.)]\s*)").expect("list marker regex")
});

/// Split the follow-up section body into questions, one per non-empty line,
/// with list markers stripped. Order is preserved.
pub fn parse_follow_ups(body: &str) -> Vec<String> {
    body.lines()
        .map(|line| {
            let trimmed = line.trim();
            LIST_MARKER_RE.replace(trimmed, "").trim().to_string()
        })
        .filter(|q| !q.is_empty())
        .collect()
}
