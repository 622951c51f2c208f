//! Citation block parser.
//!
//! The citations section holds entries shaped like:
//!
//! ```text
//! **Fuente:** Caso Velásquez Rodríguez vs. Honduras, Corte IDH
//! **Texto:**
//! > El Estado está en el deber jurídico de prevenir...
//! > ...razonablemente, las violaciones de los derechos humanos.
//! **URL:** https://www.corteidh.or.cr/docs/casos/articulos/seriec_04_esp.pdf
//!
//! ---
//! ```
//!
//! Labels are matched loosely (bold markers before or after the colon,
//! optional list bullet, any ASCII case) because models drift from the
//! requested format. Entries are separated either by a separator line or by
//! the source label itself, depending on [`DelimiterStrategy`].

use regex::Regex;
use tracing::debug;

use amicus_shared::{AmicusError, Citation, CitationFormat, DelimiterStrategy, Result};

/// Parses a citations section body into [`Citation`] records.
#[derive(Debug, Clone)]
pub struct CitationParser {
    format: CitationFormat,
    source_re: Regex,
    quote_re: Regex,
    url_re: Regex,
    link_re: Regex,
}

/// Drop a closing bold marker left over from `**Label: value**`.
fn strip_closing_emphasis(value: &str) -> &str {
    value
        .trim()
        .trim_end_matches("**")
        .trim_end_matches("__")
        .trim_end()
}

/// Build a line matcher for `label`, capturing the rest of the line.
fn label_regex(label: &str) -> Result<Regex> {
    let pattern = format!(
        r"^\s*(?:[-*]\s+)?(?:\*\*|__)?(?i:{})(?:\*\*|__)?\s*:\s*(?:\*\*|__)?\s*(.*)$",
        regex::escape(label.trim())
    );
    Regex::new(&pattern)
        .map_err(|e| AmicusError::config(format!("invalid citation label '{label}': {e}")))
}

impl CitationParser {
    pub fn new(format: CitationFormat) -> Result<Self> {
        let link_re = Regex::new(r"^\[[^\]]*\]\(\s*([^)\s]+)\s*\)")
            .map_err(|e| AmicusError::config(e.to_string()))?;
        Ok(Self {
            source_re: label_regex(&format.source_label)?,
            quote_re: label_regex(&format.quote_label)?,
            url_re: label_regex(&format.url_label)?,
            link_re,
            format,
        })
    }

    /// Parse every well-formed entry in `body`, in document order.
    pub fn parse(&self, body: &str) -> Vec<Citation> {
        let entries = self.split_entries(body);
        let total = entries.len();

        let citations: Vec<Citation> = entries
            .iter()
            .filter_map(|lines| self.parse_entry(lines))
            .collect();

        if citations.len() < total {
            debug!(
                entries = total,
                kept = citations.len(),
                "discarded citation entries without source or quote"
            );
        }
        citations
    }

    // -----------------------------------------------------------------------
    // Entry splitting
    // -----------------------------------------------------------------------

    fn is_separator(&self, line: &str) -> bool {
        self.format.delimiter == DelimiterStrategy::Separator
            && line.trim() == self.format.separator.trim()
    }

    fn split_entries<'a>(&self, body: &'a str) -> Vec<Vec<&'a str>> {
        let mut entries: Vec<Vec<&'a str>> = Vec::new();
        let mut current: Vec<&'a str> = Vec::new();
        let mut current_has_source = false;

        for line in body.lines() {
            if self.is_separator(line) {
                entries.push(std::mem::take(&mut current));
                current_has_source = false;
                continue;
            }

            if self.source_re.is_match(line) {
                // With the prefix strategy every source label opens an entry.
                // With separators, a second source label means a separator
                // was left out, so split there too.
                let opens_entry = match self.format.delimiter {
                    DelimiterStrategy::SourcePrefix => true,
                    DelimiterStrategy::Separator => current_has_source,
                };
                if opens_entry && !current.is_empty() {
                    entries.push(std::mem::take(&mut current));
                }
                current_has_source = true;
            }

            current.push(line);
        }
        entries.push(current);

        entries.retain(|lines| lines.iter().any(|l| !l.trim().is_empty()));
        entries
    }

    // -----------------------------------------------------------------------
    // Entry parsing
    // -----------------------------------------------------------------------

    fn is_quote_line(&self, line: &str) -> bool {
        line.trim_start().starts_with(self.format.quote_prefix.as_str())
    }

    /// Remove the blockquote prefix and a single following space.
    fn strip_quote_prefix<'a>(&self, line: &'a str) -> &'a str {
        let trimmed = line.trim_start();
        let rest = trimmed
            .strip_prefix(self.format.quote_prefix.as_str())
            .unwrap_or(trimmed);
        rest.strip_prefix(' ').unwrap_or(rest).trim_end()
    }

    fn parse_entry(&self, lines: &[&str]) -> Option<Citation> {
        let mut source: Option<String> = None;
        let mut quote: Option<String> = None;
        let mut url: Option<String> = None;

        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];

            if source.is_none() {
                if let Some(caps) = self.source_re.captures(line) {
                    source = Some(strip_closing_emphasis(&caps[1]).to_string());
                    i += 1;
                    continue;
                }
            }

            if quote.is_none() {
                if let Some(caps) = self.quote_re.captures(line) {
                    let inline = strip_closing_emphasis(&caps[1]);
                    let (text, next) = self.collect_quote(inline, lines, i + 1);
                    quote = Some(text);
                    i = next;
                    continue;
                }
            }

            if url.is_none() {
                if let Some(caps) = self.url_re.captures(line) {
                    url = self.clean_url(&caps[1]);
                }
            }

            i += 1;
        }

        let source = source.filter(|s| !s.is_empty())?;
        let quote = quote.filter(|q| !q.is_empty())?;
        Some(Citation { source, quote, url })
    }

    /// Gather the quoted block that follows a quote label starting at
    /// `start`. Returns the joined text and the index of the first line
    /// after the block.
    ///
    /// Lines keep their breaks (`\n`); a blank gap between two quoted lines
    /// is kept as a paragraph break.
    fn collect_quote(&self, inline: &str, lines: &[&str], start: usize) -> (String, usize) {
        let mut parts: Vec<&str> = Vec::new();
        if !inline.is_empty() {
            parts.push(self.strip_quote_prefix(inline));
        }

        let mut i = start;
        if parts.is_empty() {
            while i < lines.len() && lines[i].trim().is_empty() {
                i += 1;
            }
        }

        loop {
            if i < lines.len() && self.is_quote_line(lines[i]) {
                parts.push(self.strip_quote_prefix(lines[i]));
                i += 1;
                continue;
            }

            let mut j = i;
            while j < lines.len() && lines[j].trim().is_empty() {
                j += 1;
            }
            if j > i && j < lines.len() && !parts.is_empty() && self.is_quote_line(lines[j]) {
                parts.push("");
                i = j;
                continue;
            }
            break;
        }

        (parts.join("\n").trim().to_string(), i)
    }

    /// Normalize a URL field: unwrap `[text](target)` and `<target>`;
    /// empty values become `None`.
    fn clean_url(&self, raw: &str) -> Option<String> {
        let raw = strip_closing_emphasis(raw);
        let url = if let Some(caps) = self.link_re.captures(raw) {
            caps[1].to_string()
        } else if let Some(inner) = raw.strip_prefix('<').and_then(|r| r.strip_suffix('>')) {
            inner.trim().to_string()
        } else {
            raw.to_string()
        };
        (!url.is_empty()).then_some(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> CitationParser {
        CitationParser::new(CitationFormat::default()).expect("default format")
    }

    fn prefix_parser() -> CitationParser {
        CitationParser::new(CitationFormat {
            delimiter: DelimiterStrategy::SourcePrefix,
            ..CitationFormat::default()
        })
        .expect("prefix format")
    }

    #[test]
    fn parses_separator_delimited_entries() {
        let body = "**Fuente:** Caso A\n**Texto:**\n> Primera línea.\n> Segunda línea.\n**URL:** https://a.org\n\n---\n\n**Fuente:** Caso B\n**Texto:**\n> Cita B.\n";
        let got = parser().parse(body);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].source, "Caso A");
        assert_eq!(got[0].quote, "Primera línea.\nSegunda línea.");
        assert_eq!(got[0].url.as_deref(), Some("https://a.org"));
        assert_eq!(got[1].source, "Caso B");
        assert_eq!(got[1].quote, "Cita B.");
        assert_eq!(got[1].url, None);
    }

    #[test]
    fn entries_without_quote_are_never_emitted() {
        let body = "**Fuente:** Sin cita\n**URL:** https://x.org\n---\n**Fuente:** Con cita\n**Texto:**\n> Algo.\n---\n**Fuente:** Etiqueta vacía\n**Texto:**\n\n---\n";
        let got = parser().parse(body);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].source, "Con cita");
        assert!(got.iter().all(|c| !c.quote.is_empty()));

        // Parsing the same body again omits the same entries.
        assert_eq!(parser().parse(body), got);
    }

    #[test]
    fn entries_without_source_are_discarded() {
        let body = "**Texto:**\n> huérfano\n---\n---\n";
        assert!(parser().parse(body).is_empty());
    }

    #[test]
    fn source_prefix_strategy_splits_on_labels() {
        let body = "**Fuente:** A\n**Texto:**\n> a\n**Fuente:** B\n**Texto:**\n> b\n**URL:** https://b.org";
        let got = prefix_parser().parse(body);
        assert_eq!(got.len(), 2);
        assert_eq!(got[1].source, "B");
        assert_eq!(got[1].url.as_deref(), Some("https://b.org"));
        assert_eq!(got[0].url, None);
    }

    #[test]
    fn missing_separator_still_splits_on_second_source() {
        let body = "**Fuente:** A\n**Texto:**\n> a\n**Fuente:** B\n**Texto:**\n> b";
        let got = parser().parse(body);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].quote, "a");
        assert_eq!(got[1].quote, "b");
    }

    #[test]
    fn tolerates_label_drift() {
        let body = "Fuente: Plain\ntexto:\n> q1\n---\n**Fuente**: Bold outside\n**TEXTO**:\n>q2\n**Url**: <https://two.org>\n---\n- **Fuente:** Bullet\n**Texto:** > inline quote\n**URL:** [documento](https://three.org)";
        let got = parser().parse(body);
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].source, "Plain");
        assert_eq!(got[0].quote, "q1");
        assert_eq!(got[1].source, "Bold outside");
        assert_eq!(got[1].quote, "q2");
        assert_eq!(got[1].url.as_deref(), Some("https://two.org"));
        assert_eq!(got[2].source, "Bullet");
        assert_eq!(got[2].quote, "inline quote");
        assert_eq!(got[2].url.as_deref(), Some("https://three.org"));
    }

    #[test]
    fn bold_wrapped_values_lose_closing_marker() {
        let body = "**Fuente: Caso A**\n**Texto:**\n> cita\n**URL: https://a.org**\n---\n__Fuente: Caso B__\n__Texto: cita en línea__";
        let got = parser().parse(body);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].source, "Caso A");
        assert_eq!(got[0].quote, "cita");
        assert_eq!(got[0].url.as_deref(), Some("https://a.org"));
        assert_eq!(got[1].source, "Caso B");
        assert_eq!(got[1].quote, "cita en línea");
    }

    #[test]
    fn quote_keeps_paragraph_breaks() {
        let body = "**Fuente:** A\n**Texto:**\n\n> Párrafo uno.\n>\n> Párrafo dos.\n\n> Párrafo tres.\n\nTexto suelto que no es cita.";
        let got = parser().parse(body);
        assert_eq!(got[0].quote, "Párrafo uno.\n\nPárrafo dos.\n\nPárrafo tres.");
    }

    #[test]
    fn empty_url_marker_is_absent() {
        let body = "**Fuente:** A\n**Texto:**\n> a\n**URL:**";
        let got = parser().parse(body);
        assert_eq!(got[0].url, None);
    }

    #[test]
    fn similar_words_are_not_labels() {
        let body = "**Fuentes consultadas:** varias\n**Texto:**\n> x";
        assert!(parser().parse(body).is_empty());
    }

    #[test]
    fn custom_labels() {
        let format = CitationFormat {
            source_label: "Source".into(),
            quote_label: "Quote".into(),
            url_label: "Link".into(),
            ..CitationFormat::default()
        };
        let p = CitationParser::new(format).expect("format");
        let got = p.parse("**Source:** S\n**Quote:**\n> Q\n**Link:** https://s.org");
        assert_eq!(
            got,
            vec![Citation {
                source: "S".into(),
                quote: "Q".into(),
                url: Some("https://s.org".into()),
            }]
        );
    }
}
