//! Raw answer text → [`ParsedResponse`].
//!
//! Parsing never fails: malformed or missing sections degrade to empty
//! values, and an answer without any recognized structure is returned as-is.

use tracing::{debug, instrument};

use amicus_shared::{AssistantSettings, ParsedResponse, Result};

use crate::citations::CitationParser;
use crate::followups::parse_follow_ups;
use crate::sections::SectionExtractor;

/// Combines section extraction, citation parsing and follow-up parsing.
#[derive(Debug, Clone)]
pub struct ResponseParser {
    sections: SectionExtractor,
    citations: CitationParser,
    fallback_answer: String,
}

impl ResponseParser {
    /// Build a parser from runtime settings. Fails only on an invalid
    /// citation label configuration.
    pub fn new(settings: &AssistantSettings) -> Result<Self> {
        Ok(Self {
            sections: SectionExtractor::new(settings.headings.clone()),
            citations: CitationParser::new(settings.citations.clone())?,
            fallback_answer: settings.fallback_answer.clone(),
        })
    }

    /// Parse a complete or partial raw answer text.
    #[instrument(skip_all, fields(len = raw.len()))]
    pub fn parse(&self, raw: &str) -> ParsedResponse {
        let sections = self.sections.extract(raw);

        let answer = match sections.answer {
            Some(answer) => answer,
            None => {
                let whole = raw.trim();
                if whole.is_empty() {
                    self.fallback_answer.clone()
                } else {
                    debug!("no answer heading found, using the whole text as answer");
                    whole.to_string()
                }
            }
        };

        let citations = self.citations.parse(&sections.citations);
        let follow_up_questions = parse_follow_ups(&sections.follow_ups);

        debug!(
            citations = citations.len(),
            follow_ups = follow_up_questions.len(),
            "response parsed"
        );

        ParsedResponse {
            answer,
            citations,
            follow_up_questions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amicus_shared::{CitationFormat, DelimiterStrategy};

    fn parser() -> ResponseParser {
        ResponseParser::new(&AssistantSettings::default()).expect("default settings")
    }

    fn load_fixture(name: &str) -> String {
        let path = format!("../../../fixtures/responses/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    #[test]
    fn well_formed_fixture_round_trip() {
        let parsed = parser().parse(&load_fixture("well_formed.md"));

        assert!(parsed.answer.starts_with("La obligación de investigar"));
        assert!(!parsed.answer.contains("## Citaciones"));

        assert_eq!(parsed.citations.len(), 3);
        let sources: Vec<&str> = parsed.citations.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(
            sources,
            [
                "Caso Velásquez Rodríguez vs. Honduras, Corte IDH",
                "Caso Radilla Pacheco vs. México, Corte IDH",
                "Opinión Consultiva OC-9/87, Corte IDH",
            ]
        );
        assert!(parsed.citations[0].url.is_some());
        assert!(parsed.citations[1].url.is_none());
        assert!(parsed.citations[2].url.is_some());
        assert!(parsed.citations[0].quote.contains('\n'));

        assert_eq!(
            parsed.follow_up_questions,
            vec![
                "¿Cuál es el plazo para presentar una petición ante el sistema interamericano?",
                "¿Qué otros casos similares ha tratado la Corte IDH?",
                "¿Cómo se aplica este principio en el derecho interno de México?",
            ]
        );
    }

    #[test]
    fn prefix_delimited_fixture() {
        let mut settings = AssistantSettings::default();
        settings.citations = CitationFormat {
            delimiter: DelimiterStrategy::SourcePrefix,
            ..CitationFormat::default()
        };
        let parser = ResponseParser::new(&settings).expect("settings");
        let parsed = parser.parse(&load_fixture("prefix_delimited.md"));
        assert_eq!(parsed.citations.len(), 2);
        assert_eq!(parsed.follow_up_questions.len(), 2);
    }

    #[test]
    fn no_headings_answer_is_whole_text() {
        let raw = "\n  El Estado debe reparar integralmente a las víctimas.\n\nFin.  \n";
        let parsed = parser().parse(raw);
        assert_eq!(parsed.answer, raw.trim());
        assert!(parsed.citations.is_empty());
        assert!(parsed.follow_up_questions.is_empty());
    }

    #[test]
    fn no_headings_fixture() {
        let raw = load_fixture("no_headings.md");
        let parsed = parser().parse(&raw);
        assert_eq!(parsed.answer, raw.trim());
        assert!(parsed.citations.is_empty());
        assert!(parsed.follow_up_questions.is_empty());
    }

    #[test]
    fn empty_input_yields_fallback() {
        for raw in ["", "   \n\t\n"] {
            let parsed = parser().parse(raw);
            assert_eq!(parsed.answer, AssistantSettings::default().fallback_answer);
            assert!(parsed.citations.is_empty());
            assert!(parsed.follow_up_questions.is_empty());
        }
    }

    #[test]
    fn empty_answer_section_stays_empty() {
        let parsed = parser().parse("## Respuesta\n\n## Citaciones\n");
        assert_eq!(parsed.answer, "");
    }

    #[test]
    fn partial_stream_parses_speculatively() {
        let parsed = parser().parse("## Respuesta\nEn curso...\n## Citaciones\n**Fuente:** A\n**Tex");
        assert_eq!(parsed.answer, "En curso...");
        assert!(parsed.citations.is_empty());
    }
}
