//! Prompt composition.
//!
//! The system instruction's format rules are rendered from the same heading
//! vocabulary and citation labels the parser uses, so a custom vocabulary
//! changes both sides at once.

use amicus_shared::{Attachment, AssistantSettings, DelimiterStrategy, PromptConfig};

/// Render the full system instruction: persona followed by format rules.
pub fn render_system_instruction(settings: &AssistantSettings) -> String {
    let h = &settings.headings;
    let c = &settings.citations;
    let quote = c.quote_prefix.trim();

    let entry = format!(
        "**{source}:** [Fuente del documento, ej: Caso Velásquez Rodríguez vs. Honduras, Corte IDH]\n\
         **{text}:**\n\
         {quote} [Párrafo completo y sustancial del documento original. Empieza cada línea con '{quote} '.]\n\
         **{url}:** [URL funcional y verificada al documento]",
        source = c.source_label,
        text = c.quote_label,
        url = c.url_label,
    );

    let separator_rule = match c.delimiter {
        DelimiterStrategy::Separator => format!(
            "Separa cada cita de la siguiente con una línea que contenga únicamente `{}`.",
            c.separator.trim()
        ),
        DelimiterStrategy::SourcePrefix => {
            format!("Empieza cada cita directamente con la etiqueta **{}:**.", c.source_label)
        }
    };

    format!(
        "{persona}\n\n\
         REGLAS DE FORMATO DE RESPUESTA:\n\
         Formatea TODA tu respuesta en Markdown usando exactamente los siguientes encabezados, \
         en este orden. No incluyas texto ni saludos fuera de esta estructura.\n\n\
         {answer}\n\n\
         [Respuesta principal, detallada y autocontenida. No remitas a las citas con frases como 'ver abajo'.]\n\n\
         {citations}\n\n\
         [Entre 3 y 5 citas jurisprudenciales relevantes. Usa ESTRICTAMENTE este formato para cada una:]\n\
         {entry}\n\n\
         {separator_rule}\n\n\
         {follow_ups}\n\n\
         [Tres preguntas de seguimiento relevantes, cada una en su propia línea precedida por un guion.]\n\
         - ¿Primera pregunta?\n\
         - ¿Segunda pregunta?\n\
         - ¿Tercera pregunta?\n",
        persona = settings.prompt.persona.trim(),
        answer = h.answer,
        citations = h.citations,
        follow_ups = h.follow_ups,
    )
}

/// Join attachments into a single document-context block, one headed part
/// per file. Returns `None` when there is nothing to attach.
pub fn document_context(attachments: &[Attachment]) -> Option<String> {
    if attachments.is_empty() {
        return None;
    }
    let parts: Vec<String> = attachments
        .iter()
        .map(|a| format!("[{}]\n{}", a.name, a.text.trim()))
        .collect();
    Some(parts.join("\n\n"))
}

/// Build the effective prompt. Document context, when present, comes first
/// inside delimiter lines, followed by the marked user question.
pub fn compose_prompt(query: &str, document_context: Option<&str>, markers: &PromptConfig) -> String {
    match document_context.map(str::trim).filter(|ctx| !ctx.is_empty()) {
        Some(ctx) => format!(
            "{open}\n{ctx}\n{close}\n\n{question}\n{query}",
            open = markers.document_open,
            close = markers.document_close,
            question = markers.question_marker,
            query = query.trim(),
        ),
        None => query.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amicus_shared::SectionHeadings;

    #[test]
    fn plain_query_is_passed_through() {
        let prompt = compose_prompt("  ¿Qué es el amparo?  ", None, &PromptConfig::default());
        assert_eq!(prompt, "¿Qué es el amparo?");
    }

    #[test]
    fn document_context_precedes_question() {
        let markers = PromptConfig::default();
        let prompt = compose_prompt("¿Es válido?", Some("Cláusula 1. ..."), &markers);

        let open = prompt.find(&markers.document_open).expect("open marker");
        let ctx = prompt.find("Cláusula 1.").expect("context");
        let close = prompt.find(&markers.document_close).expect("close marker");
        let question = prompt.find(&markers.question_marker).expect("question marker");
        let query = prompt.find("¿Es válido?").expect("query");
        assert!(open < ctx && ctx < close && close < question && question < query);
    }

    #[test]
    fn blank_context_is_ignored() {
        let prompt = compose_prompt("Hola", Some("  \n "), &PromptConfig::default());
        assert_eq!(prompt, "Hola");
    }

    #[test]
    fn attachments_are_headed_by_name() {
        assert_eq!(document_context(&[]), None);
        let ctx = document_context(&[
            Attachment {
                name: "demanda.pdf".into(),
                text: "Hechos...\n".into(),
            },
            Attachment {
                name: "anexo.docx".into(),
                text: "Pruebas".into(),
            },
        ])
        .expect("context");
        assert_eq!(ctx, "[demanda.pdf]\nHechos...\n\n[anexo.docx]\nPruebas");
    }

    #[test]
    fn system_instruction_uses_configured_vocabulary() {
        let mut settings = AssistantSettings::default();
        settings.headings = SectionHeadings {
            answer: "## Answer".into(),
            citations: "## Sources".into(),
            follow_ups: "## Follow-ups".into(),
        };
        settings.citations.source_label = "Source".into();

        let text = render_system_instruction(&settings);
        assert!(text.starts_with(settings.prompt.persona.trim()));
        assert!(text.contains("\n## Answer\n"));
        assert!(text.contains("\n## Sources\n"));
        assert!(text.contains("\n## Follow-ups\n"));
        assert!(text.contains("**Source:**"));
        assert!(text.contains("`---`"));
    }
}
