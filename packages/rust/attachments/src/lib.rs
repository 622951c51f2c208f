//! Document text extraction for Amicus attachments.
//!
//! Turns user-supplied files into [`Attachment`]s (name plus plain text)
//! that are spliced into the prompt as document context. Supported kinds are
//! PDF (`pdf-extract`), DOCX (`zip` + `quick-xml`) and plain UTF-8 text.
//! Size is checked before type, so an oversized file of an unknown type
//! reports the size problem.

mod docx;

use std::path::Path;

use tracing::{debug, info, instrument, warn};

use amicus_shared::{AmicusError, Attachment, Result};

/// Recognized document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    PlainText,
}

const PDF_MIME: &str = "application/pdf";
const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const PDF_MAGIC: &[u8] = b"%PDF-";

impl DocumentKind {
    fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            PDF_MIME => Some(Self::Pdf),
            DOCX_MIME => Some(Self::Docx),
            "text/plain" | "text/markdown" => Some(Self::PlainText),
            _ => None,
        }
    }

    fn from_extension(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" | "md" | "markdown" => Some(Self::PlainText),
            _ => None,
        }
    }
}

/// Determine the document kind from the MIME type when it is recognized,
/// falling back to the file extension.
pub fn detect_kind(name: &str, mime: Option<&str>) -> Option<DocumentKind> {
    mime.and_then(DocumentKind::from_mime)
        .or_else(|| DocumentKind::from_extension(name))
}

/// Extract plain text from an in-memory file.
#[instrument(skip(bytes), fields(size = bytes.len()))]
pub fn extract_text(name: &str, mime: Option<&str>, bytes: &[u8], max_bytes: u64) -> Result<String> {
    let size = bytes.len() as u64;
    if size > max_bytes {
        return Err(AmicusError::AttachmentTooLarge {
            name: name.to_string(),
            size,
            limit: max_bytes,
        });
    }

    let kind = detect_kind(name, mime).ok_or_else(|| AmicusError::UnsupportedAttachment {
        name: name.to_string(),
    })?;
    debug!(?kind, "extracting attachment text");

    let text = match kind {
        DocumentKind::Pdf => {
            if !bytes.starts_with(PDF_MAGIC) {
                return Err(AmicusError::extraction(name, "missing %PDF- header"));
            }
            pdf_extract::extract_text_from_mem(bytes)
                .map_err(|e| AmicusError::extraction(name, e.to_string()))?
        }
        DocumentKind::Docx => {
            docx::docx_to_text(bytes).map_err(|reason| AmicusError::extraction(name, reason))?
        }
        DocumentKind::PlainText => String::from_utf8(bytes.to_vec())
            .map_err(|e| AmicusError::extraction(name, format!("not valid UTF-8: {e}")))?,
    };

    if text.trim().is_empty() {
        warn!(name, "attachment contains no extractable text");
    }
    Ok(text)
}

/// Read and extract one file. The size limit is checked against file
/// metadata before the content is read.
pub fn load_attachment(path: &Path, max_bytes: u64) -> Result<Attachment> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let size = std::fs::metadata(path)
        .map_err(|e| AmicusError::io(path, e))?
        .len();
    if size > max_bytes {
        return Err(AmicusError::AttachmentTooLarge {
            name,
            size,
            limit: max_bytes,
        });
    }

    let bytes = std::fs::read(path).map_err(|e| AmicusError::io(path, e))?;
    let text = extract_text(&name, None, &bytes, max_bytes)?;
    Ok(Attachment { name, text })
}

/// Load files in order, stopping at the first failure. The error names
/// the offending file.
#[instrument(skip_all, fields(count = paths.len()))]
pub fn load_attachments<P: AsRef<Path>>(paths: &[P], max_bytes: u64) -> Result<Vec<Attachment>> {
    let mut attachments = Vec::with_capacity(paths.len());
    for path in paths {
        let attachment = load_attachment(path.as_ref(), max_bytes)?;
        info!(
            name = %attachment.name,
            chars = attachment.text.chars().count(),
            "attachment loaded"
        );
        attachments.push(attachment);
    }
    Ok(attachments)
}
