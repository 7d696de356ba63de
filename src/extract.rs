//! Text extraction for uploaded documents.
//!
//! [`DocumentExtractor`] is the application's [`PageExtractor`]: the file
//! extension selects the format and the result is one string per logical
//! unit.
//!
//! | Extension | Units |
//! |-----------|-------|
//! | `.pdf` | one per page |
//! | `.docx` | one (paragraphs separated by newlines) |
//! | `.txt`, `.md`, `.markdown` | one |
//!
//! Extraction never panics on malformed input; errors are returned and
//! the ingestion pipeline counts the file as failed.

use std::io::Read;

use thiserror::Error;

use tutor_harness_core::ingest::PageExtractor;
use tutor_harness_core::models::SourceFile;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("{0} is not valid UTF-8 text")]
    Encoding(String),
}

/// Supported document kinds, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Text,
}

impl DocumentKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "docx" => Some(DocumentKind::Docx),
            "txt" | "md" | "markdown" => Some(DocumentKind::Text),
            _ => None,
        }
    }
}

/// Extract the pages of a file, choosing the format from its name.
pub fn extract_pages(name: &str, bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    match DocumentKind::from_name(name) {
        Some(DocumentKind::Pdf) => extract_pdf_pages(bytes),
        Some(DocumentKind::Docx) => extract_docx(bytes).map(|text| vec![text]),
        Some(DocumentKind::Text) => std::str::from_utf8(bytes)
            .map(|s| vec![s.to_string()])
            .map_err(|_| ExtractError::Encoding(name.to_string())),
        None => Err(ExtractError::UnsupportedType(name.to_string())),
    }
}

/// [`PageExtractor`] over PDF, DOCX and plain-text files.
pub struct DocumentExtractor;

impl PageExtractor for DocumentExtractor {
    fn extract_pages(&self, file: &SourceFile) -> anyhow::Result<Vec<String>> {
        Ok(extract_pages(&file.name, &file.bytes)?)
    }
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    paragraphs_text(&doc_xml)
}

/// Collect `<w:t>` runs, ending each `<w:p>` paragraph with a newline.
fn paragraphs_text(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}
