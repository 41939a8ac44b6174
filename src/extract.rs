//! Text extraction boundary.
//!
//! Ingestion consumes plain unicode text; producing it from a source file is
//! the extractor's job. Rich binary formats (pdf, doc, docx) are handled by
//! an external extraction service — this module covers the plain-text
//! formats and defines the error contract: extraction failures surface as
//! errors whose display text is recorded verbatim as the document's failure
//! reason.

use std::path::Path;

/// File types accepted at the ingestion boundary.
pub const SUPPORTED_TYPES: &[&str] = &["txt", "md"];

/// Extraction error. The `Display` text of these values is what ends up in
/// `documents.error_message`.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedFileType(String),
    Unreadable(String),
    Empty,
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedFileType(t) => {
                write!(f, "unsupported file type: {}", t)
            }
            ExtractError::Unreadable(e) => write!(f, "could not read file: {}", e),
            ExtractError::Empty => write!(f, "document contains no text"),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Determine the file type from a filename's extension.
pub fn file_type_of(filename: &str) -> Result<String, ExtractError> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    if SUPPORTED_TYPES.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(ExtractError::UnsupportedFileType(ext))
    }
}

/// Extract plain unicode text from a file of the declared type.
pub fn extract_text(path: &Path, declared_type: &str) -> Result<String, ExtractError> {
    match declared_type {
        "txt" | "md" => extract_plain(path),
        other => Err(ExtractError::UnsupportedFileType(other.to_string())),
    }
}

fn extract_plain(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path).map_err(|e| ExtractError::Unreadable(e.to_string()))?;

    // Tolerate a UTF-8 BOM; anything else must be valid UTF-8.
    let bytes = bytes
        .strip_prefix(&[0xEF, 0xBB, 0xBF][..])
        .unwrap_or(&bytes[..]);

    let text = std::str::from_utf8(bytes)
        .map_err(|e| ExtractError::Unreadable(format!("invalid UTF-8: {}", e)))?
        .trim()
        .to_string();

    if text.is_empty() {
        return Err(ExtractError::Empty);
    }
    Ok(text)
}
