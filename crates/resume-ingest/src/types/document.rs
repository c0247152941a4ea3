//! Source file references and document kinds

use serde::{Deserialize, Serialize};

/// MIME type for PDF documents
pub const PDF_MIME: &str = "application/pdf";
/// MIME type for Office Open XML word documents
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Document kinds the parser accepts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// PDF, laid-out text that may need OCR
    Pdf,
    /// Microsoft Word document (.docx), flow text
    Docx,
}

impl DocumentKind {
    /// Detect kind from a MIME type
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or(mime).trim();
        match essence.to_ascii_lowercase().as_str() {
            PDF_MIME => Some(Self::Pdf),
            DOCX_MIME => Some(Self::Docx),
            _ => None,
        }
    }

    /// Detect kind from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    /// Detect kind from a filename via its guessed MIME type, then its extension
    pub fn from_filename(name: &str) -> Option<Self> {
        mime_guess::from_path(name)
            .first_raw()
            .and_then(Self::from_mime)
            .or_else(|| {
                std::path::Path::new(name)
                    .extension()
                    .and_then(|e| e.to_str())
                    .and_then(Self::from_extension)
            })
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => PDF_MIME,
            Self::Docx => DOCX_MIME,
        }
    }

    /// Only page-rendered formats go through OCR
    pub fn supports_ocr(&self) -> bool {
        matches!(self, Self::Pdf)
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pdf => write!(f, "pdf"),
            Self::Docx => write!(f, "docx"),
        }
    }
}

/// A file in the remote store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRef {
    /// Store-specific identifier (Drive file id, relative path)
    pub file_id: String,
    /// Display filename
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl FileRef {
    pub fn new(file_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            name: name.into(),
            mime_type: None,
            size: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Declared MIME type wins; the filename is the fallback
    pub fn kind(&self) -> Option<DocumentKind> {
        self.mime_type
            .as_deref()
            .and_then(DocumentKind::from_mime)
            .or_else(|| DocumentKind::from_filename(&self.name))
    }

    /// Key its result is recorded under; matches `ParsedResult::result_key`
    pub fn result_key(&self) -> &str {
        if self.file_id.trim().is_empty() {
            &self.name
        } else {
            &self.file_id
        }
    }
}
