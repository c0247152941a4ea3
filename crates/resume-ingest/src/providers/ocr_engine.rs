//! OCR engine trait for image-based documents

use async_trait::async_trait;

use crate::error::Result;
use crate::types::DocumentKind;

/// Trait for optical character recognition
///
/// Implementations:
/// - `TesseractOcr`: `pdftoppm` + `tesseract` on the local machine
/// - `DocumentAiOcr`: Google Document AI processor
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize text in a document
    async fn ocr(&self, data: &[u8], kind: DocumentKind) -> Result<String>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
