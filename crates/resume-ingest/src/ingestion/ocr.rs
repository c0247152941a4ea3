//! Local OCR through `pdftoppm` and `tesseract`

use async_trait::async_trait;
use std::path::Path;
use std::process::Command;

use crate::config::ParserConfig;
use crate::error::{Error, Result};
use crate::providers::OcrEngine;
use crate::types::DocumentKind;

/// Renders PDF pages to PNG and runs tesseract over each page
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    language: String,
    dpi: u32,
}

impl TesseractOcr {
    pub fn new(language: impl Into<String>, dpi: u32) -> Self {
        Self {
            language: language.into(),
            dpi,
        }
    }

    pub fn from_config(config: &ParserConfig) -> Self {
        Self::new(config.tesseract_language.clone(), config.render_dpi)
    }

    /// Check if tesseract OCR is available
    pub fn has_tesseract() -> bool {
        Command::new("tesseract")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Check if pdftoppm is available
    pub fn has_pdftoppm() -> bool {
        Command::new("pdftoppm")
            .arg("-v")
            .output()
            .map(|_| true) // prints its version to stderr with a non-zero status
            .unwrap_or(false)
    }

    /// Both tools are on the PATH
    pub fn is_available() -> bool {
        Self::has_pdftoppm() && Self::has_tesseract()
    }

    fn ocr_pdf_blocking(&self, data: &[u8]) -> Result<String> {
        if !Self::is_available() {
            return Err(Error::ocr(
                "OCR requires pdftoppm and tesseract. Install with: apt install poppler-utils tesseract-ocr",
            ));
        }

        let temp_dir = tempfile::Builder::new()
            .prefix("resume-ingest-ocr-")
            .tempdir()?;

        let pdf_path = temp_dir.path().join("input.pdf");
        std::fs::write(&pdf_path, data)?;

        let page_prefix = temp_dir.path().join("page");
        let pdftoppm_output = Command::new("pdftoppm")
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(&pdf_path)
            .arg(&page_prefix)
            .output()
            .map_err(|e| Error::ocr(format!("pdftoppm failed: {}", e)))?;

        if !pdftoppm_output.status.success() {
            let stderr = String::from_utf8_lossy(&pdftoppm_output.stderr);
            return Err(Error::ocr(format!("pdftoppm error: {}", stderr.trim())));
        }

        let page_images = rendered_pages(temp_dir.path())?;
        if page_images.is_empty() {
            return Err(Error::ocr("pdftoppm produced no images"));
        }

        let mut all_text = String::new();
        for (i, image_path) in page_images.iter().enumerate() {
            let ocr_output = Command::new("tesseract")
                .arg(image_path)
                .arg("stdout")
                .arg("-l")
                .arg(&self.language)
                .output()
                .map_err(|e| Error::ocr(format!("tesseract failed on page {}: {}", i + 1, e)))?;

            if !ocr_output.status.success() {
                tracing::warn!("tesseract exited with {} on page {}", ocr_output.status, i + 1);
                continue;
            }

            let page_text = String::from_utf8_lossy(&ocr_output.stdout);
            if !page_text.trim().is_empty() {
                if !all_text.is_empty() {
                    all_text.push('\n');
                }
                all_text.push_str(page_text.trim());
            }
        }

        if all_text.trim().is_empty() {
            return Err(Error::ocr("OCR produced no text"));
        }

        tracing::info!(
            "OCR extracted {} characters from {} pages",
            all_text.len(),
            page_images.len()
        );
        Ok(all_text)
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::from_config(&ParserConfig::default())
    }
}

/// PNG pages in render order
fn rendered_pages(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut pages: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
        .collect();
    pages.sort();
    Ok(pages)
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn ocr(&self, data: &[u8], kind: DocumentKind) -> Result<String> {
        if !kind.supports_ocr() {
            return Err(Error::ocr(format!("{} documents are not sent to OCR", kind)));
        }

        let engine = self.clone();
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || engine.ocr_pdf_blocking(&data))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}
