//! Document parsing with quality-gated OCR fallback

use futures_util::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::config::ParserConfig;
use crate::error::{Error, Result};
use crate::providers::{OcrEngine, TextDecoder};
use crate::types::DocumentKind;

/// Text pulled out of one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedText {
    pub text: String,
    pub ocr_used: bool,
}

/// Measured quality of decoded text
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextQuality {
    /// Non-whitespace characters
    pub significant_chars: usize,
    /// Printable share of the non-whitespace characters
    pub printable_ratio: f64,
}

impl TextQuality {
    pub fn measure(text: &str) -> Self {
        let mut significant = 0usize;
        let mut printable = 0usize;
        for c in text.chars().filter(|c| !c.is_whitespace()) {
            significant += 1;
            if !c.is_control() && c != '\u{FFFD}' {
                printable += 1;
            }
        }

        let printable_ratio = if significant == 0 {
            0.0
        } else {
            printable as f64 / significant as f64
        };

        Self {
            significant_chars: significant,
            printable_ratio,
        }
    }
}

/// Turns raw bytes into text, falling back to OCR for PDFs whose text layer is
/// missing or garbled
pub struct DocumentParser {
    decoder: Arc<dyn TextDecoder>,
    ocr: Option<Arc<dyn OcrEngine>>,
    min_text_length: usize,
    min_printable_ratio: f64,
}

impl DocumentParser {
    pub fn new(
        decoder: Arc<dyn TextDecoder>,
        ocr: Option<Arc<dyn OcrEngine>>,
        config: &ParserConfig,
    ) -> Self {
        Self {
            decoder,
            ocr,
            min_text_length: config.min_text_length,
            min_printable_ratio: config.min_printable_ratio,
        }
    }

    pub fn has_ocr(&self) -> bool {
        self.ocr.is_some()
    }

    /// Whether text is good enough to skip OCR
    pub fn is_sufficient(&self, quality: &TextQuality) -> bool {
        quality.significant_chars >= self.min_text_length
            && quality.printable_ratio >= self.min_printable_ratio
    }

    /// A panicking decoder or OCR engine fails this file only
    pub async fn parse(
        &self,
        filename: &str,
        data: &[u8],
        kind: DocumentKind,
    ) -> Result<ParsedText> {
        let direct = isolate(
            filename,
            self.decoder.name(),
            self.decoder.decode_text(data, kind),
        )
        .await;

        match kind {
            DocumentKind::Docx => {
                let text = direct?;
                if text.trim().is_empty() {
                    return Err(Error::file_parse(filename, "No text content found in DOCX"));
                }
                Ok(ParsedText {
                    text,
                    ocr_used: false,
                })
            }
            DocumentKind::Pdf => self.parse_pdf(filename, data, kind, direct).await,
        }
    }

    async fn parse_pdf(
        &self,
        filename: &str,
        data: &[u8],
        kind: DocumentKind,
        direct: Result<String>,
    ) -> Result<ParsedText> {
        let direct_problem = match direct {
            Ok(text) => {
                let quality = TextQuality::measure(&text);
                if self.is_sufficient(&quality) {
                    return Ok(ParsedText {
                        text,
                        ocr_used: false,
                    });
                }
                tracing::info!(
                    "[{}] Text layer insufficient ({} chars, {:.2} printable), trying OCR",
                    filename,
                    quality.significant_chars,
                    quality.printable_ratio
                );
                format!(
                    "insufficient text ({} characters)",
                    quality.significant_chars
                )
            }
            Err(e) => {
                tracing::info!("[{}] Direct extraction failed, trying OCR: {}", filename, e);
                e.to_string()
            }
        };

        let Some(ocr) = &self.ocr else {
            return Err(Error::file_parse(
                filename,
                format!("{}; no OCR engine configured", direct_problem),
            ));
        };

        let text = isolate(filename, ocr.name(), ocr.ocr(data, kind))
            .await
            .map_err(|e| {
                Error::file_parse(
                    filename,
                    format!("{}; OCR via {} failed: {}", direct_problem, ocr.name(), e),
                )
            })?;

        let quality = TextQuality::measure(&text);
        if !self.is_sufficient(&quality) {
            return Err(Error::file_parse(
                filename,
                format!(
                    "OCR via {} produced insufficient text ({} characters)",
                    ocr.name(),
                    quality.significant_chars
                ),
            ));
        }

        Ok(ParsedText {
            text,
            ocr_used: true,
        })
    }
}

/// Turn a panic inside `work` into a parse error for `filename`
async fn isolate<F>(filename: &str, component: &str, work: F) -> Result<String>
where
    F: Future<Output = Result<String>>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!("[{}] {} panicked: {}", filename, component, message);
            Err(Error::file_parse(
                filename,
                format!("{} panicked: {}", component, message),
            ))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedOcr, Utf8Decoder, PANIC_CONTENT};

    const LONG_TEXT: &str =
        "Jane Roe\nSoftware Engineer with ten years of experience in distributed systems";

    fn parser(ocr: Option<ScriptedOcr>) -> (DocumentParser, Option<Arc<ScriptedOcr>>) {
        let ocr = ocr.map(Arc::new);
        let parser = DocumentParser::new(
            Arc::new(Utf8Decoder),
            ocr.clone().map(|o| o as Arc<dyn OcrEngine>),
            &ParserConfig::default(),
        );
        (parser, ocr)
    }

    #[test]
    fn test_quality_measure() {
        let quality = TextQuality::measure("ab c\u{1}\n");
        assert_eq!(quality.significant_chars, 4);
        assert!((quality.printable_ratio - 0.75).abs() < 1e-9);

        assert_eq!(TextQuality::measure("  \n").printable_ratio, 0.0);
    }

    #[tokio::test]
    async fn test_good_text_skips_ocr() {
        let (parser, ocr) = parser(Some(ScriptedOcr::returning("ocr text")));
        let parsed = parser
            .parse("cv.pdf", LONG_TEXT.as_bytes(), DocumentKind::Pdf)
            .await
            .unwrap();
        assert!(!parsed.ocr_used);
        assert_eq!(parsed.text, LONG_TEXT);
        assert_eq!(ocr.unwrap().calls(), 0);
    }

    #[tokio::test]
    async fn test_image_pdf_goes_to_ocr() {
        let (parser, ocr) = parser(Some(ScriptedOcr::returning(LONG_TEXT)));
        let parsed = parser.parse("scan.pdf", b"", DocumentKind::Pdf).await.unwrap();
        assert!(parsed.ocr_used);
        assert!(!parsed.text.is_empty());
        assert_eq!(ocr.unwrap().calls(), 1);
    }

    #[tokio::test]
    async fn test_garbled_text_goes_to_ocr() {
        let garbled = "\u{1}\u{2}\u{3}".repeat(30);
        let (parser, _) = parser(Some(ScriptedOcr::returning(LONG_TEXT)));
        let parsed = parser
            .parse("garbled.pdf", garbled.as_bytes(), DocumentKind::Pdf)
            .await
            .unwrap();
        assert!(parsed.ocr_used);
    }

    #[tokio::test]
    async fn test_decoder_error_goes_to_ocr() {
        let (parser, _) = parser(Some(ScriptedOcr::returning(LONG_TEXT)));
        // Invalid UTF-8 makes the test decoder fail
        let parsed = parser.parse("bad.pdf", &[0xff, 0xfe], DocumentKind::Pdf).await.unwrap();
        assert!(parsed.ocr_used);
    }

    #[tokio::test]
    async fn test_decoder_panic_is_parse_error() {
        let (parser, ocr) = parser(Some(ScriptedOcr::returning(LONG_TEXT)));
        let err = parser
            .parse("boom.docx", PANIC_CONTENT, DocumentKind::Docx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FileParse { .. }));
        assert!(err.to_string().contains("utf8 panicked"));
        assert!(!err.is_transient());
        assert_eq!(ocr.unwrap().calls(), 0);
    }

    #[tokio::test]
    async fn test_decoder_panic_on_pdf_still_tries_ocr() {
        let (parser, ocr) = parser(Some(ScriptedOcr::returning(LONG_TEXT)));
        let parsed = parser
            .parse("boom.pdf", PANIC_CONTENT, DocumentKind::Pdf)
            .await
            .unwrap();
        assert!(parsed.ocr_used);
        assert_eq!(ocr.unwrap().calls(), 1);
    }

    #[tokio::test]
    async fn test_ocr_failure_is_parse_error() {
        let (parser, _) = parser(Some(ScriptedOcr::failing("engine down")));
        let err = parser.parse("scan.pdf", b"", DocumentKind::Pdf).await.unwrap_err();
        assert!(matches!(err, Error::FileParse { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_short_ocr_output_is_parse_error() {
        let (parser, _) = parser(Some(ScriptedOcr::returning("too short")));
        let err = parser.parse("scan.pdf", b"", DocumentKind::Pdf).await.unwrap_err();
        assert!(err.to_string().contains("insufficient"));
    }

    #[tokio::test]
    async fn test_no_ocr_engine() {
        let (parser, _) = parser(None);
        let err = parser.parse("scan.pdf", b"", DocumentKind::Pdf).await.unwrap_err();
        assert!(err.to_string().contains("no OCR engine"));
    }

    #[tokio::test]
    async fn test_docx_never_uses_ocr() {
        let (parser, ocr) = parser(Some(ScriptedOcr::returning(LONG_TEXT)));
        let parsed = parser
            .parse("short.docx", b"Jane Roe", DocumentKind::Docx)
            .await
            .unwrap();
        assert!(!parsed.ocr_used);
        assert_eq!(parsed.text, "Jane Roe");

        let err = parser
            .parse("empty.docx", b"  \n ", DocumentKind::Docx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FileParse { .. }));
        assert_eq!(ocr.unwrap().calls(), 0);
    }
}
