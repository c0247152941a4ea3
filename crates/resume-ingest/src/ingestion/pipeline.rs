//! Per-file pipeline: download, parse, extract

use std::sync::Arc;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::extraction::CandidateExtractor;
use crate::providers::FileSource;
use crate::types::{DocumentKind, FileRef, ParsedResult};

use super::DocumentParser;

/// Everything needed to turn one [`FileRef`] into a [`ParsedResult`]
pub struct ResumePipeline {
    source: Arc<dyn FileSource>,
    parser: DocumentParser,
    extractor: CandidateExtractor,
}

impl ResumePipeline {
    pub fn new(
        source: Arc<dyn FileSource>,
        parser: DocumentParser,
        extractor: CandidateExtractor,
    ) -> Self {
        Self {
            source,
            parser,
            extractor,
        }
    }

    pub fn source(&self) -> &Arc<dyn FileSource> {
        &self.source
    }

    /// One attempt at a file. Retries and timeouts are the caller's concern.
    pub async fn process(&self, file: &FileRef) -> Result<ParsedResult> {
        if file.file_id.trim().is_empty() {
            return Err(Error::file_parse(&file.name, "Missing file ID"));
        }
        let kind = file
            .kind()
            .ok_or_else(|| Error::UnsupportedFileType(file.name.clone()))?;

        let data = self.source.download(file).await?;
        self.parse_bytes_as(&file.name, Some(file.file_id.clone()), &data, kind)
            .await
    }

    /// Parse an uploaded file without a job; the kind comes from the filename
    pub async fn parse_bytes(&self, filename: &str, data: &[u8]) -> Result<ParsedResult> {
        let kind = DocumentKind::from_filename(filename)
            .ok_or_else(|| Error::UnsupportedFileType(filename.to_string()))?;
        self.parse_bytes_as(filename, None, data, kind).await
    }

    async fn parse_bytes_as(
        &self,
        filename: &str,
        file_id: Option<String>,
        data: &[u8],
        kind: DocumentKind,
    ) -> Result<ParsedResult> {
        let start = Instant::now();

        let parsed = match self.parser.parse(filename, data, kind).await {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::info!(
                    target: "parsing",
                    file = %filename,
                    ocr_used = false,
                    timing_ms = start.elapsed().as_millis() as u64,
                    has_errors = true,
                    "[{}] Parse failed",
                    filename
                );
                return Err(e);
            }
        };

        let extraction = self.extractor.extract(&parsed.text, parsed.ocr_used);

        tracing::info!(
            target: "parsing",
            file = %filename,
            ocr_used = parsed.ocr_used,
            timing_ms = start.elapsed().as_millis() as u64,
            has_errors = false,
            "[{}] Parsed with confidence {:.2}",
            filename,
            extraction.confidence
        );

        Ok(ParsedResult::from_fields(
            filename,
            file_id,
            extraction.fields,
            extraction.confidence,
            parsed.ocr_used,
        ))
    }
}
