//! Document ingestion: text decoding, OCR fallback and the per-file pipeline

mod native;
mod ocr;
mod parser;
mod pipeline;

pub use native::NativeDecoder;
pub use ocr::TesseractOcr;
pub use parser::{DocumentParser, ParsedText, TextQuality};
pub use pipeline::ResumePipeline;
