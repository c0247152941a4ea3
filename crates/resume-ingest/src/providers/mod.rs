//! Capability abstractions for file sources, decoding, OCR and result sinks
//!
//! Each capability is an async trait held as `Arc<dyn _>`, so the pipeline
//! runs unchanged against local, Google or in-memory backends.

pub mod file_source;
pub mod local;
pub mod memory;
pub mod ocr_engine;
pub mod result_writer;
pub mod text_decoder;

#[cfg(feature = "gcp")]
pub mod gcp;

pub use file_source::FileSource;
pub use local::{CsvResultWriter, LocalFolderSource};
pub use memory::{MemoryFileSource, MemoryResultWriter};
pub use ocr_engine::OcrEngine;
pub use result_writer::{sink_row, ResultWriter, SINK_HEADER};
pub use text_decoder::TextDecoder;
