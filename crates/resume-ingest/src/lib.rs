//! resume-ingest: batch resume ingestion with durable job tracking
//!
//! Enumerates a folder of PDF and DOCX resumes, parses each one (falling back to OCR for
//! image-only PDFs), extracts candidate contact fields with a confidence score and appends
//! them to a spreadsheet-like sink in batches. Jobs live in SQLite so progress survives
//! restarts.

pub mod config;
pub mod error;
pub mod extraction;
pub mod ingestion;
pub mod processing;
pub mod providers;
pub mod server;
pub mod sink;
pub mod storage;
pub mod types;

#[cfg(test)]
mod test_support;

pub use config::IngestConfig;
pub use error::{Error, ErrorClass, Result};
pub use processing::JobManager;
pub use types::{
    CandidateFields, FileRef, JobResults, JobStatus, JobStatusView, ParsedResult, SubmitRequest,
};
