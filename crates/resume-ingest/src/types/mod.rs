//! Core types for the ingestion pipeline

pub mod document;
pub mod job;
pub mod result;

pub use document::{DocumentKind, FileRef, DOCX_MIME, PDF_MIME};
pub use job::{
    FileTask, FileTaskStatus, JobRecord, JobStatus, JobStatusView, SubmitRequest,
};
pub use result::{CandidateFields, JobResults, ParsedResult};
