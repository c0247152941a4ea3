//! Per-file extraction results

use serde::{Deserialize, Serialize};

use super::FileRef;

/// Candidate fields pulled from resume text
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateFields {
    pub name: Option<String>,
    pub email: Option<String>,
    /// E.164
    pub phone: Option<String>,
    pub linkedin: Option<String>,
    pub github: Option<String>,
}

/// Outcome of processing one source file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedResult {
    pub source_file: String,
    pub file_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub linkedin: Option<String>,
    pub github: Option<String>,
    /// 0.0..=1.0
    pub confidence: f64,
    pub ocr_used: bool,
    pub attempts: u32,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ParsedResult {
    pub fn from_fields(
        source_file: impl Into<String>,
        file_id: Option<String>,
        fields: CandidateFields,
        confidence: f64,
        ocr_used: bool,
    ) -> Self {
        Self {
            source_file: source_file.into(),
            file_id,
            name: fields.name,
            email: fields.email,
            phone: fields.phone,
            linkedin: fields.linkedin,
            github: fields.github,
            confidence: confidence.clamp(0.0, 1.0),
            ocr_used,
            attempts: 1,
            errors: Vec::new(),
        }
    }

    /// Terminal failure: no fields, errors populated
    pub fn failed(file: &FileRef, attempts: u32, errors: Vec<String>) -> Self {
        Self {
            source_file: file.name.clone(),
            file_id: non_empty(&file.file_id),
            name: None,
            email: None,
            phone: None,
            linkedin: None,
            github: None,
            confidence: 0.0,
            ocr_used: false,
            attempts,
            errors,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Dedupe key within a job; file ids are unique where names may not be
    pub fn result_key(&self) -> &str {
        self.file_id.as_deref().unwrap_or(&self.source_file)
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Answer to a results query
#[derive(Debug, Clone, PartialEq)]
pub enum JobResults {
    /// Job has not started processing yet
    Pending,
    /// Results recorded so far (complete once the job is terminal)
    Ready(Vec<ParsedResult>),
}
