//! Job lifecycle types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::FileRef;

/// Job lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, files not yet enumerated
    Pending,
    /// Files are being processed
    Processing,
    /// Every file has a result
    Completed,
    /// Job-fatal error (enumeration, sink creation)
    Failed,
    /// Cancellation kept at least one file from starting
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Allowed edges of the job state machine
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable job record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub id: Uuid,
    pub folder_reference: String,
    pub status: JobStatus,
    /// Unset until enumeration finishes
    pub total_files: Option<usize>,
    pub processed_files: usize,
    /// Results confirmed written to the sink
    pub flushed_files: usize,
    pub sink_reference: Option<String>,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Last sink flush that ran out of retries
    pub sink_error: Option<String>,
    pub results_ttl_secs: u64,
    /// Optimistic concurrency counter
    pub version: u64,
}

impl JobRecord {
    pub fn new(
        folder_reference: impl Into<String>,
        sink_reference: Option<String>,
        results_ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            folder_reference: folder_reference.into(),
            status: JobStatus::Pending,
            total_files: None,
            processed_files: 0,
            flushed_files: 0,
            sink_reference,
            cancel_requested: false,
            created_at: now,
            updated_at: now,
            completed_at: None,
            expires_at: None,
            error: None,
            sink_error: None,
            results_ttl_secs: results_ttl.as_secs(),
            version: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    /// Every enumerated file has a recorded result
    pub fn all_processed(&self) -> bool {
        self.total_files == Some(self.processed_files)
    }

    /// Percentage of files confirmed written to the sink
    pub fn progress(&self) -> u8 {
        if self.status == JobStatus::Completed {
            return 100;
        }
        match self.total_files {
            Some(total) if total > 0 => {
                ((self.flushed_files.min(total) * 100) / total) as u8
            }
            _ => 0,
        }
    }

    /// Move along the state machine. Terminal states stamp completion and expiry.
    pub fn transition(&mut self, next: JobStatus) -> crate::Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(crate::Error::InvalidTransition(format!(
                "{} -> {} for job {}",
                self.status, next, self.id
            )));
        }
        if next == JobStatus::Completed && !self.all_processed() {
            return Err(crate::Error::InvalidTransition(format!(
                "job {} cannot complete with {}/{:?} files processed",
                self.id, self.processed_files, self.total_files
            )));
        }
        self.status = next;
        if next.is_terminal() {
            let now = Utc::now();
            self.completed_at = Some(now);
            // A TTL past chrono's range never expires
            self.expires_at = i64::try_from(self.results_ttl_secs)
                .ok()
                .and_then(chrono::TimeDelta::try_seconds)
                .and_then(|ttl| now.checked_add_signed(ttl));
        }
        Ok(())
    }
}

/// Caller-facing snapshot of a job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatusView {
    pub job_id: Uuid,
    pub folder_reference: String,
    pub status: JobStatus,
    pub total_files: Option<usize>,
    pub processed_files: usize,
    pub flushed_files: usize,
    /// 0..=100, advances as batches reach the sink
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink_reference: Option<String>,
    pub results_count: usize,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobStatusView {
    pub fn from_record(record: &JobRecord, results_count: usize) -> Self {
        Self {
            job_id: record.id,
            folder_reference: record.folder_reference.clone(),
            status: record.status,
            total_files: record.total_files,
            processed_files: record.processed_files,
            flushed_files: record.flushed_files,
            progress: record.progress(),
            error: record.error.clone(),
            sink_error: record.sink_error.clone(),
            sink_reference: record.sink_reference.clone(),
            results_count,
            cancel_requested: record.cancel_requested,
            created_at: record.created_at,
            completed_at: record.completed_at,
        }
    }
}

/// Parameters for a new job
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    /// Folder to enumerate (required)
    pub folder_reference: String,
    /// Existing sink; created on demand when absent
    pub sink_reference: Option<String>,
    /// Overrides the configured results TTL
    pub results_ttl: Option<Duration>,
}

impl SubmitRequest {
    pub fn new(folder_reference: impl Into<String>) -> Self {
        Self {
            folder_reference: folder_reference.into(),
            ..Default::default()
        }
    }

    pub fn with_sink(mut self, sink_reference: impl Into<String>) -> Self {
        self.sink_reference = Some(sink_reference.into());
        self
    }

    pub fn with_results_ttl(mut self, ttl: Duration) -> Self {
        self.results_ttl = Some(ttl);
        self
    }
}

/// Per-file task status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileTaskStatus {
    Queued,
    InFlight,
    Succeeded,
    FailedPermanent,
    FailedRetryable,
}

/// One unit of work per source file
#[derive(Debug, Clone, PartialEq)]
pub struct FileTask {
    pub file: FileRef,
    pub attempt_count: u32,
    pub status: FileTaskStatus,
}

impl FileTask {
    pub fn new(file: FileRef) -> Self {
        Self {
            file,
            attempt_count: 0,
            status: FileTaskStatus::Queued,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            FileTaskStatus::Succeeded | FileTaskStatus::FailedPermanent
        )
    }
}
