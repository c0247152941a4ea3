//! Job lifecycle: submission, enumeration, scheduling and completion

use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{IngestConfig, MAX_RESULTS_TTL_SECS};
use crate::error::{Error, Result};
use crate::ingestion::ResumePipeline;
use crate::providers::ResultWriter;
use crate::sink::ResultSink;
use crate::storage::JobStore;
use crate::types::{
    FileRef, FileTask, JobResults, JobStatus, JobRecord, JobStatusView, ParsedResult, SubmitRequest,
};

use super::retry::RetryPolicy;
use super::scheduler::ConcurrencyScheduler;

const DEFAULT_SINK_TITLE: &str = "Resume Data";

/// Owns every job from submission to a terminal state.
///
/// Cheap to clone; clones share the same store and cancellation flags.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<JobManagerInner>,
}

struct JobManagerInner {
    store: Arc<JobStore>,
    pipeline: Arc<ResumePipeline>,
    writer: Arc<dyn ResultWriter>,
    scheduler: ConcurrencyScheduler,
    retry: RetryPolicy,
    batch_size: usize,
    results_ttl: Duration,
    purge_interval: Duration,
    sink_title_prefix: String,
    cancel_flags: DashMap<Uuid, Arc<AtomicBool>>,
}

impl JobManager {
    pub fn new(
        config: &IngestConfig,
        store: Arc<JobStore>,
        pipeline: Arc<ResumePipeline>,
        writer: Arc<dyn ResultWriter>,
    ) -> Self {
        let sink_title_prefix = config
            .google
            .as_ref()
            .map(|g| g.spreadsheet_title_prefix.clone())
            .unwrap_or_else(|| DEFAULT_SINK_TITLE.to_string());

        Self {
            inner: Arc::new(JobManagerInner {
                store,
                pipeline,
                writer,
                scheduler: ConcurrencyScheduler::from_config(&config.processing),
                retry: RetryPolicy::from_config(&config.processing),
                batch_size: config.processing.batch_size,
                results_ttl: config.storage.results_ttl(),
                purge_interval: Duration::from_secs(config.storage.purge_interval_secs.max(1)),
                sink_title_prefix,
                cancel_flags: DashMap::new(),
            }),
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.inner.store
    }

    /// Create a pending job and start it in the background
    pub async fn submit(&self, request: SubmitRequest) -> Result<Uuid> {
        let folder = request.folder_reference.trim();
        if folder.is_empty() {
            return Err(Error::InvalidInput("folder reference is required".to_string()));
        }

        let sink_reference = request
            .sink_reference
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let ttl = request.results_ttl.unwrap_or(self.inner.results_ttl);
        if ttl.as_secs() > MAX_RESULTS_TTL_SECS {
            return Err(Error::InvalidInput(format!(
                "results TTL must be at most {} seconds, got {}",
                MAX_RESULTS_TTL_SECS,
                ttl.as_secs()
            )));
        }

        let job = JobRecord::new(folder, sink_reference, ttl);
        self.inner.store.create_job(&job)?;
        self.cancel_flag(job.id);

        tracing::info!("[Job {}] Submitted for folder {}", job.id, folder);
        self.dispatch(job.id, HashSet::new());
        Ok(job.id)
    }

    pub async fn get_status(&self, job_id: Uuid) -> Result<JobStatusView> {
        let job = self.inner.store.get_job(job_id)?;
        let results_count = self.inner.store.results_count(job_id)?;
        Ok(JobStatusView::from_record(&job, results_count))
    }

    /// Results so far; `Pending` until processing begins
    pub async fn get_results(&self, job_id: Uuid) -> Result<JobResults> {
        let job = self.inner.store.get_job(job_id)?;
        if job.status == JobStatus::Pending {
            return Ok(JobResults::Pending);
        }
        Ok(JobResults::Ready(self.inner.store.list_results(job_id)?))
    }

    /// Stop starting new files. In-flight files finish; terminal jobs are untouched.
    pub async fn cancel(&self, job_id: Uuid) -> Result<()> {
        let job = self.inner.store.request_cancel(job_id)?;
        if job.is_terminal() {
            tracing::debug!("[Job {}] Cancel ignored, job is {}", job_id, job.status);
            return Ok(());
        }

        self.cancel_flag(job_id).store(true, Ordering::SeqCst);
        tracing::info!("[Job {}] Cancellation requested", job_id);
        Ok(())
    }

    /// Most recent jobs first
    pub async fn list_jobs(&self, limit: usize) -> Result<Vec<JobStatusView>> {
        self.inner
            .store
            .list_recent(limit)?
            .iter()
            .map(|job| -> Result<JobStatusView> {
                let count = self.inner.store.results_count(job.id)?;
                Ok(JobStatusView::from_record(job, count))
            })
            .collect()
    }

    /// Parse a single uploaded file outside of any job
    pub async fn parse_document(&self, filename: &str, data: &[u8]) -> Result<ParsedResult> {
        self.inner.pipeline.parse_bytes(filename, data).await
    }

    /// Re-dispatch jobs a previous process left pending or processing.
    ///
    /// Files that already have a recorded result are not run again.
    pub async fn resume_incomplete(&self) -> Result<usize> {
        let jobs = self.inner.store.incomplete_jobs()?;
        for job in &jobs {
            let done = self.inner.store.recorded_keys(job.id)?;
            let flag = self.cancel_flag(job.id);
            if job.cancel_requested {
                flag.store(true, Ordering::SeqCst);
            }
            tracing::info!(
                "[Job {}] Resuming ({} files already recorded)",
                job.id,
                done.len()
            );
            self.dispatch(job.id, done);
        }
        Ok(jobs.len())
    }

    /// Periodically delete jobs past their results TTL
    pub fn spawn_janitor(&self) -> JoinHandle<()> {
        let store = self.inner.store.clone();
        let period = self.inner.purge_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                match store.purge_expired(Utc::now()) {
                    Ok(0) => {}
                    Ok(n) => tracing::info!("Purged {} expired jobs", n),
                    Err(e) => tracing::warn!("Failed to purge expired jobs: {}", e),
                }
            }
        })
    }

    fn cancel_flag(&self, job_id: Uuid) -> Arc<AtomicBool> {
        self.inner
            .cancel_flags
            .entry(job_id)
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }

    fn dispatch(&self, job_id: Uuid, already_recorded: HashSet<String>) {
        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_job(job_id, already_recorded).await;
        });
    }

    async fn run_job(&self, job_id: Uuid, already_recorded: HashSet<String>) {
        if let Err(e) = self.execute(job_id, already_recorded).await {
            tracing::error!("[Job {}] Aborted: {}", job_id, e);
            self.fail_job(job_id, e.to_string());
        }
        self.inner.cancel_flags.remove(&job_id);
    }

    /// Move a live job to `failed`, keeping the first error recorded
    fn fail_job(&self, job_id: Uuid, message: String) {
        let result = self.inner.store.update_job(job_id, |job| {
            if job.is_terminal() {
                return Ok(());
            }
            job.transition(JobStatus::Failed)?;
            job.error = Some(message.clone());
            Ok(())
        });
        if let Err(e) = result {
            tracing::error!("[Job {}] Could not record failure: {}", job_id, e);
        }
    }

    async fn execute(&self, job_id: Uuid, already_recorded: HashSet<String>) -> Result<()> {
        let inner = &self.inner;
        let job = inner.store.get_job(job_id)?;
        if job.is_terminal() {
            return Ok(());
        }

        let cancel = self.cancel_flag(job_id);
        if job.cancel_requested || cancel.load(Ordering::SeqCst) {
            inner.store.transition(job_id, JobStatus::Cancelled, None)?;
            tracing::info!("[Job {}] Cancelled before processing", job_id);
            return Ok(());
        }

        // Enumeration
        let source = inner.pipeline.source().clone();
        let folder = job.folder_reference.clone();
        let listing = inner
            .retry
            .run(&format!("listing {}", folder), Error::class, |_| {
                let source = source.clone();
                let folder = folder.clone();
                async move { source.list_files(&folder).await }
            })
            .await;

        let files = match listing.result {
            Ok(files) => files,
            Err(e) => {
                tracing::error!("[Job {}] Folder listing failed: {}", job_id, e);
                self.fail_job(job_id, format!("Folder listing failed: {}", e));
                return Ok(());
            }
        };

        if let Some(known) = job.total_files {
            if known != files.len() {
                self.fail_job(
                    job_id,
                    format!(
                        "Folder contents changed since the job started: expected {} files, found {}",
                        known,
                        files.len()
                    ),
                );
                return Ok(());
            }
        }

        tracing::info!("[Job {}] Found {} files in {}", job_id, files.len(), folder);

        if files.is_empty() {
            inner.store.update_job(job_id, |job| {
                job.total_files = Some(0);
                if job.status == JobStatus::Pending {
                    job.transition(JobStatus::Processing)?;
                }
                job.transition(JobStatus::Completed)
            })?;
            tracing::info!("[Job {}] Empty folder, completed", job_id);
            return Ok(());
        }

        // Sink
        let sink_reference = match job.sink_reference.clone() {
            Some(reference) => reference,
            None => match self.create_sink(job_id).await {
                Ok(reference) => reference,
                Err(e) => {
                    tracing::error!("[Job {}] Sink creation failed: {}", job_id, e);
                    self.fail_job(job_id, format!("Sink creation failed: {}", e));
                    return Ok(());
                }
            },
        };

        let total = files.len();
        inner.store.update_job(job_id, |job| {
            job.total_files = Some(total);
            job.sink_reference = Some(sink_reference.clone());
            if job.status == JobStatus::Pending {
                job.transition(JobStatus::Processing)?;
            }
            Ok(())
        })?;

        let mut sink = ResultSink::new(
            job_id,
            sink_reference,
            inner.writer.clone(),
            inner.store.clone(),
            inner.retry.clone(),
            inner.batch_size,
        );

        // Recorded before a restart but possibly never written
        if !already_recorded.is_empty() {
            for result in inner.store.list_results(job_id)? {
                sink.push(result).await?;
            }
        }

        let tasks: Vec<FileTask> = files
            .into_iter()
            .filter(|file: &FileRef| !already_recorded.contains(file.result_key()))
            .map(FileTask::new)
            .collect();

        // Scheduling
        let (tx, mut rx) = mpsc::channel(inner.scheduler.max_concurrency() * 2);
        let pipeline = inner.pipeline.clone();
        let schedule = inner.scheduler.run(
            job_id,
            tasks,
            cancel.clone(),
            move |file| {
                let pipeline = pipeline.clone();
                async move { pipeline.process(&file).await }
            },
            tx,
        );

        let consume = async {
            while let Some(completion) = rx.recv().await {
                match inner.store.record_result(job_id, &completion.result) {
                    Ok(true) => {}
                    Ok(false) => tracing::debug!(
                        "[Job {}] Duplicate completion for {}",
                        job_id,
                        completion.result.source_file
                    ),
                    Err(e) => tracing::error!(
                        "[Job {}] Failed to record {}: {}",
                        job_id,
                        completion.result.source_file,
                        e
                    ),
                }
                if let Err(e) = sink.push(completion.result).await {
                    tracing::error!("[Job {}] Failed to buffer result: {}", job_id, e);
                }
            }
        };

        let (summary, ()) = tokio::join!(schedule, consume);

        // Completion detection
        if let Err(e) = sink.flush().await {
            tracing::error!("[Job {}] Final flush failed: {}", job_id, e);
        }

        let cancelled = summary.skipped > 0 || cancel.load(Ordering::SeqCst);
        let job = inner.store.update_job(job_id, |job| {
            if job.is_terminal() {
                return Ok(());
            }
            if job.all_processed() {
                job.transition(JobStatus::Completed)
            } else if cancelled || job.cancel_requested {
                job.transition(JobStatus::Cancelled)
            } else {
                job.error = Some(format!(
                    "{} of {} files have no recorded result",
                    total.saturating_sub(job.processed_files),
                    total
                ));
                job.transition(JobStatus::Failed)
            }
        })?;

        tracing::info!(
            "[Job {}] Finished as {}: {}/{} processed, {} flushed",
            job_id,
            job.status,
            job.processed_files,
            total,
            job.flushed_files
        );
        Ok(())
    }

    async fn create_sink(&self, job_id: Uuid) -> Result<String> {
        let title = format!(
            "{} {}",
            self.inner.sink_title_prefix,
            Utc::now().format("%Y-%m-%d %H:%M")
        );
        let writer = self.inner.writer.clone();

        let outcome = self
            .inner
            .retry
            .run(&format!("sink creation for job {}", job_id), Error::class, |_| {
                let writer = writer.clone();
                let title = title.clone();
                async move { writer.create_sink(&title).await }
            })
            .await;

        let reference = outcome.result?;
        tracing::info!("[Job {}] Created sink {} via {}", job_id, reference, writer.name());
        Ok(reference)
    }
}
