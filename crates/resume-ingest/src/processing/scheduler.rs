//! Bounded-concurrency execution of per-file pipelines

use futures_util::future::join_all;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;
use uuid::Uuid;

use crate::config::ProcessingConfig;
use crate::error::{Error, Result};
use crate::types::{FileRef, FileTask, FileTaskStatus, ParsedResult};

use super::retry::RetryPolicy;

/// One finished task
#[derive(Debug, Clone)]
pub struct TaskCompletion {
    pub result: ParsedResult,
    pub task: FileTask,
}

/// Counts for one scheduler run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleSummary {
    /// Tasks that ran and emitted a completion
    pub started: usize,
    /// Tasks never started because of cancellation
    pub skipped: usize,
}

/// Runs at most `max_concurrency` file pipelines at a time
#[derive(Debug, Clone)]
pub struct ConcurrencyScheduler {
    max_concurrency: usize,
    file_timeout: Duration,
    retry: RetryPolicy,
}

impl ConcurrencyScheduler {
    pub fn new(max_concurrency: usize, file_timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            file_timeout,
            retry,
        }
    }

    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self::new(
            config.max_concurrency,
            config.file_timeout(),
            RetryPolicy::from_config(config),
        )
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run every task, sending one [`TaskCompletion`] per task that started.
    ///
    /// `cancel` is checked as each task obtains a slot; once set, remaining
    /// tasks are skipped while in-flight ones finish. Failures stay with
    /// their own task.
    pub async fn run<F, Fut>(
        &self,
        job_id: Uuid,
        tasks: Vec<FileTask>,
        cancel: Arc<AtomicBool>,
        pipeline: F,
        completions: mpsc::Sender<TaskCompletion>,
    ) -> ScheduleSummary
    where
        F: Fn(FileRef) -> Fut,
        Fut: Future<Output = Result<ParsedResult>>,
    {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let pipeline = &pipeline;

        tracing::info!(
            "[Job {}] Scheduling {} files, {} at a time",
            job_id,
            tasks.len(),
            self.max_concurrency
        );

        let task_futures: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let sem = semaphore.clone();
                let cancel = cancel.clone();
                let completions = completions.clone();

                async move {
                    let _permit = match sem.acquire().await {
                        Ok(permit) => permit,
                        Err(_) => return false,
                    };
                    if cancel.load(Ordering::SeqCst) {
                        tracing::debug!(
                            "[Job {}] Skipping {} after cancellation",
                            job_id,
                            task.file.name
                        );
                        return false;
                    }

                    let completion = self.run_task(job_id, task, pipeline).await;
                    if completions.send(completion).await.is_err() {
                        tracing::warn!("[Job {}] Completion receiver dropped", job_id);
                    }
                    true
                }
            })
            .collect();

        let started_flags = join_all(task_futures).await;
        let started = started_flags.iter().filter(|s| **s).count();
        let summary = ScheduleSummary {
            started,
            skipped: started_flags.len() - started,
        };

        if summary.skipped > 0 {
            tracing::info!(
                "[Job {}] {} files started, {} skipped after cancellation",
                job_id,
                summary.started,
                summary.skipped
            );
        }
        summary
    }

    async fn run_task<F, Fut>(
        &self,
        job_id: Uuid,
        mut task: FileTask,
        pipeline: &F,
    ) -> TaskCompletion
    where
        F: Fn(FileRef) -> Fut,
        Fut: Future<Output = Result<ParsedResult>>,
    {
        let start = Instant::now();
        let file_timeout = self.file_timeout;
        task.status = FileTaskStatus::InFlight;
        tracing::info!("[{}] Starting processing", task.file.name);

        let label = task.file.name.clone();
        let file = &task.file;
        let outcome = self
            .retry
            .run(&label, Error::class, |_| {
                let attempt = pipeline(file.clone());
                async move {
                    match timeout(file_timeout, attempt).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::Timeout(format!(
                            "{} exceeded the {}ms file timeout",
                            file.name,
                            file_timeout.as_millis()
                        ))),
                    }
                }
            })
            .await;

        task.attempt_count = outcome.state.attempt;
        let result = match outcome.result {
            Ok(result) => {
                task.status = FileTaskStatus::Succeeded;
                result.with_attempts(task.attempt_count)
            }
            Err(e) => {
                task.status = FileTaskStatus::FailedPermanent;
                tracing::warn!(
                    "[Job {}] {} failed after {} attempts: {}",
                    job_id,
                    task.file.name,
                    task.attempt_count,
                    e
                );
                ParsedResult::failed(&task.file, task.attempt_count, outcome.state.errors)
            }
        };

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 60 {
            tracing::warn!(
                "Slow processing for '{}': took {:.1}s",
                task.file.name,
                elapsed.as_secs_f64()
            );
        }

        TaskCompletion { result, task }
    }
}
