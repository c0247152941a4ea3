//! Batched, deduplicated delivery of results to a [`ResultWriter`]

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::processing::RetryPolicy;
use crate::providers::ResultWriter;
use crate::storage::JobStore;
use crate::types::ParsedResult;

/// What one flush did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Rows accepted by the writer
    pub written: usize,
    /// Rows dropped because their key was already flushed
    pub skipped: usize,
    /// Rows kept in the buffer after the writer ran out of retries
    pub pending: usize,
}

/// Per-job result buffer.
///
/// Keys are `ParsedResult::result_key`. A key is marked flushed in the
/// [`JobStore`] only after the writer accepted it, so a key is written at most
/// once per job even across restarts.
pub struct ResultSink {
    job_id: Uuid,
    sink_reference: String,
    writer: Arc<dyn ResultWriter>,
    store: Arc<JobStore>,
    retry: RetryPolicy,
    batch_size: usize,
    buffer: Vec<ParsedResult>,
    positions: HashMap<String, usize>,
}

impl ResultSink {
    pub fn new(
        job_id: Uuid,
        sink_reference: impl Into<String>,
        writer: Arc<dyn ResultWriter>,
        store: Arc<JobStore>,
        retry: RetryPolicy,
        batch_size: usize,
    ) -> Self {
        Self {
            job_id,
            sink_reference: sink_reference.into(),
            writer,
            store,
            retry,
            batch_size: batch_size.max(1),
            buffer: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn sink_reference(&self) -> &str {
        &self.sink_reference
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Buffer a result, flushing once the batch is full
    pub async fn push(&mut self, result: ParsedResult) -> Result<Option<FlushOutcome>> {
        let key = result.result_key().to_string();
        match self.positions.get(&key) {
            Some(&index) => self.buffer[index] = result,
            None => {
                self.positions.insert(key, self.buffer.len());
                self.buffer.push(result);
            }
        }

        if self.buffer.len() >= self.batch_size {
            return self.flush().await.map(Some);
        }
        Ok(None)
    }

    /// Write everything buffered.
    ///
    /// A write that exhausts its retries records `sink_error` on the job and
    /// keeps the rows buffered for the next flush. Only store failures are
    /// returned as errors.
    pub async fn flush(&mut self) -> Result<FlushOutcome> {
        if self.buffer.is_empty() {
            return Ok(FlushOutcome::default());
        }

        let flushed = self.store.flushed_keys(self.job_id)?;
        let before = self.buffer.len();
        self.buffer.retain(|r| !flushed.contains(r.result_key()));
        let skipped = before - self.buffer.len();
        self.reindex();

        if self.buffer.is_empty() {
            return Ok(FlushOutcome {
                skipped,
                ..Default::default()
            });
        }

        let label = format!("sink flush for job {}", self.job_id);
        let writer = self.writer.clone();
        let sink_reference = self.sink_reference.clone();
        let job_id = self.job_id;
        let batch = &self.buffer;

        let outcome = self
            .retry
            .run(&label, Error::class, |_| {
                let writer = writer.clone();
                let sink_reference = sink_reference.clone();
                async move { writer.append_rows(&sink_reference, job_id, batch).await }
            })
            .await;

        match outcome.result {
            Ok(()) => {
                let keys: Vec<String> = self
                    .buffer
                    .iter()
                    .map(|r| r.result_key().to_string())
                    .collect();
                self.store.mark_flushed(self.job_id, &keys)?;
                let written = keys.len();
                self.buffer.clear();
                self.positions.clear();

                tracing::info!(
                    "[Job {}] Flushed {} rows to {} ({} already written)",
                    self.job_id,
                    written,
                    self.writer.name(),
                    skipped
                );
                Ok(FlushOutcome {
                    written,
                    skipped,
                    pending: 0,
                })
            }
            Err(e) => {
                let message = format!(
                    "Failed to write {} rows after {} attempts: {}",
                    self.buffer.len(),
                    outcome.state.attempt,
                    e
                );
                tracing::error!("[Job {}] {}", self.job_id, message);
                self.store.update_job(self.job_id, |job| {
                    job.sink_error = Some(message.clone());
                    Ok(())
                })?;
                Ok(FlushOutcome {
                    written: 0,
                    skipped,
                    pending: self.buffer.len(),
                })
            }
        }
    }

    fn reindex(&mut self) {
        self.positions = self
            .buffer
            .iter()
            .enumerate()
            .map(|(i, r)| (r.result_key().to_string(), i))
            .collect();
    }
}
