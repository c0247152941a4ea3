//! In-memory providers for embedding the pipeline without external services

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{FileRef, ParsedResult};

use super::file_source::FileSource;
use super::result_writer::ResultWriter;

/// Folders of files held in memory
#[derive(Default)]
pub struct MemoryFileSource {
    folders: RwLock<BTreeMap<String, Vec<FileRef>>>,
    contents: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryFileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file to a folder, creating the folder on first use
    pub fn add_file(&self, folder: &str, file: FileRef, data: impl Into<Vec<u8>>) {
        self.contents.write().insert(file.file_id.clone(), data.into());
        self.folders
            .write()
            .entry(folder.to_string())
            .or_default()
            .push(file);
    }

    pub fn with_file(self, folder: &str, file: FileRef, data: impl Into<Vec<u8>>) -> Self {
        self.add_file(folder, file, data);
        self
    }

    /// Register an empty folder
    pub fn add_folder(&self, folder: &str) {
        self.folders.write().entry(folder.to_string()).or_default();
    }
}

#[async_trait]
impl FileSource for MemoryFileSource {
    async fn list_files(&self, folder_reference: &str) -> Result<Vec<FileRef>> {
        self.folders
            .read()
            .get(folder_reference)
            .cloned()
            .ok_or_else(|| Error::InvalidInput(format!("Folder not found: {}", folder_reference)))
    }

    async fn download(&self, file: &FileRef) -> Result<Vec<u8>> {
        self.contents
            .read()
            .get(&file.file_id)
            .cloned()
            .ok_or_else(|| Error::file_parse(&file.name, "File not found"))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[derive(Debug, Clone)]
struct StoredRow {
    job_id: Uuid,
    key: String,
    result: ParsedResult,
}

/// Sink rows held in memory, upserted by `(job_id, result_key)`
#[derive(Default)]
pub struct MemoryResultWriter {
    sinks: Mutex<BTreeMap<String, Vec<StoredRow>>>,
    append_calls: AtomicUsize,
    failures_left: AtomicUsize,
    fail_create: Mutex<bool>,
}

impl MemoryResultWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` appends fail with a retryable 503
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Make sink creation fail with a permanent 403
    pub fn fail_create(&self, fail: bool) {
        *self.fail_create.lock() = fail;
    }

    /// Successful `append_rows` calls so far
    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.lock().len()
    }

    /// Rows written for a job across every sink
    pub fn rows(&self, job_id: Uuid) -> Vec<ParsedResult> {
        self.sinks
            .lock()
            .values()
            .flatten()
            .filter(|row| row.job_id == job_id)
            .map(|row| row.result.clone())
            .collect()
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ResultWriter for MemoryResultWriter {
    async fn create_sink(&self, title: &str) -> Result<String> {
        if *self.fail_create.lock() {
            return Err(Error::http(403, "sink creation not permitted"));
        }
        let mut sinks = self.sinks.lock();
        let reference = format!("memory://{}/{}", title, sinks.len() + 1);
        sinks.insert(reference.clone(), Vec::new());
        Ok(reference)
    }

    async fn append_rows(
        &self,
        sink_reference: &str,
        job_id: Uuid,
        batch: &[ParsedResult],
    ) -> Result<()> {
        if self.take_failure() {
            return Err(Error::http(503, "sink unavailable"));
        }

        let mut sinks = self.sinks.lock();
        let rows = sinks.entry(sink_reference.to_string()).or_default();
        for result in batch {
            let key = result.result_key().to_string();
            match rows.iter_mut().find(|row| row.job_id == job_id && row.key == key) {
                Some(row) => row.result = result.clone(),
                None => rows.push(StoredRow {
                    job_id,
                    key,
                    result: result.clone(),
                }),
            }
        }
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
