//! Shared test doubles

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::config::{IngestConfig, ParserConfig, ProcessingConfig};
use crate::error::{Error, Result};
use crate::extraction::CandidateExtractor;
use crate::ingestion::{DocumentParser, ResumePipeline};
use crate::processing::JobManager;
use crate::server::{build_router, state::AppState};
use crate::providers::{FileSource, MemoryResultWriter, OcrEngine, TextDecoder};
use crate::storage::JobStore;
use crate::types::{DocumentKind, FileRef, JobStatusView};

pub const RESUME_TEXT: &str = "Jane Roe\n\
    Senior Software Engineer\n\
    Email: jane.roe@example.com | Phone: +44 7400 123456\n\
    github.com/janeroe\n\
    \n\
    Experience\n\
    Built ingestion pipelines for a decade.\n";

/// File source with per-file misbehaviour
#[derive(Default)]
pub struct ScriptedFileSource {
    files: Vec<(FileRef, Vec<u8>)>,
    listing_failure: Option<u16>,
    timeouts: HashSet<String>,
    gates: HashMap<String, Arc<Semaphore>>,
    downloads: Mutex<HashMap<String, usize>>,
    listings: AtomicUsize,
}

impl ScriptedFileSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, file_id: &str, name: &str, content: impl Into<Vec<u8>>) -> Self {
        self.files.push((FileRef::new(file_id, name), content.into()));
        self
    }

    /// Every listing fails with this HTTP status
    pub fn failing_listing(mut self, status: u16) -> Self {
        self.listing_failure = Some(status);
        self
    }

    /// Every download of this file times out
    pub fn times_out_on(mut self, file_id: &str) -> Self {
        self.timeouts.insert(file_id.to_string());
        self
    }

    /// Downloads of this file wait for [`release`](Self::release)
    pub fn gate(mut self, file_id: &str) -> Self {
        self.gates.insert(file_id.to_string(), Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release(&self, file_id: &str) {
        if let Some(gate) = self.gates.get(file_id) {
            gate.add_permits(1);
        }
    }

    pub fn download_count(&self, file_id: &str) -> usize {
        self.downloads.lock().get(file_id).copied().unwrap_or(0)
    }

    pub fn listing_count(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    pub async fn wait_for_download(&self, file_id: &str) {
        for _ in 0..1000 {
            if self.download_count(file_id) > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{} was never downloaded", file_id);
    }
}

#[async_trait]
impl FileSource for ScriptedFileSource {
    async fn list_files(&self, _folder_reference: &str) -> Result<Vec<FileRef>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.listing_failure {
            return Err(Error::http(status, "listing failed"));
        }
        Ok(self.files.iter().map(|(f, _)| f.clone()).collect())
    }

    async fn download(&self, file: &FileRef) -> Result<Vec<u8>> {
        *self.downloads.lock().entry(file.file_id.clone()).or_default() += 1;

        if let Some(gate) = self.gates.get(&file.file_id) {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| Error::internal(e.to_string()))?;
        }
        if self.timeouts.contains(&file.file_id) {
            return Err(Error::Timeout(format!("download of {}", file.name)));
        }

        self.files
            .iter()
            .find(|(f, _)| f.file_id == file.file_id)
            .map(|(_, data)| data.clone())
            .ok_or_else(|| Error::http(404, format!("{} not found", file.file_id)))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// File content that makes [`Utf8Decoder`] panic
pub const PANIC_CONTENT: &[u8] = b"\0panic";

/// Treats the bytes as UTF-8 text regardless of kind; panics on [`PANIC_CONTENT`]
pub struct Utf8Decoder;

#[async_trait]
impl TextDecoder for Utf8Decoder {
    async fn decode_text(&self, data: &[u8], _kind: DocumentKind) -> Result<String> {
        if data == PANIC_CONTENT {
            panic!("decoder blew up");
        }
        String::from_utf8(data.to_vec()).map_err(|e| Error::file_parse("test", e.to_string()))
    }

    fn name(&self) -> &str {
        "utf8"
    }
}

/// OCR engine with a canned answer
pub struct ScriptedOcr {
    response: std::result::Result<String, String>,
    calls: AtomicUsize,
}

impl ScriptedOcr {
    pub fn returning(text: &str) -> Self {
        Self {
            response: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrEngine for ScriptedOcr {
    async fn ocr(&self, _data: &[u8], _kind: DocumentKind) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone().map_err(Error::ocr)
    }

    fn name(&self) -> &str {
        "scripted-ocr"
    }
}

/// Millisecond retry delays and small batches
pub fn fast_processing() -> ProcessingConfig {
    ProcessingConfig {
        max_concurrency: 4,
        batch_size: 2,
        max_retries: 2,
        base_retry_delay_ms: 1,
        max_retry_delay_ms: 2,
        file_timeout_secs: 5,
    }
}

/// Manager over an in-memory store, the given source and a memory writer
pub fn test_manager(
    source: ScriptedFileSource,
    processing: ProcessingConfig,
) -> (JobManager, Arc<ScriptedFileSource>, Arc<MemoryResultWriter>) {
    let config = IngestConfig {
        processing,
        ..IngestConfig::default()
    };
    let source = Arc::new(source);
    let writer = Arc::new(MemoryResultWriter::new());

    let parser = DocumentParser::new(
        Arc::new(Utf8Decoder),
        Some(Arc::new(ScriptedOcr::returning(RESUME_TEXT)) as Arc<dyn OcrEngine>),
        &ParserConfig::default(),
    );
    let pipeline = ResumePipeline::new(
        source.clone(),
        parser,
        CandidateExtractor::new(&config.extraction),
    );
    let store = Arc::new(JobStore::in_memory().expect("in-memory store"));

    let manager = JobManager::new(&config, store, Arc::new(pipeline), writer.clone());
    (manager, source, writer)
}

/// Poll until the job reaches a terminal state
pub async fn wait_for_terminal(manager: &JobManager, job_id: Uuid) -> JobStatusView {
    for _ in 0..1000 {
        let status = manager.get_status(job_id).await.expect("job status");
        if status.status.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {} did not finish", job_id);
}

/// Router over [`test_manager`] with fast processing
pub fn test_app(source: ScriptedFileSource) -> (axum::Router, JobManager, Arc<ScriptedFileSource>) {
    let (manager, source, _) = test_manager(source, fast_processing());
    let state = AppState::with_manager(IngestConfig::default(), manager.clone());
    (build_router(state), manager, source)
}

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body");
    serde_json::from_slice(&bytes).expect("json body")
}
