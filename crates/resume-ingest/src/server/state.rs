//! Application state for the ingestion server

use std::sync::Arc;

use crate::config::{BackendProvider, IngestConfig};
use crate::error::{Error, Result};
use crate::extraction::CandidateExtractor;
use crate::ingestion::{DocumentParser, NativeDecoder, ResumePipeline, TesseractOcr};
use crate::processing::JobManager;
use crate::providers::{
    CsvResultWriter, FileSource, LocalFolderSource, OcrEngine, ResultWriter,
};
#[cfg(feature = "gcp")]
use crate::providers::gcp::{DocumentAiOcr, DriveFileSource, GoogleAuth, SheetsResultWriter};
use crate::storage::JobStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: IngestConfig,
    manager: JobManager,
}

/// Capabilities selected by the configured backend
struct Backend {
    source: Arc<dyn FileSource>,
    writer: Arc<dyn ResultWriter>,
    ocr: Option<Arc<dyn OcrEngine>>,
}

impl AppState {
    /// Wire the configured backend, open the job store and resume unfinished jobs
    pub async fn new(config: IngestConfig) -> Result<Self> {
        tracing::info!(
            "Initializing ingestion state (backend: {:?})...",
            config.backend
        );

        let backend = build_backend(&config)?;
        tracing::info!(
            "Backend ready: source={}, sink={}, ocr={}",
            backend.source.name(),
            backend.writer.name(),
            backend.ocr.as_ref().map(|o| o.name()).unwrap_or("none")
        );

        let parser = DocumentParser::new(
            Arc::new(NativeDecoder::from_config(&config.parser)),
            backend.ocr,
            &config.parser,
        );
        let pipeline = ResumePipeline::new(
            backend.source,
            parser,
            CandidateExtractor::new(&config.extraction),
        );

        let store = Arc::new(JobStore::new(&config.storage.database_path)?);
        tracing::info!(
            "Job store opened at {}",
            config.storage.database_path.display()
        );

        let manager = JobManager::new(&config, store, Arc::new(pipeline), backend.writer);

        let resumed = manager.resume_incomplete().await?;
        if resumed > 0 {
            tracing::info!("Resumed {} unfinished jobs", resumed);
        }
        manager.spawn_janitor();

        Ok(Self::with_manager(config, manager))
    }

    /// Wrap an already-built manager
    pub fn with_manager(config: IngestConfig, manager: JobManager) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, manager }),
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.inner.config
    }

    pub fn manager(&self) -> &JobManager {
        &self.inner.manager
    }
}

fn build_backend(config: &IngestConfig) -> Result<Backend> {
    match config.backend {
        BackendProvider::Local => {
            tracing::info!(
                "Local backend: reading {}, writing CSV to {}",
                config.local.root_dir.display(),
                config.local.output_dir.display()
            );
            Ok(Backend {
                source: Arc::new(LocalFolderSource::from_config(&config.local)),
                writer: Arc::new(CsvResultWriter::from_config(&config.local)),
                ocr: tesseract(config),
            })
        }
        BackendProvider::Google => google_backend(config),
    }
}

#[cfg(feature = "gcp")]
fn google_backend(config: &IngestConfig) -> Result<Backend> {
    let google = config
        .google
        .as_ref()
        .ok_or_else(|| Error::Config("google backend requires a [google] section".to_string()))?;
    let auth = Arc::new(GoogleAuth::from_config(google)?);

    let ocr: Option<Arc<dyn OcrEngine>> = match &google.document_ai_processor {
        Some(processor) if !processor.trim().is_empty() => {
            tracing::info!("Using Document AI processor {}", processor);
            let engine = DocumentAiOcr::new(auth.clone(), processor.clone());
            Some(Arc::new(engine) as Arc<dyn OcrEngine>)
        }
        _ => tesseract(config),
    };

    Ok(Backend {
        source: Arc::new(DriveFileSource::new(auth.clone())),
        writer: Arc::new(SheetsResultWriter::new(auth)),
        ocr,
    })
}

#[cfg(not(feature = "gcp"))]
fn google_backend(_config: &IngestConfig) -> Result<Backend> {
    Err(Error::Config(
        "google backend requires the `gcp` feature".to_string(),
    ))
}

fn tesseract(config: &IngestConfig) -> Option<Arc<dyn OcrEngine>> {
    if TesseractOcr::is_available() {
        Some(Arc::new(TesseractOcr::from_config(&config.parser)) as Arc<dyn OcrEngine>)
    } else {
        tracing::warn!("tesseract or pdftoppm not found, image-only PDFs will fail to parse");
        None
    }
}
