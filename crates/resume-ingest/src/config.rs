//! Configuration for the ingestion service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main ingestion configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Backend provider (local or google)
    pub backend: BackendProvider,
    /// Server configuration
    pub server: ServerConfig,
    /// Worker pool, retry and batching
    pub processing: ProcessingConfig,
    /// Text extraction and OCR fallback thresholds
    pub parser: ParserConfig,
    /// Field extraction and confidence scoring
    pub extraction: ExtractionConfig,
    /// Job store configuration
    pub storage: StorageConfig,
    /// Local filesystem backend
    pub local: LocalConfig,
    /// Google backend (required when backend = google)
    pub google: Option<GoogleConfig>,
}

impl IngestConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `INGEST_*`, `GOOGLE_ACCESS_TOKEN` and `GOOGLE_APPLICATION_CREDENTIALS` overrides
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(v) = env_parse::<usize>("INGEST_MAX_CONCURRENCY")? {
            self.processing.max_concurrency = v;
        }
        if let Some(v) = env_parse::<usize>("INGEST_BATCH_SIZE")? {
            self.processing.batch_size = v;
        }
        if let Some(v) = env_parse::<u32>("INGEST_MAX_RETRIES")? {
            self.processing.max_retries = v;
        }
        if let Some(v) = env_parse::<u64>("INGEST_RETRY_DELAY_MS")? {
            self.processing.base_retry_delay_ms = v;
        }
        if let Ok(path) = std::env::var("INGEST_DATABASE_PATH") {
            self.storage.database_path = PathBuf::from(path);
        }
        if let Ok(token) = std::env::var("GOOGLE_ACCESS_TOKEN") {
            self.google.get_or_insert_with(GoogleConfig::default).access_token = token;
        }
        if let Ok(path) = std::env::var("GOOGLE_APPLICATION_CREDENTIALS") {
            self.google.get_or_insert_with(GoogleConfig::default).service_account_key =
                Some(PathBuf::from(path));
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.processing.max_concurrency == 0 {
            return Err(Error::Config("max_concurrency must be at least 1".to_string()));
        }
        if self.processing.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.parser.min_printable_ratio) {
            return Err(Error::Config(format!(
                "min_printable_ratio must be within [0, 1], got {}",
                self.parser.min_printable_ratio
            )));
        }
        self.extraction.weights.validate()?;
        if self.storage.results_ttl_secs > MAX_RESULTS_TTL_SECS {
            return Err(Error::Config(format!(
                "results_ttl_secs must be at most {}, got {}",
                MAX_RESULTS_TTL_SECS, self.storage.results_ttl_secs
            )));
        }
        if self.backend == BackendProvider::Google && self.google.is_none() {
            return Err(Error::Config(
                "Google backend selected but [google] config is missing".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("Invalid value for {}: {}", key, raw))),
        Err(_) => Ok(None),
    }
}

/// Backend provider selection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BackendProvider {
    /// Local folders in, CSV files out, tesseract OCR
    #[default]
    Local,
    /// Drive in, Sheets out, Document AI OCR
    Google,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes for single-file parsing (default: 20MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            max_upload_size: 20 * 1024 * 1024,
        }
    }
}

/// Processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Files processed at once per job
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Results buffered before a sink flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Retries after the first attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent one
    #[serde(default = "default_base_retry_delay_ms")]
    pub base_retry_delay_ms: u64,
    /// Upper bound on a single retry delay
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    /// Wall-clock bound on one download + parse + extract attempt
    #[serde(default = "default_file_timeout_secs")]
    pub file_timeout_secs: u64,
}

fn default_max_concurrency() -> usize { 10 }
fn default_batch_size() -> usize { 100 }
fn default_max_retries() -> u32 { 3 }
fn default_base_retry_delay_ms() -> u64 { 1000 }
fn default_max_retry_delay_ms() -> u64 { 30_000 }
fn default_file_timeout_secs() -> u64 { 120 }

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            base_retry_delay_ms: default_base_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            file_timeout_secs: default_file_timeout_secs(),
        }
    }
}

impl ProcessingConfig {
    pub fn file_timeout(&self) -> Duration {
        Duration::from_secs(self.file_timeout_secs)
    }
}

/// Document parser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Non-whitespace characters required before OCR is skipped
    #[serde(default = "default_min_text_length")]
    pub min_text_length: usize,
    /// Share of printable characters required before OCR is skipped
    #[serde(default = "default_min_printable_ratio")]
    pub min_printable_ratio: f64,
    /// Guard for pdf-extract, which can spin on malformed fonts
    #[serde(default = "default_pdf_extract_timeout_secs")]
    pub pdf_extract_timeout_secs: u64,
    /// Append link annotation URIs to the extracted text
    #[serde(default = "default_true")]
    pub append_hyperlinks: bool,
    /// Tesseract language pack
    #[serde(default = "default_tesseract_language")]
    pub tesseract_language: String,
    /// Render resolution for pdftoppm
    #[serde(default = "default_render_dpi")]
    pub render_dpi: u32,
}

fn default_min_text_length() -> usize { 50 }
fn default_min_printable_ratio() -> f64 { 0.85 }
fn default_pdf_extract_timeout_secs() -> u64 { 60 }
fn default_true() -> bool { true }
fn default_tesseract_language() -> String { "eng".to_string() }
fn default_render_dpi() -> u32 { 150 }

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            min_text_length: default_min_text_length(),
            min_printable_ratio: default_min_printable_ratio(),
            pdf_extract_timeout_secs: default_pdf_extract_timeout_secs(),
            append_hyperlinks: true,
            tesseract_language: default_tesseract_language(),
            render_dpi: default_render_dpi(),
        }
    }
}

/// Field extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Country code given to bare 10-digit numbers
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
    /// Confidence contribution of each field
    #[serde(default)]
    pub weights: ConfidenceWeights,
}

fn default_country_code() -> String { "91".to_string() }

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            default_country_code: default_country_code(),
            weights: ConfidenceWeights::default(),
        }
    }
}

/// Per-field confidence weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    pub email: f64,
    pub phone: f64,
    pub name: f64,
    pub linkedin: f64,
    pub github: f64,
    /// Bonus when text came straight from the document, not OCR
    pub direct_text: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            email: 0.4,
            phone: 0.25,
            name: 0.15,
            linkedin: 0.1,
            github: 0.05,
            direct_text: 0.05,
        }
    }
}

impl ConfidenceWeights {
    /// Negative weights would let an extra field lower the score
    pub fn validate(&self) -> Result<()> {
        let weights = [
            ("email", self.email),
            ("phone", self.phone),
            ("name", self.name),
            ("linkedin", self.linkedin),
            ("github", self.github),
            ("direct_text", self.direct_text),
        ];
        for (field, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(Error::Config(format!(
                    "Confidence weight '{}' must be a non-negative number, got {}",
                    field, weight
                )));
            }
        }
        Ok(())
    }
}

/// Longest results TTL accepted from configuration or a job request (ten years)
pub const MAX_RESULTS_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Job store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// How long a finished job and its results stay readable
    #[serde(default = "default_results_ttl_secs")]
    pub results_ttl_secs: u64,
    /// Janitor interval for purging expired jobs
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("resume-ingest")
        .join("jobs.db")
}
fn default_results_ttl_secs() -> u64 { 3600 }
fn default_purge_interval_secs() -> u64 { 300 }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            results_ttl_secs: default_results_ttl_secs(),
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

impl StorageConfig {
    pub fn results_ttl(&self) -> Duration {
        Duration::from_secs(self.results_ttl_secs)
    }
}

/// Local backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Folder references resolve to directories under this root
    #[serde(default = "default_local_root")]
    pub root_dir: PathBuf,
    /// Where CSV sinks are created
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_local_root() -> PathBuf { PathBuf::from(".") }
fn default_output_dir() -> PathBuf { PathBuf::from("./output") }

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            root_dir: default_local_root(),
            output_dir: default_output_dir(),
        }
    }
}

/// Google backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// OAuth bearer token with Drive, Sheets and Document AI scopes.
    /// Used as-is; prefer `service_account_key` for long-running servers
    #[serde(default)]
    pub access_token: String,
    /// Service account JSON key; tokens are minted and refreshed from it
    #[serde(default)]
    pub service_account_key: Option<PathBuf>,
    /// Document AI processor name
    /// e.g., "projects/my-project/locations/us/processors/abc123"
    /// If not set, tesseract is used for OCR
    #[serde(default)]
    pub document_ai_processor: Option<String>,
    /// Title prefix for spreadsheets created on demand
    #[serde(default = "default_spreadsheet_title_prefix")]
    pub spreadsheet_title_prefix: String,
}

fn default_spreadsheet_title_prefix() -> String {
    "Resume Data".to_string()
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            service_account_key: None,
            document_ai_processor: None,
            spreadsheet_title_prefix: default_spreadsheet_title_prefix(),
        }
    }
}
