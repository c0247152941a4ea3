//! Local provider implementations using the filesystem
//!
//! Resumes come from a directory tree and rows go to CSV files.

use async_trait::async_trait;
use std::fs::OpenOptions;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use crate::config::LocalConfig;
use crate::error::{Error, Result};
use crate::types::{DocumentKind, FileRef, ParsedResult};

use super::file_source::FileSource;
use super::result_writer::{sink_row, ResultWriter, SINK_HEADER};

/// Reject absolute paths and `..` so references stay under their root
fn relative_path(reference: &str) -> Result<PathBuf> {
    let path = Path::new(reference.trim());
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(Error::InvalidInput(format!(
                    "Path must stay inside its root directory: {}",
                    reference
                )))
            }
        }
    }
    Ok(path.to_path_buf())
}

/// Resume folders on the local filesystem.
///
/// Folder references and file ids are paths relative to `root`.
pub struct LocalFolderSource {
    root: PathBuf,
}

impl LocalFolderSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &LocalConfig) -> Self {
        Self::new(config.root_dir.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl FileSource for LocalFolderSource {
    async fn list_files(&self, folder_reference: &str) -> Result<Vec<FileRef>> {
        let folder = relative_path(folder_reference)?;
        let dir = self.root.join(&folder);

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            let Some(kind) = DocumentKind::from_filename(&name) else {
                tracing::debug!("Skipping unsupported file: {}", name);
                continue;
            };

            let file_id = folder
                .join(&name)
                .components()
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part.to_string_lossy().to_string()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("/");

            files.push(
                FileRef::new(file_id, name)
                    .with_mime_type(kind.mime_type())
                    .with_size(metadata.len()),
            );
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn download(&self, file: &FileRef) -> Result<Vec<u8>> {
        let path = self.root.join(relative_path(&file.file_id)?);
        Ok(tokio::fs::read(&path).await?)
    }

    fn name(&self) -> &str {
        "local-filesystem"
    }
}

/// One CSV file per sink under `output_dir`.
///
/// The sink reference is the CSV file name relative to `output_dir`; other
/// paths are refused. Resume links point at the source file under `link_root`.
pub struct CsvResultWriter {
    output_dir: PathBuf,
    link_root: Option<PathBuf>,
}

impl CsvResultWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            link_root: None,
        }
    }

    pub fn from_config(config: &LocalConfig) -> Self {
        Self::new(config.output_dir.clone()).with_link_root(config.root_dir.clone())
    }

    pub fn with_link_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.link_root = Some(root.into());
        self
    }

    /// Resolve a sink reference to an existing CSV file under `output_dir`
    fn sink_path(&self, sink_reference: &str) -> Result<PathBuf> {
        let relative = relative_path(sink_reference)?;
        if relative.extension().and_then(|e| e.to_str()) != Some("csv") {
            return Err(Error::InvalidInput(format!(
                "CSV sink reference must name a .csv file: {}",
                sink_reference
            )));
        }
        let path = self.output_dir.join(relative);
        if !path.is_file() {
            return Err(Error::sink(format!("CSV sink not found: {}", sink_reference)));
        }
        Ok(path)
    }

    fn resume_link(&self, file_id: &str) -> String {
        match &self.link_root {
            Some(root) => root.join(file_id).to_string_lossy().to_string(),
            None => file_id.to_string(),
        }
    }
}

/// Keep titles usable as file names
fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        "results".to_string()
    } else {
        trimmed.to_string()
    }
}

fn csv_error(e: csv::Error) -> Error {
    Error::sink(format!("CSV write failed: {}", e))
}

#[async_trait]
impl ResultWriter for CsvResultWriter {
    async fn create_sink(&self, title: &str) -> Result<String> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let short_id = Uuid::new_v4().simple().to_string();
        let file_name = format!("{}-{}.csv", sanitize_title(title), &short_id[..8]);
        let path = self.output_dir.join(&file_name);

        let header_path = path.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut writer = csv::Writer::from_path(&header_path).map_err(csv_error)?;
            writer.write_record(SINK_HEADER).map_err(csv_error)?;
            writer.flush()?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??;

        tracing::info!("Created CSV sink {}", path.display());
        Ok(file_name)
    }

    async fn append_rows(
        &self,
        sink_reference: &str,
        job_id: Uuid,
        batch: &[ParsedResult],
    ) -> Result<()> {
        let path = self.sink_path(sink_reference)?;

        let rows: Vec<Vec<String>> = batch
            .iter()
            .map(|r| sink_row(r, |id| self.resume_link(id)))
            .collect();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let file = OpenOptions::new().append(true).open(&path)?;
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(file);
            for row in &rows {
                writer.write_record(row).map_err(csv_error)?;
            }
            writer.flush()?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??;

        tracing::debug!("[Job {}] Appended {} rows to {}", job_id, batch.len(), sink_reference);
        Ok(())
    }

    fn name(&self) -> &str {
        "csv"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CandidateFields;

    #[test]
    fn test_relative_path_guard() {
        assert!(relative_path("resumes/2024").is_ok());
        assert!(relative_path("./resumes").is_ok());
        assert!(relative_path("../etc").is_err());
        assert!(relative_path("/etc/passwd").is_err());
        assert!(relative_path("a/../../b").is_err());
    }

    #[tokio::test]
    async fn test_lists_supported_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("batch");
        std::fs::create_dir_all(folder.join("nested")).unwrap();
        std::fs::write(folder.join("zed.pdf"), b"%PDF").unwrap();
        std::fs::write(folder.join("amy.docx"), b"PK").unwrap();
        std::fs::write(folder.join("notes.txt"), b"skip").unwrap();

        let source = LocalFolderSource::new(dir.path());
        let files = source.list_files("batch").await.unwrap();

        let ids: Vec<_> = files.iter().map(|f| f.file_id.as_str()).collect();
        assert_eq!(ids, vec!["batch/amy.docx", "batch/zed.pdf"]);
        assert_eq!(files[1].kind(), Some(DocumentKind::Pdf));
        assert_eq!(files[1].size, Some(4));

        let bytes = source.download(&files[1]).await.unwrap();
        assert_eq!(bytes, b"%PDF");
    }

    #[tokio::test]
    async fn test_missing_folder_is_permanent_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalFolderSource::new(dir.path());
        let err = source.list_files("nope").await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_csv_sink_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CsvResultWriter::new(dir.path()).with_link_root("/data");

        let sink = writer.create_sink("Resume Data 2024/10").await.unwrap();
        assert!(sink.starts_with("Resume_Data_2024_10-"));
        assert!(sink.ends_with(".csv"));

        let fields = CandidateFields {
            name: Some("Jane Roe".into()),
            email: Some("jane@example.com".into()),
            ..Default::default()
        };
        let result =
            ParsedResult::from_fields("jane.pdf", Some("batch/jane.pdf".into()), fields, 0.6, false);
        writer.append_rows(&sink, Uuid::new_v4(), &[result]).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join(&sink)).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "Name,Resume Link,Phone Number,Email ID,LinkedIn,GitHub");
        assert_eq!(lines[1], "Jane Roe,/data/batch/jane.pdf,,jane@example.com,,");
        assert_eq!(lines.len(), 2);
    }

    #[tokio::test]
    async fn test_append_to_unknown_sink() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CsvResultWriter::new(dir.path());
        let err = writer
            .append_rows("missing.csv", Uuid::new_v4(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Sink(_)));
    }

    #[tokio::test]
    async fn test_append_refuses_paths_outside_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output");
        std::fs::create_dir_all(&output).unwrap();
        let victim = dir.path().join("victim.csv");
        std::fs::write(&victim, "keep\n").unwrap();
        let notes = output.join("notes.txt");
        std::fs::write(&notes, "keep\n").unwrap();

        let writer = CsvResultWriter::new(&output);
        let row = ParsedResult::from_fields(
            "jane.pdf",
            Some("jane.pdf".into()),
            CandidateFields::default(),
            0.0,
            false,
        );
        let absolute = victim.to_string_lossy().to_string();
        for reference in [absolute.as_str(), "../victim.csv", "notes.txt"] {
            let err = writer
                .append_rows(reference, Uuid::new_v4(), std::slice::from_ref(&row))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{}", reference);
        }

        assert_eq!(std::fs::read_to_string(&victim).unwrap(), "keep\n");
        assert_eq!(std::fs::read_to_string(&notes).unwrap(), "keep\n");
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("Resume Data 2024/10"), "Resume_Data_2024_10");
        assert_eq!(sanitize_title("///"), "results");
    }
}
