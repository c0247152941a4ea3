//! Google Drive v3 folder source

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::{ensure_success, GoogleAuth};
use crate::error::{Error, Result};
use crate::providers::FileSource;
use crate::types::document::{DOCX_MIME, PDF_MIME};
use crate::types::FileRef;

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
const PAGE_SIZE: &str = "1000";

/// Lists and downloads resumes from a Drive folder.
///
/// Folder references are Drive folder ids; file ids are Drive file ids.
pub struct DriveFileSource {
    auth: Arc<GoogleAuth>,
    base_url: String,
}

impl DriveFileSource {
    pub fn new(auth: Arc<GoogleAuth>) -> Self {
        Self {
            auth,
            base_url: DRIVE_API.to_string(),
        }
    }

    /// Point at a different API root (emulators, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Drive search query for supported files directly inside a folder
    fn folder_query(folder_id: &str) -> String {
        let escaped = folder_id.trim().replace('\\', "\\\\").replace('\'', "\\'");
        format!(
            "'{}' in parents and trashed = false and (mimeType = '{}' or mimeType = '{}')",
            escaped, PDF_MIME, DOCX_MIME
        )
    }
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
    name: String,
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
    /// Drive encodes int64 as a string
    size: Option<String>,
}

impl From<DriveFile> for FileRef {
    fn from(file: DriveFile) -> Self {
        let mut file_ref = FileRef::new(file.id, file.name);
        if let Some(mime) = file.mime_type {
            file_ref = file_ref.with_mime_type(mime);
        }
        if let Some(size) = file.size.and_then(|s| s.parse().ok()) {
            file_ref = file_ref.with_size(size);
        }
        file_ref
    }
}

#[async_trait]
impl FileSource for DriveFileSource {
    async fn list_files(&self, folder_reference: &str) -> Result<Vec<FileRef>> {
        if folder_reference.trim().is_empty() {
            return Err(Error::InvalidInput("Drive folder id is empty".to_string()));
        }

        let client = self.auth.authorized_client().await?;
        let query = Self::folder_query(folder_reference);
        let url = format!("{}/files", self.base_url);

        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut params = vec![
                ("q", query.clone()),
                ("fields", "nextPageToken, files(id, name, mimeType, size)".to_string()),
                ("pageSize", PAGE_SIZE.to_string()),
                ("supportsAllDrives", "true".to_string()),
                ("includeItemsFromAllDrives", "true".to_string()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let response = client.get(&url).query(&params).send().await?;
            let page: FileList = ensure_success(response, "Drive listing").await?.json().await?;

            files.extend(page.files.into_iter().map(FileRef::from));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::info!("Drive folder {} lists {} resumes", folder_reference, files.len());
        Ok(files)
    }

    async fn download(&self, file: &FileRef) -> Result<Vec<u8>> {
        let client = self.auth.authorized_client().await?;
        let url = format!("{}/files/{}", self.base_url, file.file_id);

        let response = client
            .get(&url)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await?;
        let bytes = ensure_success(response, "Drive download").await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    fn name(&self) -> &str {
        "google-drive"
    }
}
