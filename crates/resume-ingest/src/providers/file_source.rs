//! File source provider trait for enumerating and fetching resumes

use async_trait::async_trait;

use crate::error::Result;
use crate::types::FileRef;

/// Trait for folders of resume files
///
/// Implementations:
/// - `LocalFolderSource`: Directory on the local filesystem
/// - `DriveFileSource`: Google Drive folder
/// - `MemoryFileSource`: In-process map, for embedding and tests
#[async_trait]
pub trait FileSource: Send + Sync {
    /// List the supported files directly under a folder
    async fn list_files(&self, folder_reference: &str) -> Result<Vec<FileRef>>;

    /// Fetch a file's raw bytes
    async fn download(&self, file: &FileRef) -> Result<Vec<u8>>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
