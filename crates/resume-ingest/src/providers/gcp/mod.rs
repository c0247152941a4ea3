//! Google provider implementations
//!
//! - Drive v3 as the file source
//! - Sheets v4 as the result sink
//! - Document AI as the OCR engine

mod auth;
mod document_ai;
mod drive;
mod sheets;

pub use auth::GoogleAuth;
pub use document_ai::DocumentAiOcr;
pub use drive::DriveFileSource;
pub use sheets::SheetsResultWriter;

use crate::error::{Error, Result};

/// Turn a non-success response into `Error::Http` carrying the body
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    context: &str,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::http(
        status.as_u16(),
        format!("{} failed: {}", context, body.trim()),
    ))
}
