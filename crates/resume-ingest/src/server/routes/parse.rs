//! Single-file parsing outside of any job

use axum::{
    extract::{Multipart, State},
    Json,
};

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::ParsedResult;

/// POST /api/parse - Parse one uploaded PDF or DOCX
///
/// The first multipart field carrying a filename is parsed; other fields are ignored.
pub async fn parse_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ParsedResult>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidInput(format!("Failed to read multipart field: {}", e)))?
    {
        let Some(filename) = field.file_name().map(|s| s.to_string()) else {
            continue;
        };

        let data = field
            .bytes()
            .await
            .map_err(|e| Error::InvalidInput(format!("Failed to read {}: {}", filename, e)))?;

        tracing::info!("Parsing upload {} ({} bytes)", filename, data.len());
        let result = state.manager().parse_document(&filename, &data).await?;
        return Ok(Json(result));
    }

    Err(Error::InvalidInput("No file provided".to_string()))
}
