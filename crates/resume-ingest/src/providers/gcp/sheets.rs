//! Google Sheets v4 result writer

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::{ensure_success, GoogleAuth};
use crate::error::{Error, Result};
use crate::providers::{sink_row, ResultWriter, SINK_HEADER};
use crate::types::ParsedResult;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4";
const SHEET_TITLE: &str = "Resume Data";

/// Link a reader can open for a Drive file id
pub fn drive_view_link(file_id: &str) -> String {
    format!("https://drive.google.com/file/d/{}/view", file_id)
}

/// Writes rows to a spreadsheet; the sink reference is the spreadsheet id
pub struct SheetsResultWriter {
    auth: Arc<GoogleAuth>,
    base_url: String,
}

impl SheetsResultWriter {
    pub fn new(auth: Arc<GoogleAuth>) -> Self {
        Self {
            auth,
            base_url: SHEETS_API.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn create_body(title: &str) -> Value {
        let header_cells: Vec<Value> = SINK_HEADER
            .iter()
            .map(|h| json!({ "userEnteredValue": { "stringValue": h } }))
            .collect();

        json!({
            "properties": { "title": title },
            "sheets": [{
                "properties": { "title": SHEET_TITLE },
                "data": [{
                    "startRow": 0,
                    "startColumn": 0,
                    "rowData": [{ "values": header_cells }]
                }]
            }]
        })
    }

    fn append_body(batch: &[ParsedResult]) -> Value {
        let values: Vec<Vec<String>> = batch
            .iter()
            .map(|r| sink_row(r, drive_view_link))
            .collect();
        json!({ "values": values })
    }
}

#[derive(Deserialize)]
struct Spreadsheet {
    #[serde(rename = "spreadsheetId")]
    spreadsheet_id: String,
}

#[async_trait]
impl ResultWriter for SheetsResultWriter {
    async fn create_sink(&self, title: &str) -> Result<String> {
        let client = self.auth.authorized_client().await?;
        let response = client
            .post(format!("{}/spreadsheets", self.base_url))
            .json(&Self::create_body(title))
            .send()
            .await?;

        let sheet: Spreadsheet = ensure_success(response, "Spreadsheet creation")
            .await?
            .json()
            .await?;
        if sheet.spreadsheet_id.is_empty() {
            return Err(Error::sink("Sheets returned an empty spreadsheet id"));
        }

        tracing::info!("Created spreadsheet {} ({})", sheet.spreadsheet_id, title);
        Ok(sheet.spreadsheet_id)
    }

    async fn append_rows(
        &self,
        sink_reference: &str,
        job_id: Uuid,
        batch: &[ParsedResult],
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let client = self.auth.authorized_client().await?;
        let url = format!(
            "{}/spreadsheets/{}/values/A:F:append",
            self.base_url, sink_reference
        );
        let response = client
            .post(&url)
            .query(&[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&Self::append_body(batch))
            .send()
            .await?;
        ensure_success(response, "Sheets append").await?;

        tracing::debug!(
            "[Job {}] Appended {} rows to spreadsheet {}",
            job_id,
            batch.len(),
            sink_reference
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "google-sheets"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CandidateFields;

    #[test]
    fn test_create_body_has_header_row() {
        let body = SheetsResultWriter::create_body("Resume Data 2024-10-01");
        assert_eq!(body["properties"]["title"], "Resume Data 2024-10-01");
        let cells = &body["sheets"][0]["data"][0]["rowData"][0]["values"];
        assert_eq!(cells[0]["userEnteredValue"]["stringValue"], "Name");
        assert_eq!(cells[5]["userEnteredValue"]["stringValue"], "GitHub");
    }

    #[test]
    fn test_append_body_uses_drive_links() {
        let fields = CandidateFields {
            name: Some("Jane Roe".into()),
            ..Default::default()
        };
        let result = ParsedResult::from_fields("jane.pdf", Some("f1".into()), fields, 0.2, false);
        let body = SheetsResultWriter::append_body(&[result]);
        assert_eq!(body["values"][0][0], "Jane Roe");
        assert_eq!(body["values"][0][1], "https://drive.google.com/file/d/f1/view");
    }

    #[test]
    fn test_spreadsheet_response() {
        let sheet: Spreadsheet =
            serde_json::from_str(r#"{"spreadsheetId": "s1", "properties": {}}"#).unwrap();
        assert_eq!(sheet.spreadsheet_id, "s1");
    }
}
