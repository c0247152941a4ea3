//! Result writer trait for tabular sinks

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::ParsedResult;

/// Column headers shared by every tabular sink
pub const SINK_HEADER: [&str; 6] = [
    "Name",
    "Resume Link",
    "Phone Number",
    "Email ID",
    "LinkedIn",
    "GitHub",
];

/// Trait for destinations of extracted rows
///
/// Implementations:
/// - `CsvResultWriter`: One CSV file per sink
/// - `SheetsResultWriter`: Google Sheets spreadsheet
/// - `MemoryResultWriter`: In-process rows, upserted by key
#[async_trait]
pub trait ResultWriter: Send + Sync {
    /// Create a new sink and return its reference
    async fn create_sink(&self, title: &str) -> Result<String>;

    /// Append a batch of rows to an existing sink
    async fn append_rows(
        &self,
        sink_reference: &str,
        job_id: Uuid,
        batch: &[ParsedResult],
    ) -> Result<()>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

/// Cells of one sink row, in [`SINK_HEADER`] order.
///
/// `resume_link` turns a file id into something a reader can open.
pub fn sink_row(result: &ParsedResult, resume_link: impl Fn(&str) -> String) -> Vec<String> {
    let link = result
        .file_id
        .as_deref()
        .map(|id| resume_link(id))
        .unwrap_or_default();

    vec![
        result.name.clone().unwrap_or_default(),
        link,
        result.phone.clone().unwrap_or_default(),
        result.email.clone().unwrap_or_default(),
        result.linkedin.clone().unwrap_or_default(),
        result.github.clone().unwrap_or_default(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CandidateFields;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sink_row_order() {
        let fields = CandidateFields {
            name: Some("Jane Roe".into()),
            email: Some("jane@example.com".into()),
            phone: Some("+919876543210".into()),
            linkedin: None,
            github: Some("https://github.com/janeroe".into()),
        };
        let result = ParsedResult::from_fields("jane.pdf", Some("abc".into()), fields, 0.9, false);

        let row = sink_row(&result, |id| format!("https://drive.google.com/file/d/{}/view", id));
        assert_eq!(
            row,
            vec![
                "Jane Roe".to_string(),
                "https://drive.google.com/file/d/abc/view".to_string(),
                "+919876543210".to_string(),
                "jane@example.com".to_string(),
                String::new(),
                "https://github.com/janeroe".to_string(),
            ]
        );
        assert_eq!(row.len(), SINK_HEADER.len());
    }

    #[test]
    fn test_sink_row_without_file_id() {
        let file = crate::types::FileRef::new("", "orphan.pdf");
        let result = ParsedResult::failed(&file, 1, vec!["Missing file ID".into()]);
        let row = sink_row(&result, |id| id.to_string());
        assert_eq!(row[1], "");
    }
}
