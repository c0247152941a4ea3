//! Google Document AI as an OCR engine
//!
//! Scanned resumes go through a Document AI OCR processor; the full text of
//! the response is returned.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ensure_success, GoogleAuth};
use crate::error::{Error, Result};
use crate::providers::OcrEngine;
use crate::types::DocumentKind;

/// Document AI processor client
pub struct DocumentAiOcr {
    auth: Arc<GoogleAuth>,
    /// Full processor resource name
    /// e.g., "projects/my-project/locations/us/processors/abc123"
    processor_name: String,
}

impl DocumentAiOcr {
    pub fn new(auth: Arc<GoogleAuth>, processor_name: impl Into<String>) -> Self {
        Self {
            auth,
            processor_name: processor_name.into(),
        }
    }

    /// Get the processor name
    pub fn processor_name(&self) -> &str {
        &self.processor_name
    }

    /// `https://LOCATION-documentai.googleapis.com/v1/PROCESSOR_NAME:process`
    fn endpoint(&self) -> String {
        // projects/PROJECT/locations/LOCATION/processors/PROCESSOR_ID
        let location = self.processor_name.split('/').nth(3).unwrap_or("us");

        format!(
            "https://{}-documentai.googleapis.com/v1/{}:process",
            location, self.processor_name
        )
    }
}

#[async_trait]
impl OcrEngine for DocumentAiOcr {
    async fn ocr(&self, data: &[u8], kind: DocumentKind) -> Result<String> {
        let client = self.auth.authorized_client().await?;

        let request = ProcessRequest {
            raw_document: RawDocument {
                content: BASE64.encode(data),
                mime_type: kind.mime_type().to_string(),
            },
            skip_human_review: true,
        };

        tracing::debug!(
            "Sending {} bytes to Document AI processor {}",
            data.len(),
            self.processor_name
        );

        let response = client.post(self.endpoint()).json(&request).send().await?;
        let process_response: ProcessResponse = ensure_success(response, "Document AI processing")
            .await?
            .json()
            .await?;

        let text = process_response.document.text.unwrap_or_default();
        if text.trim().is_empty() {
            return Err(Error::ocr(
                "Document AI returned empty text - document may be empty or unreadable",
            ));
        }

        let pages = process_response.document.pages.map(|p| p.len()).unwrap_or(1);
        tracing::info!("Document AI extracted {} chars from {} pages", text.len(), pages);
        Ok(text)
    }

    fn name(&self) -> &str {
        "document-ai"
    }
}

// ============================================================================
// API Request/Response types
// ============================================================================

#[derive(Serialize)]
struct ProcessRequest {
    #[serde(rename = "rawDocument")]
    raw_document: RawDocument,
    #[serde(rename = "skipHumanReview")]
    skip_human_review: bool,
}

#[derive(Serialize)]
struct RawDocument {
    content: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

#[derive(Deserialize)]
struct ProcessResponse {
    document: Document,
}

#[derive(Deserialize)]
struct Document {
    text: Option<String>,
    pages: Option<Vec<serde_json::Value>>,
}
