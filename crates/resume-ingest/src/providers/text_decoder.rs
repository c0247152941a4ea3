//! Text decoder trait for direct (non-OCR) extraction

use async_trait::async_trait;

use crate::error::Result;
use crate::types::DocumentKind;

/// Trait for pulling embedded text out of a document.
///
/// Decoders return whatever text they find, possibly little or none.
/// Deciding whether it is good enough is left to the parser.
#[async_trait]
pub trait TextDecoder: Send + Sync {
    /// Decode text from raw bytes of the given kind
    async fn decode_text(&self, data: &[u8], kind: DocumentKind) -> Result<String>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
