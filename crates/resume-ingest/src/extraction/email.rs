//! Email address extraction.

use super::patterns::EMAIL_PATTERN;
use super::FieldExtractor;

/// Email field extractor.
#[derive(Debug, Clone, Default)]
pub struct EmailExtractor;

impl EmailExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl FieldExtractor for EmailExtractor {
    type Output = String;

    /// First address in the text, lowercased.
    fn extract(&self, text: &str) -> Option<Self::Output> {
        EMAIL_PATTERN
            .find(text)
            .map(|m| m.as_str().trim_end_matches('.').to_lowercase())
    }
}
