//! Rule-based candidate field extraction.

pub mod confidence;
pub mod email;
pub mod name;
pub mod patterns;
pub mod phone;
pub mod profiles;

pub use confidence::score_confidence;
pub use email::EmailExtractor;
pub use name::NameExtractor;
pub use phone::PhoneExtractor;
pub use profiles::{GithubExtractor, LinkedinExtractor};

use crate::config::{ConfidenceWeights, ExtractionConfig};
use crate::types::CandidateFields;

/// Trait for field extractors.
pub trait FieldExtractor {
    /// The type of value this extractor produces.
    type Output;

    /// First occurrence of the field in the text.
    fn extract(&self, text: &str) -> Option<Self::Output>;
}

/// Fields plus their confidence score
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub fields: CandidateFields,
    pub confidence: f64,
}

/// Runs every field extractor over a document's text.
#[derive(Debug, Clone)]
pub struct CandidateExtractor {
    email: EmailExtractor,
    phone: PhoneExtractor,
    name: NameExtractor,
    linkedin: LinkedinExtractor,
    github: GithubExtractor,
    weights: ConfidenceWeights,
}

impl CandidateExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            email: EmailExtractor::new(),
            phone: PhoneExtractor::new().with_country_code(config.default_country_code.clone()),
            name: NameExtractor,
            linkedin: LinkedinExtractor,
            github: GithubExtractor,
            weights: config.weights,
        }
    }

    /// Pure function of the text and the OCR flag
    pub fn extract(&self, text: &str, ocr_used: bool) -> Extraction {
        let fields = CandidateFields {
            name: self.name.extract(text),
            email: self.email.extract(text),
            phone: self.phone.extract(text),
            linkedin: self.linkedin.extract(text),
            github: self.github.extract(text),
        };
        let confidence = score_confidence(&fields, ocr_used, &self.weights);
        Extraction { fields, confidence }
    }
}

impl Default for CandidateExtractor {
    fn default() -> Self {
        Self::new(&ExtractionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RESUME: &str = "John Michael Doe\n\
        Senior Backend Engineer\n\
        Email: John.Doe@Example.com | Phone: (987) 654-3210\n\
        linkedin.com/in/johndoe  github.com/johndoe\n\
        \n\
        Experience\n\
        Acme Corp 2019 - 2023\n";

    #[test]
    fn test_full_resume() {
        let extraction = CandidateExtractor::default().extract(RESUME, false);
        assert_eq!(
            extraction.fields,
            CandidateFields {
                name: Some("John Michael Doe".into()),
                email: Some("john.doe@example.com".into()),
                phone: Some("+919876543210".into()),
                linkedin: Some("https://www.linkedin.com/in/johndoe".into()),
                github: Some("https://github.com/johndoe".into()),
            }
        );
        assert!((extraction.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_deterministic() {
        let extractor = CandidateExtractor::default();
        assert_eq!(extractor.extract(RESUME, true), extractor.extract(RESUME, true));
    }

    #[test]
    fn test_empty_text() {
        let extraction = CandidateExtractor::default().extract("", true);
        assert_eq!(extraction.fields, CandidateFields::default());
        assert_eq!(extraction.confidence, 0.0);
    }
}
