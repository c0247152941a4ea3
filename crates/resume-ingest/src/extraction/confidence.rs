//! Confidence scoring over extracted fields.

use crate::config::ConfidenceWeights;
use crate::types::CandidateFields;

/// Weighted sum over present fields plus the direct-text bonus, capped to [0, 1].
///
/// With non-negative weights (enforced by config validation) the score never
/// drops when a field is added.
pub fn score_confidence(
    fields: &CandidateFields,
    ocr_used: bool,
    weights: &ConfidenceWeights,
) -> f64 {
    let present = |field: &Option<String>, weight: f64| {
        if field.is_some() {
            weight.max(0.0)
        } else {
            0.0
        }
    };

    let mut score = present(&fields.email, weights.email)
        + present(&fields.phone, weights.phone)
        + present(&fields.name, weights.name)
        + present(&fields.linkedin, weights.linkedin)
        + present(&fields.github, weights.github);
    if !ocr_used {
        score += weights.direct_text.max(0.0);
    }

    score.clamp(0.0, 1.0)
}
