//! Phone number extraction and E.164 normalization.
//!
//! Candidates are gathered one line at a time and kept only when
//! `phonenumber` accepts them as a valid number for their country code.

use phonenumber::Mode;

use super::patterns::{DIGIT_RUN, INTERNATIONAL_PHONE, PHONE_SEPARATORS};
use super::FieldExtractor;

/// E.164 allows at most 15 digits; 8 keeps local extensions out.
const MIN_E164_DIGITS: usize = 8;
const MAX_E164_DIGITS: usize = 15;

/// Phone field extractor.
#[derive(Debug, Clone)]
pub struct PhoneExtractor {
    default_country_code: String,
}

impl PhoneExtractor {
    /// Create a new phone extractor with the `91` default country code.
    pub fn new() -> Self {
        Self {
            default_country_code: "91".to_string(),
        }
    }

    /// Country code prefixed to bare 10-digit numbers.
    pub fn with_country_code(mut self, code: impl Into<String>) -> Self {
        let code: String = code.into().chars().filter(|c| c.is_ascii_digit()).collect();
        if !code.is_empty() {
            self.default_country_code = code;
        }
        self
    }

    fn international(&self, line: &str) -> Option<String> {
        INTERNATIONAL_PHONE
            .find_iter(line)
            .find_map(|m| longest_valid_prefix(m.as_str()))
    }

    fn local(&self, line: &str) -> Option<String> {
        let cleaned = PHONE_SEPARATORS.replace_all(line, "");
        DIGIT_RUN.find_iter(&cleaned).find_map(|m| {
            let digits = m.as_str();
            match digits.len() {
                // Trunk-prefixed local numbers carry no country information
                10 if digits.starts_with('0') => None,
                10 => to_e164(&format!("{}{}", self.default_country_code, digits)),
                n if n > 10 => to_e164(digits),
                _ => None,
            }
        })
    }
}

impl Default for PhoneExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for PhoneExtractor {
    type Output = String;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        text.lines()
            .find_map(|line| self.international(line))
            .or_else(|| text.lines().find_map(|line| self.local(line)))
    }
}

/// Grow the number one separator-delimited group at a time and keep the
/// longest prefix that is still a valid number. Stops trailing years or
/// postcodes from being glued onto the number.
fn longest_valid_prefix(raw: &str) -> Option<String> {
    let mut digits = String::new();
    let mut best = None;
    for group in raw.split(|c: char| c.is_whitespace() || c == '-' || c == '.') {
        digits.extend(group.chars().filter(|c| c.is_ascii_digit()));
        if digits.len() > MAX_E164_DIGITS {
            break;
        }
        if let Some(number) = to_e164(&digits) {
            best = Some(number);
        }
    }
    best
}

/// `+<digits>` when the digits form a valid number for their country code
fn to_e164(digits: &str) -> Option<String> {
    if !(MIN_E164_DIGITS..=MAX_E164_DIGITS).contains(&digits.len()) || digits.starts_with('0') {
        return None;
    }
    let number = phonenumber::parse(None, format!("+{}", digits)).ok()?;
    phonenumber::is_valid(&number).then(|| number.format().mode(Mode::E164).to_string())
}
