//! Heuristic candidate-name detection.

use super::patterns::{CONTACT_KEYWORD, LEADING_PHONE};
use super::FieldExtractor;

const HEAD_LINES: usize = 30;
const CONTACT_SCAN_LINES: usize = 50;
const MAX_NAME_LEN: usize = 50;

/// Lines that look like names but are resume section headings.
const SECTION_HEADINGS: &[&str] = &[
    "resume",
    "curriculum vitae",
    "professional summary",
    "career summary",
    "summary",
    "career objective",
    "objective",
    "work experience",
    "professional experience",
    "experience",
    "employment history",
    "education",
    "academic qualifications",
    "skills",
    "technical skills",
    "key skills",
    "core competencies",
    "projects",
    "academic projects",
    "certifications",
    "achievements",
    "awards",
    "personal details",
    "personal information",
    "contact information",
    "contact details",
    "languages known",
    "declaration",
    "references",
    "hobbies",
    "interests",
];

/// Name field extractor.
#[derive(Debug, Clone, Default)]
pub struct NameExtractor;

impl NameExtractor {
    /// First 30 lines, then the line above each contact keyword in the first 50.
    fn candidate_lines<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let lines: Vec<&str> = text.lines().collect();
        let mut candidates: Vec<&str> = lines.iter().take(HEAD_LINES).copied().collect();
        for (i, line) in lines.iter().enumerate().take(CONTACT_SCAN_LINES).skip(1) {
            if CONTACT_KEYWORD.is_match(line) {
                candidates.push(lines[i - 1]);
            }
        }
        candidates
    }
}

impl FieldExtractor for NameExtractor {
    type Output = String;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.candidate_lines(text)
            .into_iter()
            .map(str::trim)
            .find(|line| looks_like_name(line))
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}

fn looks_like_name(line: &str) -> bool {
    if line.is_empty() || line.len() > MAX_NAME_LEN {
        return false;
    }
    if line.contains('@') || LEADING_PHONE.is_match(line) {
        return false;
    }
    if line.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    let allowed_symbol = |c: char| matches!(c, '.' | '-' | '\'');
    if line
        .chars()
        .any(|c| !c.is_alphabetic() && !c.is_whitespace() && !allowed_symbol(c))
    {
        return false;
    }
    if is_section_heading(line) {
        return false;
    }

    let words: Vec<&str> = line.split_whitespace().collect();
    (2..=4).contains(&words.len())
        && words
            .iter()
            .all(|w| w.chars().next().map(char::is_uppercase).unwrap_or(false))
}

fn is_section_heading(line: &str) -> bool {
    let normalized = line
        .trim_end_matches(|c: char| c == ':' || c == '.' || c == '-')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    SECTION_HEADINGS.contains(&normalized.as_str())
}
