//! Common regex patterns for resume field extraction.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Email addresses
    pub static ref EMAIL_PATTERN: Regex = Regex::new(
        r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"
    ).unwrap();

    // Phone numbers
    pub static ref INTERNATIONAL_PHONE: Regex = Regex::new(
        r"\+\d[\d \t\-().]{5,24}\d"
    ).unwrap();

    pub static ref PHONE_SEPARATORS: Regex = Regex::new(
        r"[\s\-().]"
    ).unwrap();

    pub static ref DIGIT_RUN: Regex = Regex::new(
        r"\d{7,}"
    ).unwrap();

    // Profile links
    pub static ref LINKEDIN_PROFILE: Regex = Regex::new(
        r"(?i)linkedin\.com/(?:in/|profile/view\?id=)([A-Za-z0-9\-]+)"
    ).unwrap();

    // GitHub usernames: alphanumeric with single inner hyphens
    pub static ref GITHUB_PROFILE: Regex = Regex::new(
        r"(?i)github\.com/([A-Za-z0-9](?:-?[A-Za-z0-9])*)"
    ).unwrap();

    // Lines that usually sit just below the candidate's name
    pub static ref CONTACT_KEYWORD: Regex = Regex::new(
        r"(?i)email|phone|contact|mobile|tel"
    ).unwrap();

    pub static ref LEADING_PHONE: Regex = Regex::new(
        r"^\+?\d"
    ).unwrap();
}
