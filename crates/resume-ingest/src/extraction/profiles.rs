//! LinkedIn and GitHub profile links.

use super::patterns::{GITHUB_PROFILE, LINKEDIN_PROFILE};
use super::FieldExtractor;

const GITHUB_MAX_USERNAME: usize = 39;

/// LinkedIn profile extractor, canonicalized to `https://www.linkedin.com/in/<user>`.
#[derive(Debug, Clone, Default)]
pub struct LinkedinExtractor;

impl FieldExtractor for LinkedinExtractor {
    type Output = String;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        LINKEDIN_PROFILE
            .captures(text)
            .map(|caps| format!("https://www.linkedin.com/in/{}", &caps[1]))
    }
}

/// GitHub profile extractor, canonicalized to `https://github.com/<user>`.
#[derive(Debug, Clone, Default)]
pub struct GithubExtractor;

impl FieldExtractor for GithubExtractor {
    type Output = String;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        GITHUB_PROFILE
            .captures_iter(text)
            .map(|caps| caps[1].to_string())
            .find(|username| username.len() <= GITHUB_MAX_USERNAME)
            .map(|username| format!("https://github.com/{}", username))
    }
}
