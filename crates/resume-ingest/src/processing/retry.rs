//! Exponential backoff shared by every I/O call site

use std::future::Future;
use std::time::{Duration, Instant};

use crate::config::ProcessingConfig;
use crate::error::{Error, ErrorClass, Result};

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep, then try again
    Retry { delay: Duration },
    /// Report the error as final
    GiveUp,
}

/// Attempt bookkeeping for one retried operation
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    /// Attempts made so far (1-based once running)
    pub attempt: u32,
    pub last_class: Option<ErrorClass>,
    pub next_eligible_at: Option<Instant>,
    /// Every error seen, in order
    pub errors: Vec<String>,
}

/// Result of [`RetryPolicy::run`] together with its attempt history
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T>,
    pub state: RetryState,
}

/// Capped exponential backoff for transient errors
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.base_retry_delay_ms),
            Duration::from_millis(config.max_retry_delay_ms),
        )
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Upper bound on attempts for one operation
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`, capped
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Retry transient failures while `attempt <= max_retries`
    pub fn decide(&self, attempt: u32, class: ErrorClass) -> RetryDecision {
        match class {
            ErrorClass::Transient if attempt <= self.max_retries => RetryDecision::Retry {
                delay: self.delay_for_attempt(attempt),
            },
            _ => RetryDecision::GiveUp,
        }
    }

    /// Run `op` until it succeeds, fails permanently or exhausts its retries.
    ///
    /// `op` receives the 1-based attempt number. `classify` decides whether an
    /// error is worth another attempt; pass [`Error::class`] for the default.
    pub async fn run<T, F, Fut, C>(&self, label: &str, classify: C, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        C: Fn(&Error) -> ErrorClass,
    {
        let mut state = RetryState::default();
        loop {
            state.attempt += 1;
            match op(state.attempt).await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        state,
                    }
                }
                Err(e) => {
                    let class = classify(&e);
                    state.last_class = Some(class);
                    state.errors.push(e.to_string());

                    match self.decide(state.attempt, class) {
                        RetryDecision::Retry { delay } => {
                            tracing::warn!(
                                "Retry {}/{} for {} after {}ms: {}",
                                state.attempt,
                                self.max_retries,
                                label,
                                delay.as_millis(),
                                e
                            );
                            state.next_eligible_at = Some(Instant::now() + delay);
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::GiveUp => {
                            if class == ErrorClass::Transient {
                                tracing::error!(
                                    "{} failed after {} attempts: {}",
                                    label,
                                    state.attempt,
                                    e
                                );
                            }
                            state.next_eligible_at = None;
                            return RetryOutcome {
                                result: Err(e),
                                state,
                            };
                        }
                    }
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ProcessingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_millis(4))
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(64), Duration::from_secs(5));
    }

    #[test]
    fn test_decisions() {
        let policy = RetryPolicy::default();
        assert!(matches!(
            policy.decide(1, ErrorClass::Transient),
            RetryDecision::Retry { .. }
        ));
        assert!(matches!(
            policy.decide(3, ErrorClass::Transient),
            RetryDecision::Retry { .. }
        ));
        assert_eq!(policy.decide(4, ErrorClass::Transient), RetryDecision::GiveUp);
        assert_eq!(policy.decide(1, ErrorClass::Permanent), RetryDecision::GiveUp);
    }

    #[tokio::test]
    async fn test_transient_exhausts_attempts() {
        let policy = fast(3);
        let calls = AtomicU32::new(0);

        let outcome: RetryOutcome<()> = policy
            .run("download", Error::class, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::Timeout("download".into())) }
            })
            .await;

        tokio_test::assert_err!(&outcome.result);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(outcome.state.attempt, policy.max_attempts());
        assert_eq!(outcome.state.errors.len(), 4);
        assert_eq!(outcome.state.last_class, Some(ErrorClass::Transient));
    }

    #[tokio::test]
    async fn test_permanent_not_retried() {
        let policy = fast(3);
        let outcome: RetryOutcome<()> = policy
            .run("parse", Error::class, |_| async {
                Err(Error::file_parse("cv.pdf", "corrupt"))
            })
            .await;

        assert_eq!(outcome.state.attempt, 1);
        assert_eq!(outcome.state.last_class, Some(ErrorClass::Permanent));
    }

    #[tokio::test]
    async fn test_recovers_after_transient() {
        let policy = fast(3);
        let outcome = policy
            .run("list", Error::class, |attempt| async move {
                if attempt < 3 {
                    Err(Error::http(503, "unavailable"))
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(tokio_test::assert_ok!(outcome.result), 3);
        assert_eq!(outcome.state.errors.len(), 2);
    }

    #[tokio::test]
    async fn test_custom_classifier() {
        let policy = fast(2);
        let outcome: RetryOutcome<()> = policy
            .run("sink", |_| ErrorClass::Transient, |_| async {
                Err(Error::sink("quota"))
            })
            .await;
        assert_eq!(outcome.state.attempt, 3);
    }
}
