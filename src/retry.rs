//! Retry policy: classifies failures into retry/give-up and drives
//! exponential backoff with a cap.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

const RETRY_KEYWORDS: &[&str] = &["502", "503", "504", "rate limit", "too many requests"];
const GIVE_UP_KEYWORDS: &[&str] = &[
    "400",
    "401",
    "403",
    "404",
    "file not found",
    "invalid url",
    "malformed url",
];

#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("connection reset or refused: {0}")]
    ConnectionReset(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("network or OS error: {0}")]
    Network(String),
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn message(&self) -> &str {
        match self {
            FetchError::ConnectionReset(m)
            | FetchError::Timeout(m)
            | FetchError::Network(m)
            | FetchError::Permanent(m) => m,
        }
    }
}

/// Classify a raw error message as something the retry loop should
/// continue to retry.
pub fn should_retry(message: &str) -> bool {
    let lower = message.to_lowercase();
    if GIVE_UP_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return false;
    }
    RETRY_KEYWORDS.iter().any(|kw| lower.contains(kw))
        || lower.contains("connection reset")
        || lower.contains("connection refused")
        || lower.contains("timed out")
        || lower.contains("timeout")
}

/// Classify a raw error message as an immediate give-up.
pub fn should_give_up(message: &str) -> bool {
    let lower = message.to_lowercase();
    GIVE_UP_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_secs: u64,
    pub factor: u32,
    pub max_sleep: Duration,
    pub max_tries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_secs: 2,
            factor: 2,
            max_sleep: Duration::from_secs(30),
            max_tries: 4,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_tries: u32) -> Self {
        Self {
            max_tries,
            ..Default::default()
        }
    }

    fn sleep_for(&self, attempt: u32) -> Duration {
        let scaled = self.base_secs.saturating_mul(self.factor.saturating_pow(attempt) as u64);
        Duration::from_secs(scaled).min(self.max_sleep)
    }

    /// Run `f` with exponential backoff, giving up immediately on a
    /// give-up classified error and otherwise retrying up to `max_tries`.
    pub async fn run<F, Fut, T>(&self, mut f: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if should_give_up(err.message()) {
                        return Err(err);
                    }
                    attempt += 1;
                    if attempt >= self.max_tries {
                        return Err(err);
                    }
                    let sleep_dur = self.sleep_for(attempt);
                    warn!(attempt, ?sleep_dur, error = %err, "retrying after failure");
                    tokio::time::sleep(sleep_dur).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn give_up_keywords_never_retry() {
        assert!(should_give_up("404 not found"));
        assert!(!should_retry("404 not found"));
    }

    #[test]
    fn retry_keywords_always_retry() {
        assert!(should_retry("503 service unavailable"));
        assert!(!should_give_up("503 service unavailable"));
    }

    #[test]
    fn rate_limit_message_retries() {
        assert!(should_retry("Rate limit exceeded, try later"));
    }

    #[tokio::test]
    async fn stops_retrying_on_give_up_error() {
        let policy = RetryPolicy::new(4);
        let mut calls = 0;
        let result: Result<(), FetchError> = policy
            .run(|| {
                calls += 1;
                async { Err(FetchError::Permanent("404 not found".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn exhausts_max_tries_on_retryable_error() {
        let policy = RetryPolicy {
            base_secs: 0,
            max_sleep: Duration::from_millis(1),
            ..RetryPolicy::new(3)
        };
        let mut calls = 0;
        let result: Result<(), FetchError> = policy
            .run(|| {
                calls += 1;
                async { Err(FetchError::Network("503".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }
}
