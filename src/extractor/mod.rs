//! Web content extraction: headless-browser fetch behind a polite rate
//! limiter and retry policy, followed by markdown cleaning.
//!
//! The fetch backend is abstracted behind [`PageFetcher`] so the real
//! Chromium connection (see `browser.rs`) can be swapped for a fake one
//! in tests without touching the concurrency/retry/cleanup contract.

pub mod browser;
pub mod html_markdown;
pub mod markdown;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::metrics::{EXTRACTOR_FAILURES_TOTAL, EXTRACTOR_INFLIGHT};
use crate::ratelimit::domain_tracker::DomainTracker;
use crate::ratelimit::{uniform_delay, RateLimitPolicy};
use crate::retry::{FetchError, RetryPolicy};

pub use browser::ChromiumFetcher;

/// Abstraction over "fetch the rendered HTML for this URL" so tests can
/// substitute a fake without a running Chromium instance.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError>;
}

/// Outcome of extracting a single URL. Never raises past this boundary:
/// failures are reported in `error`, not as an `Err`.
#[derive(Debug, Clone)]
pub struct ExtractResult {
    pub url: String,
    pub ok: bool,
    pub content: Option<String>,
    pub title: Option<String>,
    pub word_count: usize,
    pub error: Option<String>,
}

/// Decrements `EXTRACTOR_INFLIGHT` on drop, covering every early return.
struct InflightGuard;

impl Drop for InflightGuard {
    fn drop(&mut self) {
        EXTRACTOR_INFLIGHT.dec();
    }
}

impl ExtractResult {
    fn failure(url: &str, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            ok: false,
            content: None,
            title: None,
            word_count: 0,
            error: Some(error.into()),
        }
    }
}

/// Process-wide extraction facade: caps concurrency, enforces the polite
/// crawling policy, retries transient failures, and cleans content.
pub struct WebExtractor {
    fetcher: Arc<dyn PageFetcher>,
    rate_limit: Arc<RateLimitPolicy>,
    retry: RetryPolicy,
    semaphore: Arc<tokio::sync::Semaphore>,
}

impl WebExtractor {
    /// `global_max_concurrent` bounds total in-flight fetches; when
    /// `anti_detection` is enabled the effective cap is `min(2,
    /// global_max_concurrent)` to keep the browser footprint small.
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        rate_limit: Arc<RateLimitPolicy>,
        retry: RetryPolicy,
        global_max_concurrent: usize,
        anti_detection: bool,
    ) -> Self {
        let effective = if anti_detection {
            global_max_concurrent.min(2)
        } else {
            global_max_concurrent
        }
        .max(1);

        Self {
            fetcher,
            rate_limit,
            retry,
            semaphore: Arc::new(tokio::sync::Semaphore::new(effective)),
        }
    }

    /// Extract a single URL: rate-limit, retry-decorated fetch, then clean.
    /// Always returns a result; failures are carried in `ExtractResult`.
    pub async fn extract(&self, url: &str) -> ExtractResult {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return ExtractResult::failure(url, "extractor semaphore closed"),
        };

        EXTRACTOR_INFLIGHT.inc();
        let _inflight_guard = InflightGuard;

        self.rate_limit.before_fetch(url).await;

        let fetcher = &self.fetcher;
        let fetch_result = self
            .retry
            .run(|| async { fetcher.fetch_html(url).await })
            .await;

        let html = match fetch_result {
            Ok(html) => html,
            Err(err) => {
                warn!(url, error = %err, "extraction gave up after retries");
                EXTRACTOR_FAILURES_TOTAL.inc();
                return ExtractResult::failure(url, err.to_string());
            }
        };

        let raw_markdown = html_markdown::html_to_markdown(&html);
        let content = markdown::clean_markdown(&raw_markdown);
        let title = markdown::extract_title(None, None, &content);
        let word_count = content.split_whitespace().count();

        info!(url, word_count, "extraction complete");

        ExtractResult {
            url: url.to_string(),
            ok: true,
            content: Some(content),
            title,
            word_count,
            error: None,
        }
    }

    /// Extract many URLs, grouped by host so that within a host requests
    /// queue behind the rate limiter, with a `uniform(2s, 5s)` pause
    /// between host groups (not after the last one).
    pub async fn extract_many(&self, urls: &[String]) -> HashMap<String, ExtractResult> {
        let mut by_host: HashMap<String, Vec<String>> = HashMap::new();
        for url in urls {
            by_host.entry(DomainTracker::host_of(url)).or_default().push(url.clone());
        }

        let mut results = HashMap::with_capacity(urls.len());
        let host_count = by_host.len();
        for (idx, (_host, group)) in by_host.into_iter().enumerate() {
            let fetches = group.iter().map(|url| self.extract(url));
            let group_results = futures::future::join_all(fetches).await;
            for result in group_results {
                results.insert(result.url.clone(), result);
            }

            if idx + 1 < host_count {
                let delay = uniform_delay(
                    std::time::Duration::from_secs(2),
                    std::time::Duration::from_secs(5),
                );
                tokio::time::sleep(delay).await;
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeFetcher {
        calls: AtomicUsize,
        html: String,
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch_html(&self, _url: &str) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.html.clone())
        }
    }

    struct AlwaysFailFetcher;

    #[async_trait]
    impl PageFetcher for AlwaysFailFetcher {
        async fn fetch_html(&self, _url: &str) -> Result<String, FetchError> {
            Err(FetchError::Permanent("404 not found".into()))
        }
    }

    fn no_delay_policy() -> RateLimitPolicy {
        RateLimitPolicy::new(crate::ratelimit::RateLimitDefaults {
            min_global: Duration::ZERO,
            max_global: Duration::ZERO,
            min_domain: Duration::ZERO,
            max_domain: Duration::ZERO,
        })
    }

    #[tokio::test]
    async fn extracts_and_cleans_content() {
        let fetcher = Arc::new(FakeFetcher {
            calls: AtomicUsize::new(0),
            html: "<h1>Title</h1><p>Body text</p><img src=\"x.png\">".to_string(),
        });
        let extractor = WebExtractor::new(
            fetcher,
            Arc::new(no_delay_policy()),
            RetryPolicy::new(2),
            4,
            false,
        );

        let result = extractor.extract("https://example.com/a").await;
        assert!(result.ok);
        assert_eq!(result.title.as_deref(), Some("Title"));
        assert!(!result.content.unwrap().contains("x.png"));
    }

    #[tokio::test]
    async fn give_up_error_surfaces_as_failed_result_not_panic() {
        let extractor = WebExtractor::new(
            Arc::new(AlwaysFailFetcher),
            Arc::new(no_delay_policy()),
            RetryPolicy::new(3),
            4,
            false,
        );

        let result = extractor.extract("https://example.com/missing").await;
        assert!(!result.ok);
        assert!(result.error.unwrap().contains("404"));
    }

    #[tokio::test]
    async fn anti_detection_caps_concurrency_at_two() {
        let fetcher = Arc::new(FakeFetcher {
            calls: AtomicUsize::new(0),
            html: "<p>x</p>".to_string(),
        });
        let extractor = WebExtractor::new(fetcher, Arc::new(no_delay_policy()), RetryPolicy::new(1), 8, true);
        assert_eq!(extractor.semaphore.available_permits(), 2);
    }

    #[tokio::test]
    async fn extract_many_groups_by_host_and_pauses_between_groups() {
        let fetcher = Arc::new(FakeFetcher {
            calls: AtomicUsize::new(0),
            html: "<p>hi</p>".to_string(),
        });
        let extractor = WebExtractor::new(fetcher, Arc::new(no_delay_policy()), RetryPolicy::new(1), 4, false);

        let urls = vec![
            "https://a.test/1".to_string(),
            "https://a.test/2".to_string(),
            "https://b.test/1".to_string(),
        ];

        let start = std::time::Instant::now();
        let results = extractor.extract_many(&urls).await;
        assert_eq!(results.len(), 3);
        assert!(results.values().all(|r| r.ok));
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
