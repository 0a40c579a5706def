//! Rate-limit & anti-detection policy: resolves an effective per-URL delay
//! configuration from defaults plus an optional override rule, then enforces
//! global and per-domain spacing before every fetch.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

use super::anti_detect::uniform_delay;
use super::domain_tracker::DomainTracker;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitDefaults {
    pub min_global: Duration,
    pub max_global: Duration,
    pub min_domain: Duration,
    pub max_domain: Duration,
}

impl Default for RateLimitDefaults {
    fn default() -> Self {
        Self {
            min_global: Duration::from_millis(500),
            max_global: Duration::from_millis(1500),
            min_domain: Duration::from_secs(3),
            max_domain: Duration::from_secs(8),
        }
    }
}

/// A partial override of the defaults, resolved key-by-key.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelayOverride {
    pub min_global: Option<Duration>,
    pub max_global: Option<Duration>,
    pub min_domain: Option<Duration>,
    pub max_domain: Option<Duration>,
}

pub type OverrideRule = dyn Fn(&str) -> Option<DelayOverride> + Send + Sync;

/// Enforces the polite-crawling delay contract in front of every fetch.
pub struct RateLimitPolicy {
    defaults: RateLimitDefaults,
    override_rule: Option<Box<OverrideRule>>,
    tracker: DomainTracker,
    last_any: Mutex<Option<Instant>>,
}

impl RateLimitPolicy {
    pub fn new(defaults: RateLimitDefaults) -> Self {
        Self {
            defaults,
            override_rule: None,
            tracker: DomainTracker::new(),
            last_any: Mutex::new(None),
        }
    }

    pub fn with_override(mut self, rule: Box<OverrideRule>) -> Self {
        self.override_rule = Some(rule);
        self
    }

    fn resolve(&self, url: &str) -> RateLimitDefaults {
        let mut effective = self.defaults;
        let Some(rule) = &self.override_rule else {
            return effective;
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| rule(url)));
        match outcome {
            Ok(Some(over)) => {
                if let Some(v) = over.min_global {
                    effective.min_global = v;
                }
                if let Some(v) = over.max_global {
                    effective.max_global = v;
                }
                if let Some(v) = over.min_domain {
                    effective.min_domain = v;
                }
                if let Some(v) = over.max_domain {
                    effective.max_domain = v;
                }
            }
            Ok(None) => {}
            Err(_) => {
                warn!(url, "rate limit override rule failed, falling back to defaults");
            }
        }
        effective
    }

    /// Runs the four-step delay procedure in front of a fetch of `url`.
    pub async fn before_fetch(&self, url: &str) {
        let effective = self.resolve(url);

        let global_gap = uniform_delay(effective.min_global, effective.max_global);
        let global_wait = {
            let mut last_any = self.last_any.lock().expect("rate limit mutex poisoned");
            let wait = match *last_any {
                Some(last) => global_gap.saturating_sub(last.elapsed()),
                None => Duration::ZERO,
            };
            *last_any = Some(Instant::now());
            wait
        };
        if !global_wait.is_zero() {
            tokio::time::sleep(global_wait).await;
        }

        let domain_gap = uniform_delay(effective.min_domain, effective.max_domain);
        let domain_wait = self.tracker.wait_needed(url, domain_gap);
        if !domain_wait.is_zero() {
            tokio::time::sleep(domain_wait).await;
        }

        self.tracker.record(url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn polite_delay_enforces_domain_gap() {
        let policy = RateLimitPolicy::new(RateLimitDefaults {
            min_global: Duration::ZERO,
            max_global: Duration::ZERO,
            min_domain: Duration::from_millis(200),
            max_domain: Duration::from_millis(200),
        });

        let start = Instant::now();
        policy.before_fetch("https://h.test/1").await;
        policy.before_fetch("https://h.test/2").await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn override_rule_wins_key_by_key() {
        let policy = RateLimitPolicy::new(RateLimitDefaults {
            min_global: Duration::ZERO,
            max_global: Duration::ZERO,
            min_domain: Duration::from_millis(10),
            max_domain: Duration::from_millis(10),
        })
        .with_override(Box::new(|url: &str| {
            if url.contains("strict.test") {
                Some(DelayOverride {
                    min_domain: Some(Duration::from_millis(300)),
                    max_domain: Some(Duration::from_millis(300)),
                    ..Default::default()
                })
            } else {
                None
            }
        }));

        let start = Instant::now();
        policy.before_fetch("https://strict.test/1").await;
        policy.before_fetch("https://strict.test/2").await;
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn panicking_override_falls_back_to_defaults() {
        let policy = RateLimitPolicy::new(RateLimitDefaults {
            min_global: Duration::ZERO,
            max_global: Duration::ZERO,
            min_domain: Duration::from_millis(50),
            max_domain: Duration::from_millis(50),
        })
        .with_override(Box::new(|_: &str| panic!("boom")));

        // Should not propagate the panic to the caller.
        policy.before_fetch("https://example.com/1").await;
    }
}
