//! Per-host last-request bookkeeping, shared process-wide.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use url::Url;

struct HostState {
    last_request: Instant,
    count: u64,
}

/// Tracks the last request time and count per host so callers can compute
/// the wait needed to respect a minimum inter-request gap.
pub struct DomainTracker {
    hosts: Mutex<HashMap<String, HostState>>,
}

impl DomainTracker {
    pub fn new() -> Self {
        Self {
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Host = network-location portion of the URL (scheme-stripped,
    /// port-inclusive). Unparseable URLs are treated as their own host.
    pub fn host_of(url: &str) -> String {
        match Url::parse(url) {
            Ok(parsed) => match (parsed.host_str(), parsed.port()) {
                (Some(host), Some(port)) => format!("{host}:{port}"),
                (Some(host), None) => host.to_string(),
                (None, _) => url.to_string(),
            },
            Err(_) => url.to_string(),
        }
    }

    /// Returns `max(0, min_gap - (now - last_seen))`. First observation
    /// returns zero without mutating state.
    pub fn wait_needed(&self, url: &str, min_gap: Duration) -> Duration {
        let host = Self::host_of(url);
        let hosts = self.hosts.lock().expect("domain tracker mutex poisoned");
        match hosts.get(&host) {
            Some(state) => {
                let elapsed = state.last_request.elapsed();
                min_gap.saturating_sub(elapsed)
            }
            None => Duration::ZERO,
        }
    }

    /// Sets `last_seen[host] = now` and increments its counter.
    pub fn record(&self, url: &str) {
        let host = Self::host_of(url);
        let mut hosts = self.hosts.lock().expect("domain tracker mutex poisoned");
        hosts
            .entry(host)
            .and_modify(|state| {
                state.last_request = Instant::now();
                state.count += 1;
            })
            .or_insert(HostState {
                last_request: Instant::now(),
                count: 1,
            });
    }
}

impl Default for DomainTracker {
    fn default() -> Self {
        Self::new()
    }
}
