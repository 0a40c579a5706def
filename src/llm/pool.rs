//! Model-pool manager: named pools of endpoints with a selection
//! strategy, per-endpoint health/circuit state, and node-name routing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;
use thiserror::Error;
use tracing::{info, warn};

use super::provider::{LlmError, LlmProvider, Message};
use crate::metrics::POOL_CIRCUIT_OPEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBalanceStrategy {
    RoundRobin,
    Random,
    WeightedRandom,
    LeastUsed,
}

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_retries: u32,
    pub timeout: Duration,
    pub concurrent_limit: usize,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_timeout: Duration,
    pub health_check_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_retries: 4,
            timeout: Duration::from_secs(30),
            concurrent_limit: 10,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout: Duration::from_secs(60),
            health_check_interval: Duration::from_secs(30),
        }
    }
}

/// Static description of a pool member. `weight` feeds `weighted_random`.
#[derive(Debug, Clone)]
pub struct ModelEndpoint {
    pub provider: String,
    pub model: String,
    pub weight: u32,
}

#[derive(Debug, Clone)]
struct EndpointState {
    healthy: bool,
    error_count: u32,
    open_until: Option<Instant>,
}

impl Default for EndpointState {
    fn default() -> Self {
        Self {
            healthy: true,
            error_count: 0,
            open_until: None,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("no pool registered for node {0:?}")]
    NoPool(Option<String>),
    #[error("no healthy endpoint available in pool {0}")]
    NoHealthyEndpoint(String),
    #[error("call failed: {0}")]
    CallFailed(String),
}

impl From<LlmError> for PoolError {
    fn from(e: LlmError) -> Self {
        PoolError::CallFailed(e.to_string())
    }
}

struct PoolInner {
    states: Vec<EndpointState>,
    rr_counter: u64,
}

/// A named, load-balanced, circuit-breaking set of interchangeable LLM
/// endpoints. Counters/selection/circuit transitions are serialized
/// under `inner`; the semaphore bounds in-flight calls to
/// `config.concurrent_limit`.
pub struct Pool {
    pub name: String,
    pub description: String,
    pub endpoints: Vec<ModelEndpoint>,
    pub strategy: LoadBalanceStrategy,
    pub config: PoolConfig,
    providers: Vec<Arc<dyn LlmProvider>>,
    inner: Mutex<PoolInner>,
    semaphore: tokio::sync::Semaphore,
}

impl Pool {
    pub fn new(
        name: String,
        description: String,
        endpoints: Vec<ModelEndpoint>,
        providers: Vec<Arc<dyn LlmProvider>>,
        strategy: LoadBalanceStrategy,
        config: PoolConfig,
    ) -> Self {
        assert_eq!(endpoints.len(), providers.len(), "endpoints and providers must pair up");
        let states = endpoints.iter().map(|_| EndpointState::default()).collect();
        let semaphore = tokio::sync::Semaphore::new(config.concurrent_limit);
        Self {
            name,
            description,
            endpoints,
            strategy,
            config,
            providers,
            inner: Mutex::new(PoolInner { states, rr_counter: 0 }),
            semaphore,
        }
    }

    fn healthy_indices(inner: &PoolInner) -> Vec<usize> {
        let now = Instant::now();
        inner
            .states
            .iter()
            .enumerate()
            .filter(|(_, s)| s.healthy && s.open_until.map(|until| now >= until).unwrap_or(true))
            .map(|(i, _)| i)
            .collect()
    }

    /// Selects a healthy endpoint index under the pool's strategy. If no
    /// endpoint is healthy, resets all endpoints' state ("panic reset")
    /// and retries selection once.
    fn select(&self) -> usize {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        let mut healthy = Self::healthy_indices(&inner);
        if healthy.is_empty() {
            warn!(pool = %self.name, "no healthy endpoint, resetting circuit state");
            for state in &mut inner.states {
                *state = EndpointState::default();
            }
            healthy = Self::healthy_indices(&inner);
        }

        match self.strategy {
            LoadBalanceStrategy::RoundRobin => {
                let idx = healthy[(inner.rr_counter as usize) % healthy.len()];
                inner.rr_counter = inner.rr_counter.wrapping_add(1);
                idx
            }
            LoadBalanceStrategy::Random => {
                let pick = rand::thread_rng().gen_range(0..healthy.len());
                healthy[pick]
            }
            LoadBalanceStrategy::WeightedRandom => {
                let total: u64 = healthy.iter().map(|&i| self.endpoints[i].weight as u64).sum();
                let mut target = rand::thread_rng().gen_range(0..total.max(1));
                let mut chosen = healthy[0];
                for &idx in &healthy {
                    let w = self.endpoints[idx].weight as u64;
                    if target < w {
                        chosen = idx;
                        break;
                    }
                    target -= w;
                }
                chosen
            }
            LoadBalanceStrategy::LeastUsed => *healthy
                .iter()
                .min_by_key(|&&i| inner.states[i].error_count)
                .expect("healthy is non-empty"),
        }
    }

    fn report_success(&self, idx: usize) {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        let state = &mut inner.states[idx];
        state.error_count = 0;
        state.healthy = true;
        state.open_until = None;
        let any_open = inner.states.iter().any(|s| !s.healthy);
        POOL_CIRCUIT_OPEN.with_label_values(&[&self.name]).set(any_open as i64);
    }

    fn report_error(&self, idx: usize) {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        let state = &mut inner.states[idx];
        state.error_count += 1;
        if state.error_count >= self.config.circuit_breaker_threshold {
            state.healthy = false;
            state.open_until = Some(Instant::now() + self.config.circuit_breaker_timeout);
            warn!(pool = %self.name, endpoint = idx, "circuit opened");
        }
        let any_open = inner.states.iter().any(|s| !s.healthy);
        POOL_CIRCUIT_OPEN.with_label_values(&[&self.name]).set(any_open as i64);
    }

    /// Serialized through the pool's semaphore, retried up to
    /// `config.max_retries` times against (possibly different) healthy
    /// endpoints.
    pub async fn call(&self, messages: &[Message]) -> Result<String, PoolError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| PoolError::CallFailed("pool semaphore closed".to_string()))?;

        let mut last_err = None;
        for _attempt in 0..self.config.max_retries.max(1) {
            let idx = self.select();
            let provider = &self.providers[idx];
            match provider.call(messages).await {
                Ok(reply) => {
                    self.report_success(idx);
                    return Ok(reply);
                }
                Err(err) => {
                    self.report_error(idx);
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.map(PoolError::from).unwrap_or_else(|| PoolError::CallFailed("exhausted retries".to_string())))
    }
}

/// Owns every pool and the `node_name -> pool_name` routing table.
pub struct PoolManager {
    pools: HashMap<String, Arc<Pool>>,
    node_mapping: HashMap<String, String>,
    default_pool: Option<String>,
}

impl PoolManager {
    pub fn new(pools: HashMap<String, Arc<Pool>>, node_mapping: HashMap<String, String>, default_pool: Option<String>) -> Self {
        Self {
            pools,
            node_mapping,
            default_pool,
        }
    }

    /// Resolves `node_name` to its mapped pool, falling back to the
    /// default pool when unmapped; fails with `NoPool` if neither exists.
    pub fn get(&self, node_name: Option<&str>) -> Result<Arc<Pool>, PoolError> {
        let pool_name = node_name
            .and_then(|n| self.node_mapping.get(n))
            .or(self.default_pool.as_ref())
            .ok_or_else(|| PoolError::NoPool(node_name.map(str::to_string)))?;

        self.pools
            .get(pool_name)
            .cloned()
            .ok_or_else(|| PoolError::NoPool(node_name.map(str::to_string)))
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysFail;

    #[async_trait]
    impl LlmProvider for AlwaysFail {
        async fn call(&self, _messages: &[Message]) -> Result<String, LlmError> {
            Err(LlmError::Status("500".to_string()))
        }
    }

    struct Counting {
        id: &'static str,
        replies: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for Counting {
        async fn call(&self, _messages: &[Message]) -> Result<String, LlmError> {
            self.replies.fetch_add(1, Ordering::SeqCst);
            Ok(self.id.to_string())
        }
    }

    fn endpoint(model: &str, weight: u32) -> ModelEndpoint {
        ModelEndpoint {
            provider: "test".to_string(),
            model: model.to_string(),
            weight,
        }
    }

    #[tokio::test]
    async fn round_robin_distributes_across_healthy_endpoints() {
        let endpoints = vec![endpoint("a", 1), endpoint("b", 1)];
        let providers: Vec<Arc<dyn LlmProvider>> = vec![
            Arc::new(Counting { id: "a", replies: AtomicUsize::new(0) }),
            Arc::new(Counting { id: "b", replies: AtomicUsize::new(0) }),
        ];
        let pool = Pool::new(
            "p".to_string(),
            "".to_string(),
            endpoints,
            providers,
            LoadBalanceStrategy::RoundRobin,
            PoolConfig::default(),
        );

        let mut seen = std::collections::HashSet::new();
        for _ in 0..4 {
            let reply = pool.call(&[]).await.unwrap();
            seen.insert(reply);
        }
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn circuit_opens_after_threshold_and_recovers() {
        let mut config = PoolConfig::default();
        config.circuit_breaker_threshold = 2;
        config.circuit_breaker_timeout = Duration::from_millis(50);
        config.max_retries = 1;

        let endpoints = vec![endpoint("a", 1)];
        let providers: Vec<Arc<dyn LlmProvider>> = vec![Arc::new(AlwaysFail)];
        let pool = Pool::new(
            "p".to_string(),
            "".to_string(),
            endpoints,
            providers,
            LoadBalanceStrategy::RoundRobin,
            config,
        );

        let _ = pool.call(&[]).await;
        let _ = pool.call(&[]).await;
        {
            let inner = pool.inner.lock().unwrap();
            assert!(!inner.states[0].healthy);
        }

        tokio::time::sleep(Duration::from_millis(60)).await;
        let healthy = {
            let inner = pool.inner.lock().unwrap();
            Pool::healthy_indices(&inner)
        };
        assert_eq!(healthy, vec![0]);
    }

    #[test]
    fn manager_resolves_node_to_mapped_pool_else_default() {
        let endpoints = vec![endpoint("a", 1)];
        let providers: Vec<Arc<dyn LlmProvider>> = vec![Arc::new(Counting { id: "a", replies: AtomicUsize::new(0) })];
        let pool = Arc::new(Pool::new(
            "default".to_string(),
            "".to_string(),
            endpoints,
            providers,
            LoadBalanceStrategy::RoundRobin,
            PoolConfig::default(),
        ));

        let mut pools = HashMap::new();
        pools.insert("default".to_string(), pool);
        let mut mapping = HashMap::new();
        mapping.insert("tagger".to_string(), "default".to_string());

        let manager = PoolManager::new(pools, mapping, Some("default".to_string()));
        assert!(manager.get(Some("tagger")).is_ok());
        assert!(manager.get(Some("unmapped_node")).is_ok());
        assert!(manager.get(None).is_ok());
    }

    #[test]
    fn manager_fails_with_no_pool_when_no_default() {
        let manager = PoolManager::new(HashMap::new(), HashMap::new(), None);
        assert!(matches!(manager.get(Some("tagger")), Err(PoolError::NoPool(_))));
    }
}
