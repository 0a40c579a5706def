//! Pool config loader: reads the declarative `providers`/`pools`/`nodes`
//! YAML document, validates it, and materializes a [`PoolManager`] from
//! scratch.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use super::pool::{LoadBalanceStrategy, ModelEndpoint, Pool, PoolConfig, PoolManager};
use super::provider::{HttpChatProvider, LlmProvider};

#[derive(Error, Debug)]
pub enum PoolConfigError {
    #[error("could not read pool config file {0}: {1}")]
    Io(String, #[source] std::io::Error),
    #[error("could not parse pool config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("pool {0:?} references unknown model {1:?}")]
    UnknownModel(String, String),
    #[error("node {0:?} references unknown pool {1:?}")]
    UnknownPool(String, String),
    #[error("pool {0:?} has an invalid load_balance_strategy {1:?}")]
    InvalidStrategy(String, String),
    #[error("pool {0:?} has no models")]
    EmptyPool(String),
    #[error("{field} = {value} is outside its valid range {lo}..{hi}")]
    OutOfRange { field: String, value: f64, lo: f64, hi: f64 },
}

#[derive(Debug, Deserialize)]
struct RawModel {
    model: String,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    weight: Option<u32>,
    #[serde(default)]
    tpm: Option<u32>,
    #[serde(default)]
    rpm: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawProvider {
    provider: String,
    #[serde(default)]
    api_base: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    api_version: Option<String>,
    models: Vec<RawModel>,
}

#[derive(Debug, Deserialize, Default)]
struct RawPoolConfig {
    #[serde(default)]
    max_retries: Option<u32>,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    concurrent_limit: Option<usize>,
    #[serde(default)]
    circuit_breaker_threshold: Option<u32>,
    #[serde(default)]
    circuit_breaker_timeout: Option<u64>,
    #[serde(default)]
    health_check_interval: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawPool {
    #[serde(default)]
    description: String,
    models: Vec<String>,
    load_balance_strategy: String,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    pool_config: RawPoolConfig,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNode {
    Name(String),
    Explicit { pool: String },
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    providers: HashMap<String, RawProvider>,
    pools: HashMap<String, RawPool>,
    #[serde(default)]
    nodes: HashMap<String, RawNode>,
    #[serde(default)]
    default_pool: Option<String>,
}

fn in_range(field: &str, value: f64, lo: f64, hi: f64) -> Result<(), PoolConfigError> {
    if value < lo || value > hi {
        return Err(PoolConfigError::OutOfRange {
            field: field.to_string(),
            value,
            lo,
            hi,
        });
    }
    Ok(())
}

pub struct PoolConfigLoader;

impl PoolConfigLoader {
    pub fn load(path: &Path) -> Result<PoolManager, PoolConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| PoolConfigError::Io(path.display().to_string(), e))?;
        Self::load_str(&raw)
    }

    pub fn load_str(raw: &str) -> Result<PoolManager, PoolConfigError> {
        let doc: RawDocument = serde_yaml::from_str(raw)?;

        let mut pools = HashMap::new();
        for (pool_name, raw_pool) in &doc.pools {
            let strategy = match raw_pool.load_balance_strategy.as_str() {
                "round_robin" => LoadBalanceStrategy::RoundRobin,
                "random" => LoadBalanceStrategy::Random,
                "weighted_random" => LoadBalanceStrategy::WeightedRandom,
                "least_used" => LoadBalanceStrategy::LeastUsed,
                other => {
                    return Err(PoolConfigError::InvalidStrategy(pool_name.clone(), other.to_string()));
                }
            };

            if raw_pool.models.is_empty() {
                return Err(PoolConfigError::EmptyPool(pool_name.clone()));
            }

            if let Some(temp) = raw_pool.temperature {
                in_range("temperature", temp as f64, 0.0, 2.0)?;
            }
            if let Some(timeout) = raw_pool.timeout {
                in_range("timeout", timeout as f64, 1.0, 300.0)?;
            }

            let pc = &raw_pool.pool_config;
            if let Some(v) = pc.max_retries {
                in_range("max_retries", v as f64, 1.0, 10.0)?;
            }
            if let Some(v) = pc.timeout {
                in_range("pool_config.timeout", v as f64, 1.0, 300.0)?;
            }
            if let Some(v) = pc.concurrent_limit {
                in_range("concurrent_limit", v as f64, 1.0, 100.0)?;
            }
            if let Some(v) = pc.circuit_breaker_threshold {
                in_range("circuit_breaker_threshold", v as f64, 1.0, 50.0)?;
            }
            if let Some(v) = pc.circuit_breaker_timeout {
                in_range("circuit_breaker_timeout", v as f64, 10.0, 3600.0)?;
            }
            if let Some(v) = pc.health_check_interval {
                in_range("health_check_interval", v as f64, 10.0, 300.0)?;
            }

            let config = PoolConfig {
                max_retries: pc.max_retries.unwrap_or(4),
                timeout: Duration::from_secs(pc.timeout.unwrap_or(30)),
                concurrent_limit: pc.concurrent_limit.unwrap_or(10),
                circuit_breaker_threshold: pc.circuit_breaker_threshold.unwrap_or(5),
                circuit_breaker_timeout: Duration::from_secs(pc.circuit_breaker_timeout.unwrap_or(60)),
                health_check_interval: Duration::from_secs(pc.health_check_interval.unwrap_or(30)),
            };

            let mut endpoints = Vec::with_capacity(raw_pool.models.len());
            let mut providers: Vec<Arc<dyn LlmProvider>> = Vec::with_capacity(raw_pool.models.len());
            for model_ref in &raw_pool.models {
                let (provider_name, model_name) = model_ref
                    .split_once(':')
                    .ok_or_else(|| PoolConfigError::UnknownModel(pool_name.clone(), model_ref.clone()))?;

                let raw_provider = doc
                    .providers
                    .get(provider_name)
                    .ok_or_else(|| PoolConfigError::UnknownModel(pool_name.clone(), model_ref.clone()))?;

                let raw_model = raw_provider
                    .models
                    .iter()
                    .find(|m| m.model == model_name)
                    .ok_or_else(|| PoolConfigError::UnknownModel(pool_name.clone(), model_ref.clone()))?;

                let temperature = raw_model.temperature.or(raw_pool.temperature).unwrap_or(0.7);
                let timeout_secs = raw_model.timeout.or(raw_pool.timeout).unwrap_or(30);
                let weight = raw_model.weight.unwrap_or(1).max(1);

                endpoints.push(ModelEndpoint {
                    provider: raw_provider.provider.clone(),
                    model: model_name.to_string(),
                    weight,
                });

                providers.push(Arc::new(HttpChatProvider::new(
                    raw_provider.api_base.clone().unwrap_or_default(),
                    raw_provider.api_key.clone(),
                    model_name.to_string(),
                    temperature,
                    Duration::from_secs(timeout_secs),
                )));
            }

            let pool = Pool::new(
                pool_name.clone(),
                raw_pool.description.clone(),
                endpoints,
                providers,
                strategy,
                config,
            );
            pools.insert(pool_name.clone(), Arc::new(pool));
        }

        let mut node_mapping = HashMap::new();
        for (node_name, raw_node) in &doc.nodes {
            let pool_name = match raw_node {
                RawNode::Name(name) => name.clone(),
                RawNode::Explicit { pool } => pool.clone(),
            };
            if !pools.contains_key(&pool_name) {
                return Err(PoolConfigError::UnknownPool(node_name.clone(), pool_name));
            }
            node_mapping.insert(node_name.clone(), pool_name);
        }

        if let Some(default_pool) = &doc.default_pool {
            if !pools.contains_key(default_pool) {
                return Err(PoolConfigError::UnknownPool("default_pool".to_string(), default_pool.clone()));
            }
        }

        Ok(PoolManager::new(pools, node_mapping, doc.default_pool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
providers:
  openai:
    provider: openai
    api_base: https://api.openai.test/v1
    api_key: secret
    models:
      - model: gpt-test
        weight: 1
pools:
  default:
    description: default pool
    models: ["openai:gpt-test"]
    load_balance_strategy: round_robin
nodes:
  tagger: default
  score: { pool: default }
default_pool: default
"#;

    #[test]
    fn loads_a_valid_document() {
        let manager = PoolConfigLoader::load_str(VALID).expect("valid document loads");
        assert_eq!(manager.pool_count(), 1);
        assert!(manager.get(Some("tagger")).is_ok());
        assert!(manager.get(Some("score")).is_ok());
    }

    #[test]
    fn unknown_strategy_fails() {
        let doc = VALID.replace("round_robin", "bogus_strategy");
        assert!(matches!(
            PoolConfigLoader::load_str(&doc),
            Err(PoolConfigError::InvalidStrategy(_, _))
        ));
    }

    #[test]
    fn node_referencing_unknown_pool_fails() {
        let doc = VALID.replace("tagger: default", "tagger: missing_pool");
        assert!(matches!(
            PoolConfigLoader::load_str(&doc),
            Err(PoolConfigError::UnknownPool(_, _))
        ));
    }

    #[test]
    fn pool_referencing_unknown_model_fails() {
        let doc = VALID.replace(r#"["openai:gpt-test"]"#, r#"["openai:not-a-model"]"#);
        assert!(matches!(
            PoolConfigLoader::load_str(&doc),
            Err(PoolConfigError::UnknownModel(_, _))
        ));
    }

    #[test]
    fn out_of_range_temperature_fails() {
        let doc = VALID.replace("load_balance_strategy: round_robin", "load_balance_strategy: round_robin\n    temperature: 5.0");
        assert!(matches!(
            PoolConfigLoader::load_str(&doc),
            Err(PoolConfigError::OutOfRange { .. })
        ));
    }
}
