//! Centralised error type for the pipeline, plus the component-local error
//! enums that convert into it at orchestration boundaries.

use thiserror::Error;

use crate::graph::GraphError;
use crate::llm::{PoolConfigError, PoolError};
use crate::retry::FetchError;
use crate::sources::SourceListError;
use crate::time::TimeError;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Source list error: {0}")]
    Source(#[from] SourceListError),

    #[error("Fetch error: {0}")]
    FetchPolicy(#[from] FetchError),

    #[error("Datetime parse error: {0}")]
    Time(#[from] TimeError),

    #[error("Model pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Model pool configuration error: {0}")]
    PoolConfig(#[from] PoolConfigError),

    #[error("Reasoning graph error: {0}")]
    Graph(#[from] GraphError),
}
