//! Entrypoint: parse CLI flags, load configuration, connect to Postgres
//! and run migrations, load the source list and model-pool config, then
//! either run a one-shot mode (`--graph` / `--crawl`) or serve the
//! liveness/metrics/health HTTP endpoint alongside the periodic
//! ingest-then-classify job.

use std::net::SocketAddr;
use std::process::exit;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use osint_pipeline::catalog::Catalog;
use osint_pipeline::config::Settings;
use osint_pipeline::extractor::{ChromiumFetcher, WebExtractor};
use osint_pipeline::ingest;
use osint_pipeline::llm::PoolConfigLoader;
use osint_pipeline::orchestrator::Orchestrator;
use osint_pipeline::ratelimit::{RateLimitDefaults, RateLimitPolicy};
use osint_pipeline::{server, sources};

/// Content ingestion and LLM classification pipeline.
#[derive(Parser, Debug)]
#[command(name = "osint-pipeline", about = "Feed ingestion and LLM classification pipeline")]
struct Cli {
    /// Run the reasoning graph once over entries needing classification, then exit.
    #[arg(long)]
    graph: bool,

    /// Ingest every configured source once, then exit.
    #[arg(long)]
    crawl: bool,

    /// Cap the number of entries processed by `--graph` (default: unbounded).
    #[arg(long)]
    limit: Option<i64>,

    /// Ignore `limit` and process every eligible entry.
    #[arg(long)]
    ignore_limit: bool,

    /// Override the liveness/metrics/health server bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the liveness/metrics/health server bind port.
    #[arg(long)]
    port: Option<u16>,

    /// Enable debug-level logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    let settings = match Settings::new() {
        Ok(settings) => settings,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            exit(1);
        }
    };

    let pool = match PgPoolOptions::new().max_connections(10).connect(&settings.database_url).await {
        Ok(pool) => pool,
        Err(err) => {
            error!(error = %err, "failed to connect to database");
            exit(1);
        }
    };

    if let Err(err) = sqlx::migrate!("./migrations").run(&pool).await {
        error!(error = %err, "failed to run database migrations");
        exit(1);
    }
    info!("migrations complete");

    let catalog = Catalog::new(pool);

    let pools = match PoolConfigLoader::load(&settings.pool_config_path) {
        Ok(pools) => pools,
        Err(err) => {
            error!(error = %err, path = %settings.pool_config_path.display(), "failed to load model pool configuration");
            exit(1);
        }
    };
    if pools.pool_count() == 0 {
        error!(path = %settings.pool_config_path.display(), "model pool configuration registers no pools");
        exit(1);
    }
    let pools = Arc::new(pools);

    let sources = match sources::load(&settings.sources_path) {
        Ok(sources) => sources,
        Err(err) => {
            error!(error = %err, path = %settings.sources_path.display(), "failed to load source list");
            exit(1);
        }
    };
    info!(count = sources.len(), "loaded source list");

    let fetcher = match ChromiumFetcher::connect().await {
        Ok(fetcher) => Arc::new(fetcher),
        Err(err) => {
            error!(error = %err, "failed to connect to headless browser");
            exit(1);
        }
    };

    let rate_limit = Arc::new(
        RateLimitPolicy::new(RateLimitDefaults {
            min_global: std::time::Duration::from_millis(settings.rate_limit_min_global_ms),
            max_global: std::time::Duration::from_millis(settings.rate_limit_max_global_ms),
            min_domain: std::time::Duration::from_secs(settings.rate_limit_min_domain_secs),
            max_domain: std::time::Duration::from_secs(settings.rate_limit_max_domain_secs),
        })
        .with_override(Box::new(ingest::built_in_override)),
    );

    let extractor = Arc::new(WebExtractor::new(
        fetcher,
        rate_limit,
        osint_pipeline::retry::RetryPolicy::default(),
        settings.global_max_concurrent,
        settings.anti_detection,
    ));

    let orchestrator = Orchestrator::new(
        catalog,
        extractor,
        pools,
        settings.fetch_week_weeks,
        settings.network_proxy.clone(),
    );

    let limit = if cli.ignore_limit { None } else { cli.limit };

    if cli.graph {
        let outcome = orchestrator.classify(limit, settings.classify_max_concurrent).await;
        info!(processed = outcome.processed, errors = outcome.errors, "graph run complete");
        return;
    }

    if cli.crawl {
        let entries = orchestrator.ingest_all(&sources).await;
        info!(count = entries.len(), "crawl run complete");
        return;
    }

    let bind = match (&cli.host, cli.port) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => format!("{host}:8080"),
        (None, Some(port)) => format!("0.0.0.0:{port}"),
        (None, None) => settings.server_bind.clone(),
    };
    let addr: SocketAddr = match bind.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, bind, "invalid server bind address");
            exit(1);
        }
    };

    tokio::spawn(async move {
        if let Err(err) = server::serve(addr).await {
            error!(error = %err, "liveness/metrics/health server failed");
        }
    });

    let mut ticker = tokio::time::interval(settings.ingest_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let cycle_start = Instant::now();
                info!("starting ingestion cycle");
                let entries = orchestrator.ingest_all(&sources).await;
                info!(count = entries.len(), duration_s = cycle_start.elapsed().as_secs_f64(), "ingestion cycle complete");

                let outcome = orchestrator.classify(None, settings.classify_max_concurrent).await;
                info!(processed = outcome.processed, errors = outcome.errors, "classification cycle complete");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received shutdown signal, exiting");
                break;
            }
        }
    }
}
