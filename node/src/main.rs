use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use licreg_registry::RegistrationService;
use licreg_rpc::{start_server_with_shutdown, AppState};
use licreg_storage::{MemoryStore, RedisStore, RegistrationStore};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod version;

use crate::config::{AppConfig, StoreBackend};
use version::{git_commit_hash, LICREG_VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("licreg-node")
        .version(LICREG_VERSION)
        .about("Serial-number registration service")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (TOML); environment variables take precedence"),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .action(ArgAction::SetTrue)
                .help("Validate configuration and probe the store, then exit"),
        )
        .get_matches();

    let config = AppConfig::load(matches.get_one::<String>("config").map(String::as_str))?;
    config.validate()?;

    init_logging(&config)?;

    info!(
        "Starting licreg-node {} (commit {})",
        LICREG_VERSION,
        git_commit_hash()
    );
    if let Some(path) = &config.config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let store = build_store(&config)?;

    if matches.get_flag("check") {
        return run_self_check(&config, store.as_ref()).await;
    }

    let metrics = if config.prometheus_enabled {
        init_metrics()
    } else {
        None
    };

    let service = RegistrationService::new(store, config.registry);
    info!(
        backend = service.store().backend(),
        timestamps = service.tracks_timestamps(),
        policy = %config.registry.policy,
        "Registration service ready"
    );

    let state = AppState::new(service, metrics);
    start_server_with_shutdown(state, &config.listen_addr(), shutdown_signal()).await?;

    info!("licreg-node stopped");
    Ok(())
}

fn build_store(config: &AppConfig) -> Result<Arc<dyn RegistrationStore>> {
    match config.store_backend {
        StoreBackend::Redis => {
            let redis = config
                .redis
                .clone()
                .context("redis backend selected without redis settings")?;
            info!(
                "Using redis store at {}:{} (db {}, lookup db {}, time db {:?})",
                redis.host, redis.port, redis.primary_db, redis.reverse_db, redis.timestamp_db
            );
            Ok(Arc::new(RedisStore::new(redis)?))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store; registrations are lost on restart");
            Ok(Arc::new(MemoryStore::new(config.memory_timestamps)))
        }
    }
}

async fn run_self_check(config: &AppConfig, store: &dyn RegistrationStore) -> Result<()> {
    println!("licreg-node {} configuration OK", LICREG_VERSION);
    println!("  listen:     {}", config.listen_addr());
    println!("  backend:    {}", config.store_backend);
    println!("  timestamps: {}", config.timestamps_enabled());
    println!("  policy:     {}", config.registry.policy);

    store
        .ping()
        .await
        .with_context(|| format!("{} store is not reachable", store.backend()))?;
    println!("  store:      reachable");
    Ok(())
}

fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            info!("Prometheus metrics exporter registered");
            describe_counter!(
                "licreg_register_total",
                "Register requests by outcome"
            );
            describe_counter!(
                "licreg_validate_total",
                "Validate requests by outcome"
            );
            describe_counter!("licreg_reverse_total", "Reverse requests by outcome");
            Some(handle)
        }
        Err(err) => {
            warn!("Failed to install Prometheus metrics exporter: {}", err);
            None
        }
    }
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "compact" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().compact())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
