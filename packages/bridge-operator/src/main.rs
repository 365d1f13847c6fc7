mod adapters;
mod api;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bridge_core::cache::{CacheConfig, KvCache};
use bridge_core::config::Config;
use bridge_core::metrics::Metrics;
use bridge_core::monitor::Monitor;
use bridge_core::orchestrator::{Engine, Orchestrator};
use bridge_core::safety::SafetyController;
use bridge_core::store;

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread().enable_all().build()?.block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    tracing::info!("starting bridge operator");

    let config = Config::load()?;
    config.validate()?;

    let pool = store::create_pool(&config.database.url, config.database.max_connections).await?;
    tracing::info!("database connected");

    store::run_migrations(&pool).await?;
    tracing::info!("migrations complete");

    let safety = Arc::new(SafetyController::new(config.safety.clone()));
    let monitor = Arc::new(Monitor::new(config.monitor.clone()));
    let cache = Arc::new(Mutex::new(KvCache::new(CacheConfig::default())));
    let metrics = Arc::new(Metrics::new());

    let chain_a: Arc<dyn bridge_core::adapter::ChainAdapter> = Arc::new(adapters::UnimplementedAdapter::new("chain-a"));
    let chain_b: Arc<dyn bridge_core::adapter::ChainAdapter> = Arc::new(adapters::UnimplementedAdapter::new("chain-b"));

    let bind_addr = config.operator_bind_addr.clone();

    let engine = Arc::new(Engine { pool, chain_a, chain_b, safety, monitor, cache, config, metrics });

    let orchestrator = Arc::new(Orchestrator::new(engine.clone()));
    orchestrator.start().await?;
    tracing::info!("engine started, processing loops running");

    let state = api::AppState { engine: engine.clone() };
    let router = api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "operator HTTP surface listening");

    tokio::select! {
        result = axum::serve(listener, router) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "operator HTTP server error");
            }
        }
        _ = wait_for_shutdown_signal() => {
            tracing::info!("shutdown signal received, draining engine loops");
        }
    }

    orchestrator.stop(Duration::from_secs(30)).await?;
    orchestrator.flush().await?;

    tracing::info!("bridge operator stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,bridge_core=debug,bridge_operator=debug"));

    tracing_subscriber::registry().with(fmt::layer().with_target(true).with_thread_ids(true)).with(filter).init();
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
