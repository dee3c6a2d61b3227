use anyhow::{Result, Context};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;

use governor::{Quota, RateLimiter};
use tracing::info;

use crate::api::{self, AppState};
use crate::api::auth::ApiKeyStore;
use crate::cli::config::GatewayConfig;
use crate::engine::client::{CrawlEngine, RemoteEngineClient};
use crate::task::orchestrator::TaskOrchestrator;
use crate::task::store::InMemoryTaskStore;
use crate::utils::metrics::MetricsCollector;

/// Start the gateway server
pub async fn serve(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    // Load the configuration, with command line overrides
    let mut config = match config_path {
        Some(path) => GatewayConfig::load_from_file(&path)?,
        None => GatewayConfig::load_default()?,
    };

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    // Wire up the components
    let engine: Arc<dyn CrawlEngine> = Arc::new(RemoteEngineClient::new(&config.engine));
    let metrics = MetricsCollector::new();
    let store = InMemoryTaskStore::new();

    let orchestrator = Arc::new(TaskOrchestrator::new(
        store,
        engine.clone(),
        config.tasks.clone(),
        metrics.clone(),
    ));

    let keys = Arc::new(
        ApiKeyStore::open(config.key_file())
            .await
            .context("Failed to open API key store")?,
    );

    let rate = NonZeroU32::new(config.server.rate_limit_per_minute)
        .unwrap_or(NonZeroU32::MIN);
    let limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rate)));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Engine endpoint: {}", config.engine.url);

    let state = AppState {
        orchestrator,
        engine,
        metrics,
        keys,
        limiter,
        config: Arc::new(config),
    };

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind to {addr}"))?;

    info!("Gateway listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    // Shut down cleanly on ctrl-c; in-flight engine calls are dropped
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}

/// Print the active configuration as YAML
pub async fn show_config() -> Result<()> {
    let config = GatewayConfig::load_default()?;
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
    println!("{yaml}");
    Ok(())
}

/// Write the default configuration to the config directory
pub async fn init_config() -> Result<()> {
    let config = GatewayConfig::default();
    config.save_as_default()?;
    println!("Default configuration written");
    Ok(())
}
