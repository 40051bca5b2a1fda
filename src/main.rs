//! Storage Gateway
//!
//! Serves a uniform volume and snapshot API across the storage services
//! named in the configuration file. Without a configuration file a single
//! in-memory `vfs` service is started.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storage_gateway::{
    ApiServer, AppState, Dispatcher, GatewayConfig, Metrics, Registry, ServiceCatalog,
    TaskEngine, TaskEngineConfig,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Storage Gateway - one API over many storage backends
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, short = 'c', env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// API bind address (overrides server.address)
    #[arg(long, env = "API_ADDR")]
    api_addr: Option<String>,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    /// Maximum concurrently running tasks, 0 for unbounded
    #[arg(long, env = "MAX_CONCURRENCY")]
    max_concurrency: Option<usize>,

    /// Per-task timeout in seconds, 0 to disable
    #[arg(long, env = "TASK_TIMEOUT_SECS")]
    task_timeout_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let config = load_config(&args)?;
    let addr = config.socket_addr()?;

    info!("Starting Storage Gateway");
    info!("  Version: {}", storage_gateway::VERSION);
    info!("  API: {}", addr);
    info!("  Services: {}", config.services.len());
    info!(
        "  Max concurrency: {}",
        match config.server.tasks.max_concurrency {
            0 => "unbounded".to_string(),
            n => n.to_string(),
        }
    );

    let registry = Registry::with_builtins();
    let metrics = Metrics::new().context("failed to create metrics registry")?;
    let engine = TaskEngine::with_metrics(
        TaskEngineConfig::from(&config.server.tasks),
        metrics.clone(),
    );

    let catalog = ServiceCatalog::instantiate(&registry, &config, engine.clone())
        .await
        .context("failed to initialise storage services")?;
    for service in catalog.all() {
        info!(
            service = service.name(),
            driver = service.driver_name(),
            "Storage service ready"
        );
    }

    let dispatcher = Dispatcher::new(catalog);
    let state = AppState::new(registry, dispatcher, config);

    // Start metrics server
    if let Some(metrics_addr) = args.metrics_addr.as_deref() {
        let metrics_addr: SocketAddr = metrics_addr
            .parse()
            .with_context(|| format!("invalid metrics address {}", metrics_addr))?;
        let metrics = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(metrics_addr, metrics).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let server = ApiServer::new(addr, state);
    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C"),
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
        let _ = shutdown.send(());
    });

    server.run().await?;

    info!("Gateway shutdown complete");
    Ok(())
}

// =============================================================================
// Configuration
// =============================================================================

fn load_config(args: &Args) -> anyhow::Result<GatewayConfig> {
    let mut config = match &args.config {
        Some(path) => GatewayConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => {
            warn!("No configuration file given, serving a single vfs service");
            GatewayConfig::default().with_service("vfs", "vfs", Default::default())
        }
    };

    if let Some(addr) = &args.api_addr {
        config.server.address = addr.clone();
    }
    if let Some(n) = args.max_concurrency {
        config.server.tasks.max_concurrency = n;
    }
    if let Some(secs) = args.task_timeout_secs {
        config.server.tasks.timeout_secs = Some(secs);
    }

    config.validate()?;
    Ok(config)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "tower=warn", "tower_http=info", "axum=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(
    addr: SocketAddr,
    metrics: std::sync::Arc<Metrics>,
) -> anyhow::Result<()> {
    use axum::http::{header::CONTENT_TYPE, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;

    let app = axum::Router::new().route(
        "/metrics",
        get(move || {
            let metrics = metrics.clone();
            async move {
                match metrics.encode() {
                    Ok(body) => (
                        StatusCode::OK,
                        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
                        body,
                    )
                        .into_response(),
                    Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
                }
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics server on {}", addr))?;

    info!("Metrics server listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
