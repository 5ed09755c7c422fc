use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cutout_core::{
    load_config, load_config_from_env, validate_config, ArtifactStore, CommandTransformer, Config,
    FsArtifactStore, JobScheduler, QueueStatus, Transformer,
};
use cutout_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Slack added to the shutdown wait on top of the engine runs still pending
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    // CUTOUT_LOG_FORMAT=json for log shippers
    if matches!(std::env::var("CUTOUT_LOG_FORMAT").as_deref(), Ok("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run() -> Result<()> {
    init_tracing();
    info!(version = VERSION, "Starting cutout");

    // Load configuration
    let config = match std::env::var("CUTOUT_CONFIG").map(PathBuf::from) {
        Ok(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            load_config(&config_path)
                .with_context(|| format!("Failed to load config from {:?}", config_path))?
        }
        Err(_) => {
            info!("CUTOUT_CONFIG not set, using defaults and environment");
            load_config_from_env().context("Failed to load config from environment")?
        }
    };

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!(
        max_queue_length = config.queue.max_queue_length,
        max_concurrency = config.queue.max_concurrency,
        pacing_delay_ms = config.queue.pacing_delay_ms,
        max_file_bytes = config.upload.max_file_bytes,
        "Configuration loaded successfully"
    );

    // Create artifact store; an unwritable temp dir is fatal
    let store = Arc::new(FsArtifactStore::new(config.storage.clone()));
    store
        .validate()
        .await
        .with_context(|| format!("Temp directory {:?} is not usable", store.dir()))?;
    info!("Artifact store ready at {:?}", store.dir());

    // Create transformer; a missing engine only fails jobs, so keep serving
    let transformer = Arc::new(CommandTransformer::new(config.transformer.clone()));
    match transformer.validate().await {
        Ok(()) => info!("Using transformer: {}", transformer.name()),
        Err(e) => warn!(
            error = %e,
            command = ?config.transformer.command,
            "Background removal engine is not available; jobs will fail until it is installed"
        ),
    }

    let store: Arc<dyn ArtifactStore> = store;
    let scheduler = Arc::new(JobScheduler::new(
        config.queue.clone(),
        transformer,
        Arc::clone(&store),
    ));
    info!("Job scheduler started");

    // Create app state and router
    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&scheduler), store));
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown; stop admitting jobs as soon as the
    // signal arrives so requests still in flight get a 503.
    let draining = Arc::clone(&scheduler);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            draining.shutdown();
        })
        .await
        .context("Server error")?;

    // Let admitted jobs finish so their artifacts get released
    info!("Server shutting down...");
    scheduler.shutdown();
    let status = scheduler.status();
    let grace = shutdown_grace(&status, &config);
    info!(
        queued = status.queued_jobs,
        active = status.active_jobs,
        grace_secs = grace.as_secs(),
        "Waiting for admitted jobs"
    );
    if tokio::time::timeout(grace, scheduler.wait_idle()).await.is_err() {
        let cancelled = scheduler.cancel_queued().await;
        warn!(
            cancelled,
            active = scheduler.status().active_jobs,
            "Shutdown grace period elapsed; cancelled queued jobs"
        );
    } else {
        info!("All jobs finished");
    }

    Ok(())
}

/// Worst-case time to drain the admitted jobs.
///
/// Jobs run in rounds of `max_concurrency`; each round can take the full
/// engine timeout plus the pacing delay.
fn shutdown_grace(status: &QueueStatus, config: &Config) -> Duration {
    let pending = status.queued_jobs + status.active_jobs;
    let concurrency = config.queue.max_concurrency.max(1);
    let rounds = pending.div_ceil(concurrency) as u32;
    let per_round =
        Duration::from_secs(config.transformer.timeout_secs) + config.queue.pacing_delay();
    per_round * rounds + SHUTDOWN_GRACE
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
