use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use devicegate::admin::AdminInterface;
use devicegate::config::GateConfig;
use devicegate::http::{AppState, HttpServer};
use devicegate::identity::IdentityResolver;
use devicegate::ratelimit::{AdmissionPolicy, CounterBackend, CounterStore, CounterSweeper};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

/// Device-aware admission control service.
#[derive(Debug, Parser)]
#[command(name = "devicegate", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!("Starting devicegate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = GateConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.server.bind_addr = bind;
    }
    info!(
        bind_addr = %config.server.bind_addr,
        window_ms = config.admission.window_ms,
        max_requests = config.admission.max_requests,
        require_device_id = config.admission.require_device_id,
        fallback_to_ip = config.admission.fallback_to_ip,
        trust_proxy = config.admission.trust_proxy,
        "Configuration loaded"
    );

    // One store for the whole process, shared by policy, admin and sweeper
    let store: Arc<dyn CounterBackend> = Arc::new(CounterStore::new(config.admission.window())?);
    let sweeper = CounterSweeper::start(store.clone(), config.sweep.interval())?;

    let resolver = IdentityResolver::new(config.denylist.clone());
    let preferred_header = config
        .admission
        .device_id_header_names
        .first()
        .cloned()
        .unwrap_or_default();
    let admin = AdminInterface::new(
        store.clone(),
        resolver.clone(),
        config.admission.max_requests,
        preferred_header,
    );
    let policy = AdmissionPolicy::new(config.admission.clone(), resolver, store)?;

    if config.server.admin_token.is_none() {
        info!("No admin token configured; device reset endpoint is disabled");
    }

    let state = AppState::new(
        Arc::new(policy),
        Arc::new(admin),
        config.server.admin_token.clone(),
    );
    let server = HttpServer::new(config.server.bind_addr, state);

    let served = server.serve_with_shutdown(shutdown_signal()).await;

    sweeper.stop().await;
    served?;

    info!("devicegate stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
