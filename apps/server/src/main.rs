//! CardComply server — model-card enrichment and compliance-report
//! generation over HTTP, with retention-managed report downloads.

mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use tokio::signal;
use tracing::info;

use cardcomply_core::{CardClient, CardConfig, RenderConfig};
use cardcomply_enrich::Enricher;
use cardcomply_retention::{RetentionStore, spawn_sweeper};
use cardcomply_shared::{
    AppConfig, EnrichConfig, load_config_from, resolve_data_dir, resolve_public_url,
};

use routes::{AppState, create_router};

/// CardComply — compliance reports from model cards.
#[derive(Parser)]
#[command(
    name = "cardcomply",
    version,
    about = "Enrich model cards and generate compliance report documents.",
    long_about = None,
)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when absent.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind host (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides config).
    #[arg(long)]
    port: Option<u16>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text")]
    log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Initialize tracing based on CLI flags.
fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "cardcomply=info",
        1 => "cardcomply=debug",
        _ => "cardcomply=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => AppConfig::default(),
    };

    let host = cli.host.clone().unwrap_or_else(|| config.server.host.clone());
    let port = cli.port.unwrap_or(config.server.port);

    let data_dir = resolve_data_dir(&config);
    let retention = Duration::from_secs(config.retention.retention_hours * 3600);
    let store = RetentionStore::open(&data_dir, retention)?;

    let sweeper = spawn_sweeper(
        store.clone(),
        Duration::from_secs(config.retention.sweep_interval_secs),
    );
    info!(
        dir = %data_dir.display(),
        retention_hours = config.retention.retention_hours,
        "retention sweeper started"
    );

    let enricher = Enricher::new(EnrichConfig::from(&config))?;

    let state = AppState {
        card: CardClient::new(CardConfig {
            registry_base: "https://huggingface.co".into(),
            timeout_secs: config.enrichment.fetch_timeout_secs,
        })?,
        render: RenderConfig {
            template_path: PathBuf::from(&config.server.template_path),
            public_url: resolve_public_url(&config),
        },
        enricher: Arc::new(enricher),
        store,
        questions_path: PathBuf::from(&config.server.questions_path),
    };

    let app = create_router(state);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| eyre!("invalid bind address {host}:{port}: {e}"))?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("received Ctrl+C");
                }
                _ = wait_for_sigterm() => {
                    info!("received SIGTERM");
                }
            }
            info!("starting graceful shutdown");
        })
        .await?;

    sweeper.abort();
    info!("server shutdown complete");

    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler");
    sigterm.recv().await;
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}
