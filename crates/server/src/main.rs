use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use tessera_modeler::{
    ExecutionGate, LimitSink, Modeler, QuotaPropagator, RealmRegistry, RealmStore, StateLimitSink,
    StatsAccessor,
};
use tessera_server::api::AppState;
use tessera_server::config::TesseraConfig;

/// Tessera quota modeling server.
#[derive(Parser, Debug)]
#[command(name = "tessera", about = "Quota modeling server for verification realms")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "tessera.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration from the TOML file, or use defaults if the file
    // does not exist.
    let config: TesseraConfig = if Path::new(&cli.config).exists() {
        let contents = std::fs::read_to_string(&cli.config)?;
        toml::from_str(&contents)?
    } else {
        toml::from_str("")?
    };

    // Tracing comes up after the config is read so we know whether OTel is
    // enabled, but before any tracing calls.
    let telemetry_guard = tessera_server::telemetry::init(&config.telemetry);

    if !Path::new(&cli.config).exists() {
        info!(path = %cli.config, "config file not found, using defaults");
    }

    let store = tessera_server::state_factory::create_state(&config.state)?;
    info!(backend = %config.state.backend, "state backend initialized");

    let modeler_config = config.modeler.to_modeler_config();
    let registry = Arc::new(RealmRegistry::new(
        Arc::clone(&store),
        modeler_config.history_scan_days,
    ));

    let gate = ExecutionGate::new(Arc::clone(&store));
    let sink = Arc::new(StateLimitSink::new(Arc::clone(&store)));
    let propagator = QuotaPropagator::new(
        Arc::clone(&registry) as Arc<dyn RealmStore>,
        sink as Arc<dyn LimitSink>,
    );
    let modeler = Modeler::new(
        modeler_config,
        gate,
        Arc::clone(&registry) as Arc<dyn RealmStore>,
        Arc::clone(&registry) as Arc<dyn StatsAccessor>,
        propagator,
    );

    if config.retention.enabled {
        tessera_server::retention::spawn(Arc::clone(&registry), &config.retention);
        info!(
            retention_days = config.retention.stats_retention_days,
            "stats retention sweeper started"
        );
    }

    let state = AppState {
        modeler: Arc::new(modeler),
    };
    let app = tessera_server::api::router(state);

    // Resolve the bind address (CLI overrides take precedence).
    let host = cli.host.unwrap_or(config.server.host);
    let port = cli.port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "tessera listening");

    // Serve with graceful shutdown on SIGINT / SIGTERM.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Flush pending OpenTelemetry spans before exit.
    telemetry_guard.shutdown();

    info!("tessera shut down");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
