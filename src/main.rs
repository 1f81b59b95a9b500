//! Clean-Bet API
//!
//! REST API and CLI for horse racing form analysis and predictions.

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cleanbet_api::cli::{self, Cli, Commands};
use cleanbet_api::config::AppConfig;
use cleanbet_api::results::ResultRequest;
use cleanbet_api::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cleanbet_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let mut config = AppConfig::load()?;
    if let Some(db) = cli.db {
        config.database.path = db.to_string_lossy().to_string();
    }

    match cli.command {
        Commands::Serve { host, port } => run_server(config, host, port).await,
        Commands::Analyze {
            date,
            strategy,
            seed,
            top_n,
            format,
        } => cli::run_analyze(&config, date, strategy, seed, top_n, &format),
        Commands::Predictions {
            date,
            region,
            format,
        } => cli::run_predictions(&config, date, region, &format),
        Commands::ImportCard { file, country } => {
            cli::run_import_card(&config, &file, country.as_deref())
        }
        Commands::ImportForms { date, file } => cli::run_import_forms(&config, date, &file),
        Commands::Reconcile {
            date,
            selection_id,
            position,
            price,
        } => cli::run_reconcile(
            &config,
            ResultRequest {
                event_date: date,
                selection_id,
                position,
                price,
            },
        ),
        Commands::Events { date } => cli::run_events(&config, date),
        Commands::SetConfig { key, value } => cli::run_set_config(&config, &key, &value),
    }
}

/// Run the API server.
async fn run_server(
    mut config: AppConfig,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    // Override with CLI args
    if let Some(h) = host {
        config.server.host = h;
    }
    if let Some(p) = port {
        config.server.port = p;
    }

    tracing::info!("Configuration loaded");
    tracing::info!("Database path: {}", config.database.path);

    let context = cli::open_context(&config)?;
    tracing::info!("Tunables loaded: {:?}", context.tunables());

    // Create application state
    let state = Arc::new(AppState {
        context,
        config: config.clone(),
    });

    let app = routes::router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
