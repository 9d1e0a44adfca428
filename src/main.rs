//! Game of Death - orchestrator CLI
//!
//! Runs the phase loop against the ledger and serves the query API.

#![warn(missing_docs)]

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, RecordsAction};
use game_of_death::{
    AppState, EventBus, GameConfig, PhaseScheduler, RecordStore, SchedulerParts, SnapshotFile,
    TxPipeline, router,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,game_of_death=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, host, port } => run_server(config, host, port).await,
        Command::Records { config, action } => run_records(&config, action).await,
    }
}

/// Runs the tick driver and the HTTP server until Ctrl-C.
#[instrument(skip_all, fields(config = %config_path.display()))]
async fn run_server(config_path: PathBuf, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = GameConfig::load(&config_path)?;
    let mut server = config.server().clone();
    if let Some(host) = host {
        server = server.with_host(host);
    }
    if let Some(port) = port {
        server = server.with_port(port);
    }
    config = config.with_server(server);
    info!(?config, "Starting Game of Death orchestrator");

    let ledger = config.ledger().connect();
    let pipeline = TxPipeline::spawn(Arc::clone(&ledger));
    let records = Arc::new(RecordStore::open(config.storage().records_path()).await);
    let events = EventBus::new(*config.server().event_buffer());

    let scheduler = Arc::new(
        PhaseScheduler::restore(SchedulerParts {
            timing: config.timing().clone(),
            ledger: Arc::clone(&ledger),
            pipeline,
            records: Arc::clone(&records),
            events: events.clone(),
            snapshot: SnapshotFile::new(config.storage().snapshot_path().clone()),
            thumbnail_base_url: config.storage().thumbnail_base_url().clone(),
        })
        .await,
    );
    let ticks = Arc::clone(&scheduler).run_ticks();

    let app = router(AppState::new(scheduler, records, ledger, events));
    let address = (config.server().host().as_str(), *config.server().port());
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {}:{}", address.0, address.1))?;
    info!(
        "Server ready at http://{}:{}/",
        config.server().host(),
        config.server().port()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown requested");
        })
        .await?;

    ticks.abort();
    info!("Server stopped");
    Ok(())
}

/// Prints records from the record file as JSON.
#[instrument(skip(action))]
async fn run_records(config_path: &Path, action: RecordsAction) -> Result<()> {
    let config = GameConfig::load(config_path)?;
    let store = RecordStore::open(config.storage().records_path()).await;

    let output = match action {
        RecordsAction::List { participant } => {
            let records = match participant {
                Some(account) => store.list_by_participant(&account).await,
                None => store.list_all().await,
            };
            serde_json::to_string_pretty(&records)?
        }
        RecordsAction::Show { id } => serde_json::to_string_pretty(&store.get(id).await?)?,
    };
    println!("{}", output);
    Ok(())
}
