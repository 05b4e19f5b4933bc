//! Paisa service - conversational expense tracker
//!
//! Usage:
//!   paisa --port 8000          Start the health endpoint and chat loop
//!
//! The chat loop reads statements line by line ("spent 500 on groceries at
//! DMart") and slash commands (/summary, /report week, /lend ...). A real
//! chat transport and a durable ledger store plug in through the
//! `ChatTransport` and `LedgerStore` capabilities in paisa-core.

mod chat;
mod routes;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use paisa_core::{AppConfig, FilePreferenceStore, MemoryLedger, Recorder};

/// Paisa - track spending by talking about it
#[derive(Parser)]
#[command(name = "paisa")]
#[command(about = "Conversational expense tracker", long_about = None)]
#[command(version)]
struct Cli {
    /// Health endpoint port
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Health endpoint bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Keep preferences in memory instead of the platform data directory
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = AppConfig::from_env().context("reading configuration")?;
    let chain = config.build_chain().context("building provider chain")?;

    let prefs: Arc<dyn paisa_core::PreferenceStore> = if cli.ephemeral {
        Arc::new(paisa_core::MemoryPreferenceStore::new())
    } else {
        Arc::new(FilePreferenceStore::default_location().context("locating preference store")?)
    };

    let recorder = Arc::new(Recorder::new(
        chain,
        Arc::new(MemoryLedger::new()),
        prefs,
        config.analytics,
    ));

    // Health endpoint runs alongside the chat loop
    let listener = tokio::net::TcpListener::bind((cli.host.as_str(), cli.port))
        .await
        .with_context(|| format!("binding {}:{}", cli.host, cli.port))?;
    info!(host = %cli.host, port = cli.port, "Health endpoint listening");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, routes::router()).await {
            tracing::error!(error = %e, "Health endpoint stopped");
        }
    });

    info!("Chat loop ready; type a statement or /help");
    chat::run_stdio_loop(recorder).await
}
