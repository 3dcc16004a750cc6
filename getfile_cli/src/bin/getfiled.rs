use anyhow::{Context, Result};
use clap::Parser;
use getfile_cli::{init_logging, spawn_responder_log};
use getfile_core::transfer::run_server;
use getfile_core::{AppConfig, AppEvent};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Serve files to getfile clients, one connection at a time.
///
/// Requested paths are opened as given, relative to the working directory.
#[derive(Debug, Parser)]
#[command(name = "getfiled", version)]
struct Cli {
    /// Port to listen on
    port: u16,

    /// Seconds to wait for a client at each step
    #[arg(long)]
    timeout: Option<u64>,

    /// Transfer buffer size in bytes
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // Connection events are the server's main output, so info is the floor
    init_logging(cli.verbose.saturating_add(1));

    let mut config = AppConfig::load();
    if let Some(timeout) = cli.timeout {
        config.protocol.timeout_secs = timeout;
    }
    if let Some(buffer_size) = cli.buffer_size {
        config.protocol.buffer_size = buffer_size;
    }
    config.protocol.validate().context("invalid configuration")?;
    let listener = TcpListener::bind(("0.0.0.0", cli.port))
        .await
        .with_context(|| format!("cannot listen on port {}", cli.port))?;

    let (event_tx, event_rx) = mpsc::channel::<AppEvent>(1000);
    let log = spawn_responder_log(event_rx);

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    run_server(listener, config.protocol, event_tx, shutdown).await?;
    let _ = log.await;
    Ok(())
}
