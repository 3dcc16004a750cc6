use anyhow::{Context, Result};
use clap::Parser;
use getfile_cli::{init_logging, spawn_requester_display};
use getfile_core::transfer::fetch_files;
use getfile_core::{AppConfig, AppEvent};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Request files from a getfiled server and save them in the current directory
#[derive(Debug, Parser)]
#[command(name = "getfile", version)]
struct Cli {
    /// Server host name or address
    host: String,

    /// Server port
    port: u16,

    /// Files to request, in order
    #[arg(required = true)]
    filenames: Vec<String>,

    /// Seconds to wait for the server at each step
    #[arg(long)]
    timeout: Option<u64>,

    /// Transfer buffer size in bytes
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Directory to write received files into
    #[arg(long, short = 'o')]
    output_dir: Option<PathBuf>,

    /// Persist the effective timeout, buffer size and output directory as the new defaults
    #[arg(long)]
    save_config: bool,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = AppConfig::load();
    if let Some(timeout) = cli.timeout {
        config.protocol.timeout_secs = timeout;
    }
    if let Some(buffer_size) = cli.buffer_size {
        config.protocol.buffer_size = buffer_size;
    }
    if let Some(dir) = cli.output_dir {
        config.download_path = dir;
    }
    config.protocol.validate().context("invalid configuration")?;
    if cli.save_config {
        config.save().context("failed to save configuration")?;
    }

    let (event_tx, event_rx) = mpsc::channel::<AppEvent>(1000);
    let display = spawn_requester_display(event_rx);

    let result = fetch_files(
        &cli.host,
        cli.port,
        cli.filenames.as_slice(),
        &config,
        event_tx,
    )
    .await;
    let _ = display.await;

    let received =
        result.with_context(|| format!("transfer from {}:{} aborted", cli.host, cli.port))?;
    tracing::info!("{} file(s) received", received.len());
    Ok(())
}
