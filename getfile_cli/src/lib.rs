//! Shared plumbing for the `getfile` and `getfiled` binaries: logging setup and event display.

use getfile_core::AppEvent;
use std::io::Write;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

/// Install the tracing subscriber.
///
/// `verbosity` counts `-v` flags: 0=warn, 1=info, 2=debug, 3+=trace. `RUST_LOG` wins when set.
pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "getfile_core={},getfile_cli={},getfile={},getfiled={}",
            level, level, level, level
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Print events for an interactive requester.
///
/// Progress is redrawn in place; completions print the file's name, size and timestamp.
pub fn spawn_requester_display(mut event_rx: mpsc::Receiver<AppEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(event) = event_rx.recv().await {
            match event {
                AppEvent::TransferProgress { percent, .. } => {
                    let _ = write!(stdout, "\rDownloading: {}%     ", percent);
                    let _ = stdout.flush();
                }
                AppEvent::TransferCompleted {
                    file_name,
                    size,
                    modified_at,
                    ..
                } => {
                    let _ = writeln!(
                        stdout,
                        "\nReceived file {}\nReceived file size {}\nReceived file timestamp {}",
                        file_name, size, modified_at
                    );
                }
                AppEvent::Status(message) => tracing::info!("{}", message),
                AppEvent::Error(message) => {
                    let _ = writeln!(stdout);
                    eprintln!("error - {}", message);
                }
            }
        }
    })
}

/// Log events from the responder; progress is only traced at debug level.
pub fn spawn_responder_log(mut event_rx: mpsc::Receiver<AppEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                AppEvent::TransferProgress {
                    file_name,
                    percent,
                    ..
                } => tracing::debug!("sending '{}': {}%", file_name, percent),
                AppEvent::TransferCompleted {
                    file_name, size, ..
                } => tracing::debug!("completed '{}' ({} bytes)", file_name, size),
                AppEvent::Status(message) => tracing::debug!("{}", message),
                AppEvent::Error(message) => tracing::warn!("{}", message),
            }
        }
    })
}
