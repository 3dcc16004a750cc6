use anyhow::Result;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::responder::Responder;
use crate::AppEvent;
use crate::config::ProtocolConfig;

/// Pause after a failed accept so a persistent error does not spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Run the sequential accept loop.
///
/// Each connection is served to completion before the next one is accepted. `shutdown` is
/// observed between connections only.
pub async fn run_server(
    listener: TcpListener,
    config: ProtocolConfig,
    event_tx: mpsc::Sender<AppEvent>,
    shutdown: CancellationToken,
) -> Result<()> {
    info!("Listening on {}", listener.local_addr()?);

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown requested, no longer accepting connections");
                break;
            }
            accepted = listener.accept() => accepted,
        };

        let (stream, peer_addr) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                error!("accept() failed: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        info!("accepted connection from client [{}]", peer_addr);
        let _ = event_tx
            .send(AppEvent::Status(format!("Connection from: {}", peer_addr)))
            .await;

        let responder = Responder::new(
            stream,
            peer_addr.to_string(),
            config.clone(),
            event_tx.clone(),
        );
        let end = responder.serve().await;
        info!("connection with client [{}] finished: {:?}", peer_addr, end);
    }

    Ok(())
}
