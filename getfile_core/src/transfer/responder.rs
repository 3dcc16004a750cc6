use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::engine::TransferEngine;
use super::protocol::{self, AckTag, Request, RequestLine};
use super::utils::{ProgressReporter, path_from_bytes, wire_metadata};
use crate::config::ProtocolConfig;
use crate::error::{SessionError, WaitPoint};
use crate::{AppEvent, FileMetadata};

/// Why the responder refused a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Missing, unreadable, not a regular file, or too large for the size header
    UnknownFile,
    BadCommand,
}

/// How a connection's request loop ended
#[derive(Debug)]
pub enum ConnectionEnd {
    /// Client closed the stream between requests
    PeerClosed,
    /// No request arrived within the timeout
    IdleTimeout,
    /// A negative acknowledgment was sent
    Rejected(RejectReason),
    Failed(SessionError),
}

/// Server side of the protocol for one accepted connection.
///
/// Requested paths are opened verbatim, relative to the working directory; there is no
/// confinement to a served root.
pub struct Responder<S> {
    stream: BufReader<S>,
    peer: String,
    config: ProtocolConfig,
    engine: TransferEngine,
    event_tx: mpsc::Sender<AppEvent>,
}

impl<S> Responder<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        peer: impl Into<String>,
        config: ProtocolConfig,
        event_tx: mpsc::Sender<AppEvent>,
    ) -> Self {
        let engine = TransferEngine::new(config.buffer_size, config.timeout());
        Self {
            stream: BufReader::new(stream),
            peer: peer.into(),
            config,
            engine,
            event_tx,
        }
    }

    /// Serve requests until the connection ends, then close it.
    pub async fn serve(mut self) -> ConnectionEnd {
        let end = self.serve_requests().await;

        match &end {
            ConnectionEnd::PeerClosed => {
                info!("connection closed by party [{}]", self.peer);
            }
            ConnectionEnd::IdleTimeout => {
                info!(
                    "Timeout waiting for data from client [{}]: connection with client will be closed",
                    self.peer
                );
            }
            ConnectionEnd::Rejected(reason) => {
                info!("rejected request from client [{}]: {:?}", self.peer, reason);
            }
            ConnectionEnd::Failed(e) => {
                error!("error with client [{}]: {}", self.peer, e);
                let _ = self
                    .event_tx
                    .send(AppEvent::Error(format!("client [{}]: {}", self.peer, e)))
                    .await;
            }
        }

        if let Err(e) = self.stream.shutdown().await {
            debug!("shutdown failed with client [{}]: {}", self.peer, e);
        }
        end
    }

    async fn serve_requests(&mut self) -> ConnectionEnd {
        let timeout = self.config.timeout();

        loop {
            // AwaitingRequestLine
            let request = match protocol::read_request_line(&mut self.stream, timeout).await {
                Ok(RequestLine::Get(request)) => request,
                Ok(RequestLine::BadCommand(detail)) => {
                    warn!("illegal command from client [{}]: {}", self.peer, detail);
                    return self.reject(RejectReason::BadCommand).await;
                }
                Ok(RequestLine::Closed) => return ConnectionEnd::PeerClosed,
                Err(e) if e.is_timeout() => return ConnectionEnd::IdleTimeout,
                Err(e) => return ConnectionEnd::Failed(e),
            };

            info!(
                "received string '{}' from client [{}]",
                request.display_name(),
                self.peer
            );

            // Validating
            let Some((file, metadata)) = self.open_requested(&request).await else {
                return self.reject(RejectReason::UnknownFile).await;
            };

            // Serving
            if let Err(e) = self.serve_file(&request, file, metadata).await {
                return ConnectionEnd::Failed(e);
            }
        }
    }

    /// Open the requested path and capture its size and modification time.
    async fn open_requested(&self, request: &Request) -> Option<(File, FileMetadata)> {
        let path = path_from_bytes(&request.filename);
        let name = request.display_name();

        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) => {
                warn!(
                    "cannot open '{}' for client [{}]: {}",
                    name, self.peer, e
                );
                return None;
            }
        };

        let metadata = match file.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(
                    "stat of '{}' failed for client [{}]: {}",
                    name, self.peer, e
                );
                return None;
            }
        };

        if !metadata.is_file() {
            warn!(
                "'{}' requested by client [{}] is not a regular file",
                name, self.peer
            );
            return None;
        }

        match wire_metadata(&metadata) {
            Some(wire) => Some((file, wire)),
            None => {
                warn!(
                    "'{}' requested by client [{}] is too large ({} bytes)",
                    name,
                    self.peer,
                    metadata.len()
                );
                None
            }
        }
    }

    async fn serve_file(
        &mut self,
        request: &Request,
        mut file: File,
        metadata: FileMetadata,
    ) -> Result<(), SessionError> {
        protocol::write_ack(&mut self.stream, AckTag::Positive).await?;
        protocol::write_u32(&mut self.stream, metadata.size).await?;

        let name = request.display_name();
        let mut reporter = ProgressReporter::new(&self.event_tx, &name, true);
        self.engine
            .copy_stream(&mut file, &mut self.stream, metadata.size, &mut reporter)
            .await
            .map_err(|e| SessionError::from_transfer(e, WaitPoint::Body))?;
        drop(file);

        protocol::write_u32(&mut self.stream, metadata.modified_at).await?;
        self.stream.flush().await?;

        info!(
            "sent file '{}' to client [{}] ({} bytes)",
            name, self.peer, metadata.size
        );
        let _ = self
            .event_tx
            .send(AppEvent::TransferCompleted {
                file_name: name.into_owned(),
                size: metadata.size,
                modified_at: metadata.modified_at,
                is_sending: true,
            })
            .await;
        Ok(())
    }

    async fn reject(&mut self, reason: RejectReason) -> ConnectionEnd {
        if let Err(e) = protocol::write_ack(&mut self.stream, AckTag::Negative).await {
            warn!(
                "sending rejection to client [{}] failed: {}",
                self.peer, e
            );
        }
        ConnectionEnd::Rejected(reason)
    }
}
