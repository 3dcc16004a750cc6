use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::engine::TransferEngine;
use super::protocol::{self, AckTag, Request};
use super::utils::{ProgressReporter, local_file_name, open_destination, path_from_bytes};
use crate::config::{AppConfig, ProtocolConfig};
use crate::error::{SessionError, WaitPoint};
use crate::{AppEvent, FileMetadata, ReceivedFile};

/// Client side of the protocol: requests files one at a time over a single connection
pub struct Requester<S> {
    stream: BufReader<S>,
    peer: String,
    config: ProtocolConfig,
    engine: TransferEngine,
    download_dir: PathBuf,
    event_tx: mpsc::Sender<AppEvent>,
}

impl Requester<TcpStream> {
    /// Connect to `host:port`, bounded by the protocol timeout
    pub async fn connect(
        host: &str,
        port: u16,
        config: ProtocolConfig,
        download_dir: PathBuf,
        event_tx: mpsc::Sender<AppEvent>,
    ) -> Result<Self, SessionError> {
        info!("Connecting to {}:{}...", host, port);
        let stream = protocol::io_within(
            config.timeout(),
            WaitPoint::Connect,
            TcpStream::connect((host, port)),
        )
        .await?;

        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| format!("{}:{}", host, port));
        info!("Connected to {}", peer);

        Ok(Self::new(stream, peer, config, download_dir, event_tx))
    }
}

impl<S> Requester<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        peer: impl Into<String>,
        config: ProtocolConfig,
        download_dir: PathBuf,
        event_tx: mpsc::Sender<AppEvent>,
    ) -> Self {
        let engine = TransferEngine::new(config.buffer_size, config.timeout());
        Self {
            stream: BufReader::new(stream),
            peer: peer.into(),
            config,
            engine,
            download_dir,
            event_tx,
        }
    }

    /// Request every file in order, stopping at the first failure.
    ///
    /// Any error ends the run: after a rejection the server has already closed the connection,
    /// and after a timeout or stall the framing can no longer be trusted.
    pub async fn request_all<I, N>(&mut self, filenames: I) -> Result<Vec<ReceivedFile>, SessionError>
    where
        I: IntoIterator<Item = N>,
        N: AsRef<[u8]>,
    {
        let mut received = Vec::new();
        for filename in filenames {
            received.push(self.request_file(filename).await?);
        }
        Ok(received)
    }

    /// Run one full request cycle: request line, ack, size, body, trailer.
    ///
    /// The filename is sent as raw bytes.
    pub async fn request_file(
        &mut self,
        filename: impl AsRef<[u8]>,
    ) -> Result<ReceivedFile, SessionError> {
        let filename = filename.as_ref();
        match self.fetch(filename).await {
            Ok(file) => Ok(file),
            Err(e) => {
                let filename = String::from_utf8_lossy(filename);
                error!("Request for '{}' from {} failed: {}", filename, self.peer, e);
                let _ = self
                    .event_tx
                    .send(AppEvent::Error(format!("{} [{}]: {}", filename, self.peer, e)))
                    .await;
                Err(e)
            }
        }
    }

    async fn fetch(&mut self, filename: &[u8]) -> Result<ReceivedFile, SessionError> {
        let request = Request::new(filename)?;
        let display_name = request.display_name();
        let local_name = local_file_name(&request.filename).ok_or_else(|| {
            SessionError::InvalidRequest(format!(
                "'{}' has no file name component",
                display_name
            ))
        })?;
        let local_display = String::from_utf8_lossy(local_name);
        let timeout = self.config.timeout();

        // Idle -> AwaitingAck
        debug!("Sending request for '{}' to {}", display_name, self.peer);
        protocol::write_request(&mut self.stream, &request).await?;

        match protocol::read_ack(&mut self.stream, timeout).await? {
            AckTag::Positive => {}
            AckTag::Negative => {
                return Err(SessionError::RemoteRejection {
                    filename: display_name.into_owned(),
                });
            }
        }

        // ReceivingHeader
        let size =
            protocol::read_u32_within(&mut self.stream, timeout, WaitPoint::SizeHeader).await?;
        let local_path = self.download_dir.join(path_from_bytes(local_name));
        let mut file =
            open_destination(&local_path)
                .await
                .map_err(|source| SessionError::Resource {
                    path: local_path.clone(),
                    source,
                })?;

        info!(
            "Receiving '{}' ({} bytes) into {}",
            display_name,
            size,
            local_path.display()
        );
        let _ = self
            .event_tx
            .send(AppEvent::Status(format!(
                "Receiving: {} ({} bytes)",
                local_display, size
            )))
            .await;

        // ReceivingBody
        let mut reporter = ProgressReporter::new(&self.event_tx, &local_display, false);
        let copied = self
            .engine
            .copy_stream(&mut self.stream, &mut file, size, &mut reporter)
            .await;
        if let Err(e) = copied {
            let _ = file.flush().await;
            return Err(SessionError::from_transfer(e, WaitPoint::Body));
        }
        drop(file);

        // ReceivingTrailer
        let modified_at =
            protocol::read_u32_within(&mut self.stream, timeout, WaitPoint::Trailer).await?;
        let metadata = FileMetadata { size, modified_at };

        info!(
            "Received file {} ({} bytes, timestamp {})",
            local_display, size, modified_at
        );
        let _ = self
            .event_tx
            .send(AppEvent::TransferCompleted {
                file_name: local_display.to_string(),
                size,
                modified_at,
                is_sending: false,
            })
            .await;

        Ok(ReceivedFile {
            requested: request.filename.clone(),
            local_path,
            metadata,
        })
    }

    /// Close the write half so the server sees an orderly end of requests
    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.stream.shutdown().await
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }
}

/// Connect to a server and fetch `filenames` in order
pub async fn fetch_files<N>(
    host: &str,
    port: u16,
    filenames: &[N],
    config: &AppConfig,
    event_tx: mpsc::Sender<AppEvent>,
) -> anyhow::Result<Vec<ReceivedFile>>
where
    N: AsRef<[u8]>,
{
    let mut requester = Requester::connect(
        host,
        port,
        config.protocol.clone(),
        config.download_path.clone(),
        event_tx,
    )
    .await?;

    let result = requester.request_all(filenames).await;
    if let Err(e) = requester.shutdown().await {
        debug!("Shutdown of connection to {} failed: {}", requester.peer(), e);
    }
    Ok(result?)
}
