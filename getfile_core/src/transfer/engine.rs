//! Chunked copy of a known number of bytes between two byte streams.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::TransferError;

/// Snapshot of a session after a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub total: u32,
    pub remaining: u32,
}

impl Progress {
    pub fn bytes_done(&self) -> u32 {
        self.total - self.remaining
    }

    /// Integer percentage; an empty transfer is reported as complete
    pub fn percent_complete(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (u64::from(self.bytes_done()) * 100 / u64::from(self.total)) as u8
    }
}

/// Receives a progress snapshot after every productive chunk
pub trait ProgressObserver {
    fn on_progress(&mut self, progress: Progress);
}

impl<F> ProgressObserver for F
where
    F: FnMut(Progress),
{
    fn on_progress(&mut self, progress: Progress) {
        self(progress)
    }
}

/// Per-transfer bookkeeping: bytes left and the count seen at the previous chunk
#[derive(Debug, Clone)]
pub struct TransferSession {
    total: u32,
    remaining: u32,
    last_remaining: Option<u32>,
}

impl TransferSession {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            remaining: total,
            last_remaining: None,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    pub fn progress(&self) -> Progress {
        Progress {
            total: self.total,
            remaining: self.remaining,
        }
    }

    /// Start a chunk and return how many bytes it may move.
    ///
    /// Fails if the previous chunk left `remaining` unchanged.
    pub fn begin_chunk(&mut self, buffer_len: usize) -> Result<usize, TransferError> {
        if self.last_remaining == Some(self.remaining) {
            return Err(TransferError::PeerStalled {
                remaining: self.remaining,
                total: self.total,
            });
        }
        self.last_remaining = Some(self.remaining);
        Ok(buffer_len.min(self.remaining as usize))
    }

    /// Account for `n` bytes moved.
    ///
    /// # Panics
    /// If `n` exceeds the bytes remaining; the count must never wrap.
    pub fn consume(&mut self, n: usize) {
        let n = u32::try_from(n).ok().filter(|&n| n <= self.remaining);
        match n {
            Some(n) => self.remaining -= n,
            None => panic!(
                "transfer overrun: consumed more than the {} bytes remaining",
                self.remaining
            ),
        }
    }
}

/// Moves exactly `total` bytes from a source to a sink through an owned buffer
pub struct TransferEngine {
    buffer: Vec<u8>,
    read_timeout: Duration,
}

impl TransferEngine {
    pub fn new(buffer_size: usize, read_timeout: Duration) -> Self {
        Self {
            buffer: vec![0u8; buffer_size.max(1)],
            read_timeout,
        }
    }

    /// Copy `total` bytes from `source` to `sink`.
    ///
    /// Each read is bounded by the engine's timeout. A read returning zero bytes before the
    /// transfer completes makes the next iteration fail with [`TransferError::PeerStalled`].
    pub async fn copy_stream<R, W, O>(
        &mut self,
        source: &mut R,
        sink: &mut W,
        total: u32,
        observer: &mut O,
    ) -> Result<(), TransferError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        O: ProgressObserver + ?Sized,
    {
        let mut session = TransferSession::new(total);

        if session.is_complete() {
            observer.on_progress(session.progress());
            return Ok(());
        }

        while !session.is_complete() {
            let chunk_len = session.begin_chunk(self.buffer.len())?;
            let chunk = &mut self.buffer[..chunk_len];

            let n = match tokio::time::timeout(self.read_timeout, source.read(chunk)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(TransferError::Timeout {
                        timeout: self.read_timeout,
                    });
                }
            };

            if n == 0 {
                debug!(
                    "Source returned 0 bytes with {}/{} remaining",
                    session.remaining(),
                    total
                );
                continue;
            }

            sink.write_all(&chunk[..n]).await?;
            session.consume(n);
            observer.on_progress(session.progress());
        }

        sink.flush().await?;
        Ok(())
    }
}
