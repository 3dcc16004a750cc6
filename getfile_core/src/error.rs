//! Error types for the transfer engine and the request/response sessions.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Point in the protocol where a side was waiting for the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPoint {
    Connect,
    Ack,
    SizeHeader,
    Body,
    Trailer,
    RequestLine,
}

impl fmt::Display for WaitPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WaitPoint::Connect => "connection",
            WaitPoint::Ack => "acknowledgment",
            WaitPoint::SizeHeader => "size header",
            WaitPoint::Body => "file data",
            WaitPoint::Trailer => "timestamp trailer",
            WaitPoint::RequestLine => "request line",
        };
        f.write_str(name)
    }
}

/// Failures of a single chunked copy.
#[derive(Debug, Error)]
pub enum TransferError {
    /// An iteration made no progress: the source stopped delivering bytes.
    #[error("peer stalled with {remaining} of {total} bytes still to transfer")]
    PeerStalled { remaining: u32, total: u32 },

    /// No data arrived within the read bound.
    #[error("no data within {}s", timeout.as_secs())]
    Timeout { timeout: Duration },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Everything that can end a requester run or a responder connection.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("timeout waiting for {phase} after {}s", timeout.as_secs())]
    Timeout { phase: WaitPoint, timeout: Duration },

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("peer stalled with {remaining} of {total} bytes still to transfer")]
    PeerStalled { remaining: u32, total: u32 },

    #[error("{}: {source}", path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The server answered a request with the negative acknowledgment.
    #[error("server rejected request for '{filename}'")]
    RemoteRejection { filename: String },

    #[error("connection closed by peer")]
    PeerClosed,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SessionError {
    /// Attach the wait point to an engine failure.
    pub fn from_transfer(err: TransferError, phase: WaitPoint) -> Self {
        match err {
            TransferError::PeerStalled { remaining, total } => {
                SessionError::PeerStalled { remaining, total }
            }
            TransferError::Timeout { timeout } => SessionError::Timeout { phase, timeout },
            TransferError::Io(e) => SessionError::Io(e),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SessionError::Timeout { .. })
    }
}
