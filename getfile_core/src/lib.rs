use std::path::PathBuf;

pub mod config;
pub mod error;
pub mod transfer;

pub use config::{AppConfig, ProtocolConfig};
pub use error::{SessionError, TransferError};

/// Size and modification time of a served file, as carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    pub size: u32,
    /// Seconds since the UNIX epoch
    pub modified_at: u32,
}

/// A file fetched successfully by the requester
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    /// Name exactly as it was requested from the server
    pub requested: Vec<u8>,
    pub local_path: PathBuf,
    pub metadata: FileMetadata,
}

//Struct report from Core to the binaries
#[derive(Debug, Clone)]
pub enum AppEvent {
    Status(String),

    TransferProgress {
        file_name: String,
        percent: u8,
        bytes_done: u64,
        total_bytes: u64,
        is_sending: bool,
    },

    /// Whole file moved, trailer exchanged
    TransferCompleted {
        file_name: String,
        size: u32,
        modified_at: u32,
        is_sending: bool,
    },

    Error(String),
}
