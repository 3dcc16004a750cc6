use crate::transfer::engine::{Progress, ProgressObserver};
use crate::{AppEvent, FileMetadata};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs::{File, OpenOptions};
use tokio::sync::mpsc;

/// Local name for a requested file: everything after the last `/`.
///
/// Returns `None` when nothing is left (a request ending in `/`).
pub fn local_file_name(requested: &[u8]) -> Option<&[u8]> {
    let base = match requested.iter().rposition(|&b| b == b'/') {
        Some(idx) => &requested[idx + 1..],
        None => requested,
    };
    if base.is_empty() { None } else { Some(base) }
}

/// Filesystem path for a filename received as raw bytes
#[cfg(unix)]
pub fn path_from_bytes(name: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(name))
}

/// Filesystem path for a filename received as raw bytes
#[cfg(not(unix))]
pub fn path_from_bytes(name: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(name).into_owned())
}

/// Capture wire metadata for a file.
///
/// Returns `None` when the size does not fit the 32-bit header. Modification times before the
/// epoch become 0, later than `u32::MAX` seconds saturate.
pub fn wire_metadata(metadata: &Metadata) -> Option<FileMetadata> {
    let size = u32::try_from(metadata.len()).ok()?;
    let modified_at = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX))
        .unwrap_or(0);
    Some(FileMetadata { size, modified_at })
}

/// Open a destination file for writing, truncating any previous content
pub async fn open_destination(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o644);
    options.open(path).await
}

/// Forwards engine progress to the event channel.
///
/// Progress is lossy: when the channel is full the update is dropped, since a later one
/// supersedes it.
pub struct ProgressReporter<'a> {
    event_tx: &'a mpsc::Sender<AppEvent>,
    file_name: &'a str,
    is_sending: bool,
    last_percent: Option<u8>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(event_tx: &'a mpsc::Sender<AppEvent>, file_name: &'a str, is_sending: bool) -> Self {
        Self {
            event_tx,
            file_name,
            is_sending,
            last_percent: None,
        }
    }
}

impl ProgressObserver for ProgressReporter<'_> {
    fn on_progress(&mut self, progress: Progress) {
        let percent = progress.percent_complete();
        if self.last_percent == Some(percent) && percent != 100 {
            return;
        }
        self.last_percent = Some(percent);

        let _ = self.event_tx.try_send(AppEvent::TransferProgress {
            file_name: self.file_name.to_string(),
            percent,
            bytes_done: u64::from(progress.bytes_done()),
            total_bytes: u64::from(progress.total),
            is_sending: self.is_sending,
        });
    }
}
