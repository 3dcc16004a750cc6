/// Buffer size for each transferred chunk (4KB)
pub const BUFFER_SIZE: usize = 4096;

/// Bound on every wait for the peer, in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Longest request line the responder accepts, terminator included
pub const MAX_REQUEST_LINE: usize = 4096;
