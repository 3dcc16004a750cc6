//! Request/response file transfer over a TCP byte stream.
//!
//! This module provides:
//! - Wire framing for request lines, acknowledgments and the size/timestamp words
//! - A chunked, direction-agnostic copy engine with stall detection
//! - The requester (client) and responder (server) session state machines
//! - A sequential accept loop that serves one connection at a time

pub mod constants;
pub mod engine;
pub mod protocol;
pub mod requester;
pub mod responder;
pub mod server;
pub mod utils;

// Re-export public API
pub use engine::{Progress, ProgressObserver, TransferEngine, TransferSession};
pub use protocol::{AckTag, Request};
pub use requester::{Requester, fetch_files};
pub use responder::{ConnectionEnd, RejectReason, Responder};
pub use server::run_server;
