//! Error types shared by the session engine and the client.

use crate::presence::PeerId;
use thiserror::Error;

/// Errors raised while handling a frame.
///
/// None of these are fatal: the session boundary logs them and drops the
/// offending frame.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Malformed event: {0}")]
    Malformed(String),
    #[error("Protocol error: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("Unknown peer: {0}")]
    UnknownPeer(PeerId),
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type for session and client operations.
pub type SyncResult<T> = Result<T, SyncError>;
