//! Error types for tracesnoop.

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SnoopError {
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("No active terminal session")]
    NoActiveSession,

    #[error("Session closed: {0}")]
    SessionClosed(Uuid),

    #[error("Process spawn failed: {0}")]
    ProcessSpawnFailed(String),

    #[error("PTY error: {0}")]
    PtyError(String),

    #[error("Snooper {name} failed: {message}")]
    SnooperFailed { name: String, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Channel send error")]
    ChannelSendError,
}
