//! Terminal session descriptors.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a managed terminal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Shell process is running and being snooped.
    Active,
    /// Shell process exited on its own.
    Exited,
    /// Session was closed or replaced.
    Closed,
}

/// Summary of a managed terminal session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: Uuid,
    /// Program the session runs.
    pub shell: String,
    pub status: SessionStatus,
    /// Exit code once the process has exited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<u32>,
}
