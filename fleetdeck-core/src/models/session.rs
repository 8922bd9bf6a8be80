//! Summary records written when a terminal session or command finishes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Usage summary of one interactive terminal session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSession {
    /// Session identifier
    pub id: Uuid,
    /// Host the terminal was attached to
    pub host_id: Uuid,
    /// Shell start
    pub started_at: DateTime<Utc>,
    /// Session end (stdout EOF or error)
    pub ended_at: DateTime<Utc>,
    /// Whole seconds between start and end
    pub duration_seconds: u64,
    /// Carriage-return terminated text frames; a coarse heuristic
    pub commands_executed: u64,
    /// Bytes in both directions
    pub bytes_transferred: u64,
}

/// Result of a one-shot command execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Record identifier
    pub id: Uuid,
    /// Host the command ran on
    pub host_id: Uuid,
    /// Command line as submitted
    pub command: String,
    /// Stdout followed by stderr
    pub output: String,
    /// Remote exit status, -1 when none was reported
    pub exit_code: i32,
    /// When execution started
    pub executed_at: DateTime<Utc>,
    /// Wall-clock duration
    pub duration_ms: u64,
}
