//! Action data model.
//!
//! An [`ActionDescriptor`] is the parsed, immutable unit of work emitted by
//! the response parser. An [`ActionRecord`] wraps it with the runtime state
//! the engine tracks: status, dispatch flag, cancellation token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// ActionDescriptor
// ---------------------------------------------------------------------------

/// One file shipped inside an [`ActionDescriptor::Import`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportFile {
    /// Path relative to the import's `target_path`.
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionDescriptor {
    /// Run a command through the sandbox shell.
    Shell { command: String },
    /// Write one file. `path` is absolute or relative to the sandbox workdir.
    File { path: String, content: String },
    /// Write a batch of files under `target_path`, then run `post_commands`.
    Import {
        target_path: String,
        files: Vec<ImportFile>,
        #[serde(default)]
        post_commands: Vec<String>,
    },
}

impl ActionDescriptor {
    pub fn kind(&self) -> &'static str {
        match self {
            ActionDescriptor::Shell { .. } => "shell",
            ActionDescriptor::File { .. } => "file",
            ActionDescriptor::Import { .. } => "import",
        }
    }

    /// Short human-readable summary used in logs and CLI output.
    pub fn summary(&self) -> String {
        match self {
            ActionDescriptor::Shell { command } => command.clone(),
            ActionDescriptor::File { path, .. } => path.clone(),
            ActionDescriptor::Import {
                target_path, files, ..
            } => format!("{} file(s) into {target_path}", files.len()),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of an action.
///
/// Transitions: `Pending → Running → Complete | Aborted | Failed`, plus
/// `Pending → Aborted` when an action is cancelled before it executes.
/// Terminal states never change again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Running,
    Complete,
    Aborted,
    Failed { reason: String },
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Complete | ActionStatus::Aborted | ActionStatus::Failed { .. }
        )
    }

    /// Whether moving from `self` to `next` is a legal step.
    ///
    /// `Running → Running` is accepted: the add-time mark and the
    /// execution-time mark may both land on the same action.
    pub fn can_transition_to(&self, next: &ActionStatus) -> bool {
        use ActionStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Aborted)
                | (Running, Running)
                | (Running, Complete)
                | (Running, Aborted)
                | (Running, Failed { .. })
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Running => "running",
            ActionStatus::Complete => "complete",
            ActionStatus::Aborted => "aborted",
            ActionStatus::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStatus::Failed { reason } => write!(f, "failed: {reason}"),
            other => f.write_str(other.as_str()),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionRecord
// ---------------------------------------------------------------------------

/// Runtime wrapper around a descriptor. Owned by the action store.
#[derive(Debug, Clone)]
pub struct ActionRecord {
    pub descriptor: ActionDescriptor,
    pub status: ActionStatus,
    /// Set once execution has been enqueued; freezes `descriptor`.
    pub executed: bool,
    pub cancel: CancellationToken,
    /// Registration order within the owning artifact.
    pub seq: u64,
    pub updated_at: DateTime<Utc>,
}

impl ActionRecord {
    pub fn new(descriptor: ActionDescriptor, seq: u64) -> Self {
        Self {
            descriptor,
            status: ActionStatus::Pending,
            executed: false,
            cancel: CancellationToken::new(),
            seq,
            updated_at: Utc::now(),
        }
    }

    pub fn snapshot(&self, id: &str) -> ActionSnapshot {
        ActionSnapshot {
            id: id.to_string(),
            descriptor: self.descriptor.clone(),
            status: self.status.clone(),
            executed: self.executed,
            cancelled: self.cancel.is_cancelled(),
            updated_at: self.updated_at,
        }
    }
}

/// Read-only copy of an [`ActionRecord`] handed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSnapshot {
    pub id: String,
    pub descriptor: ActionDescriptor,
    pub status: ActionStatus,
    pub executed: bool,
    pub cancelled: bool,
    pub updated_at: DateTime<Utc>,
}
