use forge_sandbox::SandboxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("action not found: {artifact_id}/{action_id}")]
    ActionNotFound {
        artifact_id: String,
        action_id: String,
    },

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("command `{command}` failed with exit code {code}")]
    CommandFailed { command: String, code: i32 },

    #[error("post-import command `{command}` failed with exit code {code}")]
    PostCommandFailed { command: String, code: i32 },

    #[error("failed to import {path}: {source}")]
    ImportFile {
        path: String,
        #[source]
        source: SandboxError,
    },

    #[error("execution chain closed before the step completed")]
    ChainClosed,

    #[error("invalid long-running pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("malformed event on line {line}: {source}")]
    MalformedEvent {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
