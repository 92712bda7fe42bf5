//! `forge-sandbox`: the execution substrate the forge engine issues work against.
//!
//! The engine never touches the host directly. It consumes the narrow
//! [`Sandbox`] capability interface: spawn a process, create a directory,
//! write a file. [`LocalSandbox`] implements it on top of a host directory
//! and `tokio::process`.
//!
//! # Architecture
//!
//! ```text
//! Sandbox (trait)
//!     │
//!     ├── spawn()       → Process   ← output stream + kill() + wait()
//!     ├── mkdir()
//!     ├── write_file()
//!     └── read_file()
//!
//! LocalSandbox     ← virtual POSIX paths mapped under a host root
//!     │              processes run in their own process group
//!     ▼
//! drive(Child)     ← background task: stdout/stderr lines → OutputStream,
//!                    exit code → watch channel, kill token → SIGKILL
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use forge_sandbox::{LocalSandbox, Sandbox};
//! use futures::StreamExt;
//!
//! let sandbox = LocalSandbox::new("/tmp/forge", "/home/project")?;
//! sandbox.write_file("src/main.js", "console.log(1)").await?;
//!
//! let mut process = sandbox
//!     .spawn("sh", &["-c".into(), "node src/main.js".into()], &Default::default())
//!     .await?;
//! let mut output = process.take_output().unwrap();
//! while let Some(line) = output.next().await {
//!     println!("{line}");
//! }
//! assert_eq!(process.wait().await?, 0);
//! ```

pub mod error;
pub mod local;
pub mod paths;
pub mod process;

use std::collections::HashMap;

use async_trait::async_trait;

pub use error::SandboxError;
pub use local::LocalSandbox;
pub use process::{OutputStream, Process};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, SandboxError>;

/// Capabilities the engine needs from an execution environment.
///
/// Paths are virtual POSIX paths. Relative paths resolve against
/// [`Sandbox::workdir`]. Implementations must tolerate concurrent calls from
/// different runners; the engine does no cross-runner locking.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Absolute virtual path processes start in and relative paths resolve against.
    fn workdir(&self) -> &str;

    /// Start `program` with `args` and extra environment `env`.
    async fn spawn(
        &self,
        program: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Process>;

    /// Create a directory. With `recursive`, missing parents are created and
    /// an existing directory is not an error.
    async fn mkdir(&self, path: &str, recursive: bool) -> Result<()>;

    /// Write `content` to `path`, replacing any existing file.
    async fn write_file(&self, path: &str, content: &str) -> Result<()>;

    async fn read_file(&self, path: &str) -> Result<String>;
}
