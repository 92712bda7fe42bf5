use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::paths;
use crate::process::{self, Process};
use crate::{Result, Sandbox, SandboxError};

// ─── LocalSandbox ─────────────────────────────────────────────────────────

/// A [`Sandbox`] backed by a directory on the host.
///
/// Virtual path `/home/project/src/app.js` lives at
/// `<root>/home/project/src/app.js`. Paths that would climb out of `root`
/// are rejected with [`SandboxError::PathEscape`].
#[derive(Debug, Clone)]
pub struct LocalSandbox {
    root: PathBuf,
    workdir: String,
}

impl LocalSandbox {
    /// Create a sandbox rooted at `root` and make sure `workdir` exists inside it.
    pub fn new(root: impl Into<PathBuf>, workdir: &str) -> Result<Self> {
        let workdir =
            paths::normalize(workdir).ok_or_else(|| SandboxError::PathEscape(workdir.into()))?;
        let sandbox = LocalSandbox {
            root: root.into(),
            workdir,
        };
        std::fs::create_dir_all(sandbox.host_path(&sandbox.workdir)?)?;
        Ok(sandbox)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a virtual path (absolute or workdir-relative) onto the host.
    pub fn host_path(&self, path: &str) -> Result<PathBuf> {
        let virtual_path = paths::join(&self.workdir, path)
            .ok_or_else(|| SandboxError::PathEscape(path.to_string()))?;
        Ok(self.root.join(virtual_path.trim_start_matches('/')))
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    fn workdir(&self) -> &str {
        &self.workdir
    }

    async fn spawn(
        &self,
        program: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Process> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(env)
            .current_dir(self.host_path(&self.workdir)?)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so kill() reaches everything the shell forks.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| SandboxError::Spawn {
            program: program.to_string(),
            source,
        })?;
        tracing::debug!(program, pid = child.id(), "spawned sandbox process");

        Ok(process::drive(child))
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<()> {
        let host = self.host_path(path)?;
        if recursive {
            tokio::fs::create_dir_all(&host).await?;
        } else {
            tokio::fs::create_dir(&host).await?;
        }
        Ok(())
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        tokio::fs::write(self.host_path(path)?, content).await?;
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<String> {
        Ok(tokio::fs::read_to_string(self.host_path(path)?).await?)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
