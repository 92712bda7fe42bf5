use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::{Result, SandboxError};

// ─── Process ──────────────────────────────────────────────────────────────

/// Handle to a process started through [`crate::Sandbox::spawn`].
///
/// Dropping the handle does not stop the process. Termination only happens
/// through [`Process::kill`] (or the token returned by [`Process::killer`]).
#[derive(Debug)]
pub struct Process {
    output: Option<OutputStream>,
    exit: watch::Receiver<Option<i32>>,
    killer: CancellationToken,
}

impl Process {
    /// Assemble a handle from its channels.
    ///
    /// Sandbox implementations publish output lines on `output`, the exit
    /// code on `exit` (`None` until the process ends) and terminate the
    /// process once `killer` is cancelled.
    pub fn from_parts(
        output: mpsc::UnboundedReceiver<String>,
        exit: watch::Receiver<Option<i32>>,
        killer: CancellationToken,
    ) -> Self {
        Self {
            output: Some(OutputStream { rx: output }),
            exit,
            killer,
        }
    }

    /// Take the combined stdout/stderr line stream. Returns `None` after the first call.
    pub fn take_output(&mut self) -> Option<OutputStream> {
        self.output.take()
    }

    /// Request termination (best-effort, returns immediately).
    pub fn kill(&self) {
        self.killer.cancel();
    }

    /// Token that terminates the process when cancelled.
    pub fn killer(&self) -> CancellationToken {
        self.killer.clone()
    }

    /// The exit code if the process already ended.
    pub fn try_exit_code(&self) -> Option<i32> {
        *self.exit.borrow()
    }

    /// Wait for the process to end and return its exit code.
    ///
    /// `-1` means the process was terminated by a signal.
    pub async fn wait(&mut self) -> Result<i32> {
        let code = self
            .exit
            .wait_for(|code| code.is_some())
            .await
            .map_err(|_| SandboxError::ProcessLost)?;
        (*code).ok_or(SandboxError::ProcessLost)
    }
}

// ─── OutputStream ─────────────────────────────────────────────────────────

/// Lines written by a sandbox process, stdout and stderr interleaved.
///
/// The stream ends once both pipes are closed.
#[derive(Debug)]
pub struct OutputStream {
    rx: mpsc::UnboundedReceiver<String>,
}

impl Stream for OutputStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ─── Driver ───────────────────────────────────────────────────────────────

/// Take ownership of a spawned child and expose it as a [`Process`].
///
/// A background task owns the child: it waits for exit, or for the kill
/// token, whichever comes first. Output readers run in their own tasks and
/// keep draining the pipes even when nobody consumes the stream, so a
/// chatty background process never blocks on a full pipe.
pub(crate) fn drive(mut child: Child) -> Process {
    let (line_tx, line_rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, line_tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(stderr, line_tx);
    }

    let (exit_tx, exit_rx) = watch::channel(None);
    let killer = CancellationToken::new();
    let token = killer.clone();

    let mut guard = GroupGuard { pid: child.id() };
    tokio::spawn(async move {
        let cancelled = tokio::select! {
            _ = child.wait() => false,
            _ = token.cancelled() => true,
        };
        if cancelled {
            terminate(&mut child).await;
        }

        let code = match child.wait().await {
            Ok(status) => status.code().unwrap_or(-1),
            Err(e) => {
                tracing::warn!(error = %e, "failed to wait on sandbox process");
                -1
            }
        };
        guard.disarm();
        tracing::debug!(code, cancelled, "sandbox process exited");
        let _ = exit_tx.send(Some(code));
    });

    Process::from_parts(line_rx, exit_rx, killer)
}

fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if buf.ends_with(b"\n") {
                        buf.pop();
                        if buf.ends_with(b"\r") {
                            buf.pop();
                        }
                    }
                    // Receiver gone: keep draining so the child never blocks.
                    let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!(error = %e, "sandbox output pipe failed");
                    break;
                }
            }
        }
    });
}

/// Kills the process group when dropped while armed.
///
/// The driver task holds one until the child has exited, so tearing down the
/// runtime (or aborting the task) never leaves the group running.
struct GroupGuard {
    pid: Option<u32>,
}

impl GroupGuard {
    fn disarm(&mut self) {
        self.pid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if let Some(pid) = self.pid.take() {
            tracing::debug!(pid, "driver dropped before exit; killing process group");
            kill_group(pid);
        }
    }
}

/// Send `SIGKILL` to the process group led by `pid`.
fn kill_group(pid: u32) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            tracing::debug!(pid, error = %e, "killpg failed");
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

/// Kill the child's whole process group, then the child itself.
///
/// Shell wrappers (`sh -c`) fork the real command, so killing only the
/// direct child would orphan it.
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        kill_group(pid);
    }
    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "kill on sandbox process failed");
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
