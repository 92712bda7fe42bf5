use forge_sandbox::{paths, SandboxError};

use super::HandlerContext;
use crate::action::ImportFile;
use crate::error::{EngineError, Result};

fn escape(path: &str) -> EngineError {
    EngineError::ImportFile {
        path: path.to_string(),
        source: SandboxError::PathEscape(path.to_string()),
    }
}

/// Write every file under `target_path`, in order, then run the post
/// commands in order.
///
/// Unlike a single file write, any failure here fails the action. Files
/// written before the failure stay on disk.
pub(super) async fn run(
    ctx: &HandlerContext,
    target_path: &str,
    files: &[ImportFile],
    post_commands: &[String],
) -> Result<()> {
    let base = paths::join(ctx.sandbox.workdir(), target_path).ok_or_else(|| escape(target_path))?;

    for file in files {
        if ctx.cancel.is_cancelled() {
            tracing::info!(action = %ctx.action_id, "import aborted; remaining files skipped");
            return Ok(());
        }
        let dest = paths::join(&base, &file.path).ok_or_else(|| escape(&file.path))?;
        if let Some(dir) = paths::parent(&dest) {
            ctx.sandbox
                .mkdir(&dir, true)
                .await
                .map_err(|source| EngineError::ImportFile {
                    path: dest.clone(),
                    source,
                })?;
        }
        ctx.sandbox
            .write_file(&dest, &file.content)
            .await
            .map_err(|source| EngineError::ImportFile {
                path: dest.clone(),
                source,
            })?;
        tracing::debug!(action = %ctx.action_id, path = %dest, "imported file");
    }

    for command in post_commands {
        if ctx.cancel.is_cancelled() {
            tracing::info!(action = %ctx.action_id, "import aborted; remaining commands skipped");
            return Ok(());
        }
        let policy = &ctx.policy;
        let mut process = ctx
            .sandbox
            .spawn(&policy.program, &policy.invocation(command), &policy.env)
            .await?;
        ctx.forward_output(&mut process);

        let exited = tokio::select! {
            _ = ctx.cancel.cancelled() => None,
            code = process.wait() => Some(code),
        };
        let Some(code) = exited else {
            process.kill();
            return Ok(());
        };
        let code = code?;
        if code != 0 {
            return Err(EngineError::PostCommandFailed {
                command: command.clone(),
                code,
            });
        }
        tracing::debug!(action = %ctx.action_id, command = %command, "post-import command finished");
    }

    Ok(())
}
