use forge_sandbox::paths;

use super::HandlerContext;
use crate::error::Result;

/// Write one file, creating its parent directories first.
///
/// Single edits are best-effort: directory or write failures are logged and
/// the action still completes.
pub(super) async fn run(ctx: &HandlerContext, path: &str, content: &str) -> Result<()> {
    let workdir = ctx.sandbox.workdir();
    let Some(target) = paths::join(workdir, path) else {
        tracing::error!(action = %ctx.action_id, path, "file path escapes the sandbox root");
        return Ok(());
    };

    if let Some(folder) = paths::parent(&target).filter(|dir| dir != workdir && dir != "/") {
        match ctx.sandbox.mkdir(&folder, true).await {
            Ok(()) => tracing::debug!(action = %ctx.action_id, folder = %folder, "created folder"),
            Err(e) => {
                tracing::error!(action = %ctx.action_id, folder = %folder, error = %e, "failed to create folder")
            }
        }
    }

    if ctx.cancel.is_cancelled() {
        tracing::debug!(action = %ctx.action_id, path = %target, "aborted before write");
        return Ok(());
    }

    match ctx.sandbox.write_file(&target, content).await {
        Ok(()) => tracing::debug!(action = %ctx.action_id, path = %target, "file written"),
        Err(e) => {
            tracing::error!(action = %ctx.action_id, path = %target, error = %e, "failed to write file")
        }
    }
    Ok(())
}
