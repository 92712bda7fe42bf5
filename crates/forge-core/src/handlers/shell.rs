use forge_sandbox::Process;
use tokio_util::sync::CancellationToken;

use super::HandlerContext;
use crate::error::{EngineError, Result};

enum Race {
    Cancelled,
    Exited(forge_sandbox::Result<i32>),
    TimedOut,
}

/// Run `command` through the sandbox shell.
///
/// Dev servers and installers may never exit, so a command matching a
/// long-running pattern that is still alive after the settle timeout counts
/// as started; its process keeps running in the background. Such commands
/// may also exit nonzero without failing the action.
pub(super) async fn run(ctx: &HandlerContext, command: &str) -> Result<()> {
    let policy = &ctx.policy;
    let mut process = ctx
        .sandbox
        .spawn(&policy.program, &policy.invocation(command), &policy.env)
        .await?;

    if ctx.cancel.is_cancelled() {
        process.kill();
        return Ok(());
    }
    ctx.forward_output(&mut process);

    let long_running = policy.is_long_running(command);
    let race = tokio::select! {
        _ = ctx.cancel.cancelled() => Race::Cancelled,
        code = process.wait() => Race::Exited(code),
        _ = tokio::time::sleep(policy.settle_timeout) => Race::TimedOut,
    };

    let code = match race {
        Race::Cancelled => {
            process.kill();
            return Ok(());
        }
        Race::Exited(code) => code?,
        Race::TimedOut if long_running => {
            tracing::info!(
                artifact = %ctx.artifact_id,
                action = %ctx.action_id,
                command,
                "long-running command still alive after settle timeout; leaving it in the background"
            );
            watch_background(process, ctx.cancel.clone());
            return Ok(());
        }
        Race::TimedOut => {
            let exited = tokio::select! {
                _ = ctx.cancel.cancelled() => None,
                code = process.wait() => Some(code),
            };
            match exited {
                None => {
                    process.kill();
                    return Ok(());
                }
                Some(code) => code?,
            }
        }
    };

    if code != 0 {
        if long_running {
            tracing::warn!(
                artifact = %ctx.artifact_id,
                action = %ctx.action_id,
                command,
                code,
                "tolerating nonzero exit of long-running command"
            );
            return Ok(());
        }
        return Err(EngineError::CommandFailed {
            command: command.to_string(),
            code,
        });
    }
    Ok(())
}

/// Keep the abort wiring alive for a process the action no longer waits on.
///
/// Ends when the process exits on its own.
fn watch_background(mut process: Process, cancel: CancellationToken) {
    let killer = process.killer();
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("stopping background process of aborted action");
                killer.cancel();
            }
            code = process.wait() => {
                tracing::debug!(?code, "background process exited");
            }
        }
    });
}
