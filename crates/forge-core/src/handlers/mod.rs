//! One handler per [`ActionDescriptor`] variant.
//!
//! Handlers receive the action's cancellation token through
//! [`HandlerContext`] and check it at their suspension points. They never
//! touch the store; the runner maps their `Result` onto a status.

mod file;
mod import;
mod shell;

use std::sync::Arc;

use forge_sandbox::{Process, Sandbox};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::action::ActionDescriptor;
use crate::config::ShellPolicy;
use crate::error::Result;
use crate::events::{EngineEvent, EventBus};

pub struct HandlerContext {
    pub sandbox: Arc<dyn Sandbox>,
    pub policy: Arc<ShellPolicy>,
    pub events: EventBus,
    pub artifact_id: String,
    pub action_id: String,
    pub cancel: CancellationToken,
}

impl HandlerContext {
    /// Stream a process's output to the event bus and the debug log.
    fn forward_output(&self, process: &mut Process) {
        let Some(mut output) = process.take_output() else {
            return;
        };
        let events = self.events.clone();
        let artifact_id = self.artifact_id.clone();
        let action_id = self.action_id.clone();
        tokio::spawn(async move {
            while let Some(line) = output.next().await {
                tracing::debug!(artifact = %artifact_id, action = %action_id, "{line}");
                events.publish(EngineEvent::Output {
                    artifact_id: artifact_id.clone(),
                    action_id: action_id.clone(),
                    line,
                });
            }
        });
    }
}

pub async fn dispatch(ctx: &HandlerContext, descriptor: &ActionDescriptor) -> Result<()> {
    match descriptor {
        ActionDescriptor::Shell { command } => shell::run(ctx, command).await,
        ActionDescriptor::File { path, content } => file::run(ctx, path, content).await,
        ActionDescriptor::Import {
            target_path,
            files,
            post_commands,
        } => import::run(ctx, target_path, files, post_commands).await,
    }
}
