//! The action runner: one per artifact.
//!
//! `add` registers an action and queues its "about to run" mark; `run`
//! claims it and queues the actual execution. Both go through the same
//! [`ExecutionChain`], so a runner never executes two actions at once and
//! always executes them in the order `run` was called.

use std::sync::Arc;

use forge_sandbox::Sandbox;

use crate::action::{ActionDescriptor, ActionSnapshot, ActionStatus};
use crate::chain::{Completion, ExecutionChain};
use crate::config::ShellPolicy;
use crate::error::Result;
use crate::events::EventBus;
use crate::handlers::{self, HandlerContext};
use crate::store::ActionStore;

/// Completion handle of one executed action.
pub type ActionCompletion = Completion<Result<()>>;

struct Shared {
    artifact_id: String,
    store: ActionStore,
    sandbox: Arc<dyn Sandbox>,
    policy: Arc<ShellPolicy>,
    events: EventBus,
}

pub struct ActionRunner {
    shared: Arc<Shared>,
    chain: ExecutionChain,
}

impl ActionRunner {
    /// Create a runner for `artifact_id`. Must be called within a Tokio runtime.
    pub fn new(
        artifact_id: impl Into<String>,
        sandbox: Arc<dyn Sandbox>,
        policy: Arc<ShellPolicy>,
        events: EventBus,
    ) -> Self {
        let artifact_id = artifact_id.into();
        let chain = ExecutionChain::new(format!("artifact:{artifact_id}"));
        let store = ActionStore::new(artifact_id.clone(), events.clone());
        Self {
            shared: Arc::new(Shared {
                artifact_id,
                store,
                sandbox,
                policy,
                events,
            }),
            chain,
        }
    }

    pub fn artifact_id(&self) -> &str {
        &self.shared.artifact_id
    }

    /// Register an action as `Pending`. Returns `false` for a duplicate id.
    pub fn add_action(&self, id: &str, descriptor: ActionDescriptor) -> bool {
        let kind = descriptor.kind();
        if !self.shared.store.insert(id, descriptor) {
            tracing::debug!(artifact = %self.artifact_id(), action = %id, "duplicate add ignored");
            return false;
        }
        tracing::debug!(artifact = %self.artifact_id(), action = %id, kind, "action added");

        let shared = Arc::clone(&self.shared);
        let id = id.to_string();
        // Fire-and-forget: nobody waits on the mark itself.
        drop(self.chain.enqueue(async move {
            shared.store.transition(&id, ActionStatus::Running);
        }));
        true
    }

    /// Claim the action with its finalized descriptor and queue its execution.
    ///
    /// Returns `Ok(None)` when the action was already dispatched; fails with
    /// [`crate::EngineError::ActionNotFound`] when it was never added.
    pub fn run_action(
        &self,
        id: &str,
        descriptor: ActionDescriptor,
    ) -> Result<Option<ActionCompletion>> {
        if !self.shared.store.claim(id, descriptor)? {
            tracing::debug!(artifact = %self.artifact_id(), action = %id, "action already dispatched");
            return Ok(None);
        }
        let shared = Arc::clone(&self.shared);
        let id = id.to_string();
        Ok(Some(self.chain.enqueue(execute(shared, id))))
    }

    /// Cancel the action and mark it `Aborted` right away.
    ///
    /// The running handler notices the signal at its next suspension point.
    pub fn abort_action(&self, id: &str) -> Result<()> {
        tracing::info!(artifact = %self.artifact_id(), action = %id, "aborting action");
        self.shared.store.abort(id)
    }

    /// Resolves once everything queued before this call has settled.
    pub fn settled(&self) -> Completion<()> {
        self.chain.enqueue(async {})
    }

    pub fn action(&self, id: &str) -> Option<ActionSnapshot> {
        self.shared.store.get(id)
    }

    pub fn actions(&self) -> Vec<ActionSnapshot> {
        self.shared.store.snapshot()
    }
}

async fn execute(shared: Arc<Shared>, id: String) -> Result<()> {
    let (descriptor, cancel) = shared.store.execution_input(&id)?;
    if cancel.is_cancelled() {
        tracing::info!(artifact = %shared.artifact_id, action = %id, "skipping aborted action");
        return Ok(());
    }

    shared.store.transition(&id, ActionStatus::Running);
    tracing::info!(
        artifact = %shared.artifact_id,
        action = %id,
        kind = descriptor.kind(),
        summary = %descriptor.summary(),
        "executing action"
    );

    let ctx = HandlerContext {
        sandbox: Arc::clone(&shared.sandbox),
        policy: Arc::clone(&shared.policy),
        events: shared.events.clone(),
        artifact_id: shared.artifact_id.clone(),
        action_id: id.clone(),
        cancel: cancel.clone(),
    };

    match handlers::dispatch(&ctx, &descriptor).await {
        Ok(()) => {
            let status = if cancel.is_cancelled() {
                ActionStatus::Aborted
            } else {
                ActionStatus::Complete
            };
            tracing::info!(artifact = %shared.artifact_id, action = %id, status = %status, "action settled");
            shared.store.transition(&id, status);
            Ok(())
        }
        Err(e) => {
            tracing::error!(artifact = %shared.artifact_id, action = %id, error = %e, "action failed");
            shared.store.transition(
                &id,
                ActionStatus::Failed {
                    reason: e.to_string(),
                },
            );
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShellConfig;
    use crate::error::EngineError;
    use forge_sandbox::LocalSandbox;
    use tempfile::TempDir;

    fn runner() -> (ActionRunner, TempDir) {
        let dir = TempDir::new().unwrap();
        let sandbox = LocalSandbox::new(dir.path(), "/home/project").unwrap();
        let policy = ShellPolicy::from_config(&ShellConfig {
            settle_timeout_ms: 200,
            ..ShellConfig::default()
        })
        .unwrap();
        let runner = ActionRunner::new("art", Arc::new(sandbox), Arc::new(policy), EventBus::new(64));
        (runner, dir)
    }

    fn write(path: &str, content: &str) -> ActionDescriptor {
        ActionDescriptor::File {
            path: path.into(),
            content: content.into(),
        }
    }

    #[tokio::test]
    async fn add_registers_pending_then_marks_running() {
        let (runner, _dir) = runner();
        assert!(runner.add_action("1", write("a.txt", "x")));
        assert!(!runner.add_action("1", write("b.txt", "y")));
        runner.settled().await.unwrap();
        let snap = runner.action("1").unwrap();
        assert_eq!(snap.status, ActionStatus::Running);
        assert!(!snap.executed);
        assert_eq!(snap.descriptor, write("a.txt", "x"));
    }

    #[tokio::test]
    async fn run_unknown_action_is_not_found() {
        let (runner, _dir) = runner();
        let err = runner.run_action("ghost", write("a.txt", "x")).unwrap_err();
        assert!(matches!(err, EngineError::ActionNotFound { .. }));
    }

    #[tokio::test]
    async fn run_uses_finalized_descriptor() {
        let (runner, dir) = runner();
        runner.add_action("1", write("a.txt", "partial"));
        let done = runner.run_action("1", write("a.txt", "final")).unwrap().unwrap();
        done.await.unwrap().unwrap();
        let content = std::fs::read_to_string(dir.path().join("home/project/a.txt")).unwrap();
        assert_eq!(content, "final");
        assert_eq!(runner.action("1").unwrap().status, ActionStatus::Complete);
    }

    #[tokio::test]
    async fn second_run_returns_none() {
        let (runner, _dir) = runner();
        runner.add_action("1", write("a.txt", "x"));
        assert!(runner.run_action("1", write("a.txt", "x")).unwrap().is_some());
        assert!(runner.run_action("1", write("a.txt", "x")).unwrap().is_none());
    }

    #[tokio::test]
    async fn abort_unknown_action_is_not_found() {
        let (runner, _dir) = runner();
        assert!(runner.abort_action("ghost").is_err());
    }

    #[tokio::test]
    async fn actions_lists_in_add_order() {
        let (runner, _dir) = runner();
        runner.add_action("b", write("b.txt", ""));
        runner.add_action("a", write("a.txt", ""));
        let ids: Vec<String> = runner.actions().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
