//! Artifact registry: one runner per model response.
//!
//! The registry exclusively owns every artifact record and, through it, the
//! artifact's runner and action store. All runners share one sandbox handle
//! and one event bus.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use forge_sandbox::Sandbox;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::action::{ActionDescriptor, ActionSnapshot};
use crate::config::{EngineConfig, ShellPolicy};
use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::protocol::ParserEvent;
use crate::runner::{ActionCompletion, ActionRunner};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

struct ArtifactRecord {
    title: String,
    closed: bool,
    seq: u64,
    runner: Arc<ActionRunner>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSnapshot {
    pub id: String,
    pub title: String,
    pub closed: bool,
    pub actions: Vec<ActionSnapshot>,
}

/// Partial artifact state from a streaming update. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactUpdate {
    pub title: Option<String>,
    pub closed: Option<bool>,
}

/// An action-level event routed to an artifact's runner.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionEvent {
    Add {
        action_id: String,
        descriptor: ActionDescriptor,
    },
    Run {
        action_id: String,
        descriptor: ActionDescriptor,
    },
    Abort {
        action_id: String,
    },
}

// ---------------------------------------------------------------------------
// ArtifactRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Artifacts {
    by_id: HashMap<String, ArtifactRecord>,
    next_seq: u64,
}

pub struct ArtifactRegistry {
    sandbox: Arc<dyn Sandbox>,
    policy: Arc<ShellPolicy>,
    events: EventBus,
    artifacts: Mutex<Artifacts>,
}

impl ArtifactRegistry {
    /// Build a registry around a shared sandbox. Fails on invalid shell patterns.
    pub fn new(sandbox: Arc<dyn Sandbox>, config: &EngineConfig) -> Result<Self> {
        let policy = ShellPolicy::from_config(&config.shell)?;
        Ok(Self {
            sandbox,
            policy: Arc::new(policy),
            events: EventBus::new(config.event_capacity),
            artifacts: Mutex::new(Artifacts::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Artifacts> {
        self.artifacts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Create the artifact and its runner. No-op returning `false` if it exists.
    ///
    /// Must be called within a Tokio runtime (the runner starts its worker).
    pub fn register_artifact(&self, artifact_id: &str, title: &str) -> bool {
        let mut artifacts = self.lock();
        if artifacts.by_id.contains_key(artifact_id) {
            tracing::debug!(artifact = %artifact_id, "artifact already registered");
            return false;
        }
        let runner = ActionRunner::new(
            artifact_id,
            Arc::clone(&self.sandbox),
            Arc::clone(&self.policy),
            self.events.clone(),
        );
        let seq = artifacts.next_seq;
        artifacts.next_seq += 1;
        artifacts.by_id.insert(
            artifact_id.to_string(),
            ArtifactRecord {
                title: title.to_string(),
                closed: false,
                seq,
                runner: Arc::new(runner),
            },
        );
        tracing::info!(artifact = %artifact_id, title, "artifact registered");
        self.events.publish(EngineEvent::ArtifactAdded {
            artifact_id: artifact_id.to_string(),
            title: title.to_string(),
        });
        true
    }

    /// Merge `update` into the artifact. Unknown artifacts are ignored: while
    /// streaming, an update may arrive before the artifact is registered.
    pub fn update_artifact(&self, artifact_id: &str, update: ArtifactUpdate) {
        let mut artifacts = self.lock();
        let Some(record) = artifacts.by_id.get_mut(artifact_id) else {
            tracing::debug!(artifact = %artifact_id, "update for unknown artifact ignored");
            return;
        };
        if let Some(title) = update.title {
            record.title = title;
        }
        if let Some(closed) = update.closed {
            record.closed = closed;
        }
        self.events.publish(EngineEvent::ArtifactUpdated {
            artifact_id: artifact_id.to_string(),
            title: record.title.clone(),
            closed: record.closed,
        });
    }

    /// Route an action event to the artifact's runner.
    ///
    /// Unlike updates, an action for an unknown artifact is a protocol
    /// violation and fails with [`EngineError::ArtifactNotFound`].
    pub fn dispatch(
        &self,
        artifact_id: &str,
        event: ActionEvent,
    ) -> Result<Option<ActionCompletion>> {
        let runner = self
            .runner(artifact_id)
            .ok_or_else(|| EngineError::ArtifactNotFound(artifact_id.to_string()))?;

        match event {
            ActionEvent::Add {
                action_id,
                descriptor,
            } => {
                runner.add_action(&action_id, descriptor);
                Ok(None)
            }
            ActionEvent::Run {
                action_id,
                descriptor,
            } => runner.run_action(&action_id, descriptor),
            ActionEvent::Abort { action_id } => {
                runner.abort_action(&action_id)?;
                Ok(None)
            }
        }
    }

    /// Single entry point for the parser's event stream.
    pub fn apply(&self, event: ParserEvent) -> Result<Option<ActionCompletion>> {
        match event {
            ParserEvent::ArtifactAdd { artifact_id, title } => {
                self.register_artifact(&artifact_id, &title);
                Ok(None)
            }
            ParserEvent::ArtifactUpdate {
                artifact_id,
                title,
                closed,
            } => {
                self.update_artifact(&artifact_id, ArtifactUpdate { title, closed });
                Ok(None)
            }
            ParserEvent::ActionAdd {
                artifact_id,
                action_id,
                action,
            } => self.dispatch(
                &artifact_id,
                ActionEvent::Add {
                    action_id,
                    descriptor: action,
                },
            ),
            ParserEvent::ActionRun {
                artifact_id,
                action_id,
                action,
            } => self.dispatch(
                &artifact_id,
                ActionEvent::Run {
                    action_id,
                    descriptor: action,
                },
            ),
            ParserEvent::ActionAbort {
                artifact_id,
                action_id,
            } => self.dispatch(&artifact_id, ActionEvent::Abort { action_id }),
        }
    }

    pub fn runner(&self, artifact_id: &str) -> Option<Arc<ActionRunner>> {
        self.lock()
            .by_id
            .get(artifact_id)
            .map(|record| Arc::clone(&record.runner))
    }

    pub fn artifact(&self, artifact_id: &str) -> Option<ArtifactSnapshot> {
        let (title, closed, runner) = {
            let artifacts = self.lock();
            let record = artifacts.by_id.get(artifact_id)?;
            (record.title.clone(), record.closed, Arc::clone(&record.runner))
        };
        Some(ArtifactSnapshot {
            id: artifact_id.to_string(),
            title,
            closed,
            actions: runner.actions(),
        })
    }

    /// Every artifact in registration order.
    pub fn artifacts(&self) -> Vec<ArtifactSnapshot> {
        let mut ids: Vec<(u64, String)> = self
            .lock()
            .by_id
            .iter()
            .map(|(id, record)| (record.seq, id.clone()))
            .collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|(_, id)| self.artifact(&id))
            .collect()
    }

    /// Wait until every runner has drained the work queued so far.
    pub async fn settle_all(&self) {
        let runners: Vec<Arc<ActionRunner>> = self
            .lock()
            .by_id
            .values()
            .map(|record| Arc::clone(&record.runner))
            .collect();
        for runner in runners {
            if let Err(e) = runner.settled().await {
                tracing::warn!(artifact = %runner.artifact_id(), error = %e, "runner did not settle");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
