use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::action::ActionStatus;

/// Change notifications published by the registry, runners and handlers.
///
/// Observers (UI, CLI) subscribe through [`EventBus::subscribe`] and read
/// current state from snapshots; events only say *what* changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    ArtifactAdded {
        artifact_id: String,
        title: String,
    },
    ArtifactUpdated {
        artifact_id: String,
        title: String,
        closed: bool,
    },
    ActionUpdated {
        artifact_id: String,
        action_id: String,
        status: ActionStatus,
    },
    /// One line of process output. Side channel only; never affects status.
    Output {
        artifact_id: String,
        action_id: String,
        line: String,
    },
}

/// Cloneable publisher half of the engine event broadcast.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish without blocking. Having no subscribers is not an error.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}
