//! Per-artifact action store.
//!
//! The map lives behind a `std::sync::Mutex` that is only ever held for
//! short synchronous sections, never across an `.await`. Every accepted
//! status change is published on the [`EventBus`] while the lock is held, so
//! subscribers see changes in the order they were applied.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::action::{ActionDescriptor, ActionRecord, ActionSnapshot, ActionStatus};
use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventBus};

#[derive(Default)]
struct Records {
    by_id: HashMap<String, ActionRecord>,
    next_seq: u64,
}

pub struct ActionStore {
    artifact_id: String,
    records: Mutex<Records>,
    events: EventBus,
}

impl ActionStore {
    pub fn new(artifact_id: impl Into<String>, events: EventBus) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            records: Mutex::new(Records::default()),
            events,
        }
    }

    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }

    fn lock(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn not_found(&self, id: &str) -> EngineError {
        EngineError::ActionNotFound {
            artifact_id: self.artifact_id.clone(),
            action_id: id.to_string(),
        }
    }

    /// Register a new `Pending` record. Returns `false` if `id` already exists.
    pub fn insert(&self, id: &str, descriptor: ActionDescriptor) -> bool {
        let mut records = self.lock();
        if records.by_id.contains_key(id) {
            return false;
        }
        let seq = records.next_seq;
        records.next_seq += 1;
        records
            .by_id
            .insert(id.to_string(), ActionRecord::new(descriptor, seq));
        self.publish(id, ActionStatus::Pending);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().by_id.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<ActionSnapshot> {
        self.lock().by_id.get(id).map(|r| r.snapshot(id))
    }

    /// All records in registration order.
    pub fn snapshot(&self) -> Vec<ActionSnapshot> {
        let records = self.lock();
        let mut entries: Vec<(&String, &ActionRecord)> = records.by_id.iter().collect();
        entries.sort_by_key(|(_, r)| r.seq);
        entries
            .into_iter()
            .map(|(id, record)| record.snapshot(id))
            .collect()
    }

    /// Claim `id` for execution with its finalized descriptor.
    ///
    /// Returns `Ok(false)` when the action was already claimed; the stored
    /// descriptor is frozen from the first successful claim onward.
    pub fn claim(&self, id: &str, descriptor: ActionDescriptor) -> Result<bool> {
        let mut records = self.lock();
        let record = records.by_id.get_mut(id).ok_or_else(|| self.not_found(id))?;
        if record.executed {
            return Ok(false);
        }
        record.descriptor = descriptor;
        record.executed = true;
        record.updated_at = Utc::now();
        Ok(true)
    }

    /// Descriptor and cancellation token handed to the handler.
    pub fn execution_input(&self, id: &str) -> Result<(ActionDescriptor, CancellationToken)> {
        let records = self.lock();
        let record = records.by_id.get(id).ok_or_else(|| self.not_found(id))?;
        Ok((record.descriptor.clone(), record.cancel.clone()))
    }

    /// Apply `next` if the state machine allows it. Returns whether it was applied.
    pub fn transition(&self, id: &str, next: ActionStatus) -> bool {
        let mut records = self.lock();
        let Some(record) = records.by_id.get_mut(id) else {
            tracing::debug!(artifact = %self.artifact_id, action = %id, "transition on unknown action");
            return false;
        };
        if !record.status.can_transition_to(&next) {
            tracing::debug!(
                artifact = %self.artifact_id,
                action = %id,
                from = %record.status,
                to = %next,
                "ignoring illegal status transition"
            );
            return false;
        }
        if record.status == next {
            return true;
        }
        record.status = next.clone();
        record.updated_at = Utc::now();
        self.publish(id, next);
        true
    }

    /// Signal the action's token and mark it `Aborted` unless already terminal.
    pub fn abort(&self, id: &str) -> Result<()> {
        let token = {
            let records = self.lock();
            let record = records.by_id.get(id).ok_or_else(|| self.not_found(id))?;
            record.cancel.clone()
        };
        token.cancel();
        self.transition(id, ActionStatus::Aborted);
        Ok(())
    }

    fn publish(&self, id: &str, status: ActionStatus) {
        self.events.publish(EngineEvent::ActionUpdated {
            artifact_id: self.artifact_id.clone(),
            action_id: id.to_string(),
            status,
        });
    }
}
