//! `forge-core`: the action execution engine.
//!
//! A language model streams *actions* (shell commands, file writes,
//! repository imports) grouped into *artifacts*, one artifact per response.
//! The engine runs each artifact's actions strictly in order against a
//! shared [`forge_sandbox::Sandbox`], tracks every action's status, and lets
//! observers follow along through snapshots and [`EngineEvent`]s.
//!
//! ```text
//! ParserEvent ──► ArtifactRegistry ──► ActionRunner (one per artifact)
//!                                          │
//!                                          ├── ActionStore      status + cancel token per action
//!                                          └── ExecutionChain   FIFO, one step in flight
//!                                                  │
//!                                                  ▼
//!                                          shell / file / import handler ──► Sandbox
//! ```

pub mod action;
pub mod artifact;
pub mod chain;
pub mod config;
pub mod error;
pub mod events;
mod handlers;
pub mod protocol;
pub mod runner;
pub mod store;

pub use action::{ActionDescriptor, ActionRecord, ActionSnapshot, ActionStatus, ImportFile};
pub use artifact::{ActionEvent, ArtifactRegistry, ArtifactSnapshot, ArtifactUpdate};
pub use chain::{Completion, ExecutionChain};
pub use config::{ConfigWarning, EngineConfig, ShellConfig, ShellPolicy, WarnLevel};
pub use error::{EngineError, Result};
pub use events::{EngineEvent, EventBus};
pub use protocol::{parse_events, ParserEvent};
pub use runner::{ActionCompletion, ActionRunner};
pub use store::ActionStore;
