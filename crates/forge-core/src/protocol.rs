//! Events emitted by the response parser, one JSON object per line.
//!
//! ```text
//! {"type":"artifact_add","artifact_id":"msg-1","title":"Todo app"}
//! {"type":"action_add","artifact_id":"msg-1","action_id":"0","action":{"type":"shell","command":"npm install"}}
//! {"type":"action_run","artifact_id":"msg-1","action_id":"0","action":{"type":"shell","command":"npm install"}}
//! {"type":"artifact_update","artifact_id":"msg-1","closed":true}
//! ```

use serde::{Deserialize, Serialize};

use crate::action::ActionDescriptor;
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParserEvent {
    ArtifactAdd {
        artifact_id: String,
        title: String,
    },
    ArtifactUpdate {
        artifact_id: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        closed: Option<bool>,
    },
    ActionAdd {
        artifact_id: String,
        action_id: String,
        action: ActionDescriptor,
    },
    ActionRun {
        artifact_id: String,
        action_id: String,
        action: ActionDescriptor,
    },
    ActionAbort {
        artifact_id: String,
        action_id: String,
    },
}

impl ParserEvent {
    pub fn artifact_id(&self) -> &str {
        match self {
            ParserEvent::ArtifactAdd { artifact_id, .. }
            | ParserEvent::ArtifactUpdate { artifact_id, .. }
            | ParserEvent::ActionAdd { artifact_id, .. }
            | ParserEvent::ActionRun { artifact_id, .. }
            | ParserEvent::ActionAbort { artifact_id, .. } => artifact_id,
        }
    }
}

/// Parse a JSONL event log. Blank lines are skipped.
pub fn parse_events(input: &str) -> Result<Vec<ParserEvent>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line.trim()).map_err(|source| EngineError::MalformedEvent {
                line: idx + 1,
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_event_kind() {
        let input = r#"
{"type":"artifact_add","artifact_id":"m1","title":"Demo"}
{"type":"action_add","artifact_id":"m1","action_id":"0","action":{"type":"file","path":"a.txt","content":"hi"}}
{"type":"action_run","artifact_id":"m1","action_id":"0","action":{"type":"file","path":"a.txt","content":"hi"}}
{"type":"action_abort","artifact_id":"m1","action_id":"0"}

{"type":"artifact_update","artifact_id":"m1","closed":true}
"#;
        let events = parse_events(input).unwrap();
        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|e| e.artifact_id() == "m1"));
        assert_eq!(
            events[4],
            ParserEvent::ArtifactUpdate {
                artifact_id: "m1".into(),
                title: None,
                closed: Some(true),
            }
        );
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let input = "{\"type\":\"artifact_add\",\"artifact_id\":\"m1\",\"title\":\"x\"}\nnot json\n";
        let err = parse_events(input).unwrap_err();
        assert!(matches!(err, EngineError::MalformedEvent { line: 2, .. }));
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let err = parse_events(r#"{"type":"artifact_delete","artifact_id":"m1"}"#).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
