//! Frames received over the persistent connection.
//!
//! Every inbound text frame is either a reply to a correlated request
//! (it echoes an `id`) or a push event (it names an `event` kind and carries a
//! `data` payload). Push events are dispatched by kind through the
//! subscription registry.

mod payload;

use std::str::FromStr;

use serde_json::Value;
use tracing::debug;

use crate::utils;

/// Push event kinds understood by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString, strum::Display)]
pub enum EventKind {
    /// Full snapshot replace.
    #[strum(to_string = "workflow_updated", serialize = "workflow-updated")]
    WorkflowUpdated,
    /// Node patch.
    #[strum(to_string = "task_progress", serialize = "task-progress")]
    TaskProgress,
    /// Node patch forcing `hitl_required`.
    #[strum(to_string = "hitl_request", serialize = "hitl-request")]
    HitlRequest,
    /// Node patch forcing `dead_end`.
    #[strum(to_string = "dead_end_added", serialize = "dead-end-added")]
    DeadEndAdded,
    /// A new node.
    #[strum(to_string = "node_added", serialize = "node-added")]
    NodeAdded,
    /// One or more new or replaced edges.
    #[strum(to_string = "edge_added", serialize = "edge-added")]
    EdgeAdded,
    /// A line appended to the run log.
    #[strum(to_string = "log_update", serialize = "log-update")]
    LogUpdate,
    /// The list of pending human-in-the-loop requests.
    #[strum(to_string = "hitl_update", serialize = "hitl-update")]
    HitlUpdate,
    /// The transport opened.
    #[strum(serialize = "connect")]
    Connect,
    /// The transport left the open state.
    #[strum(serialize = "disconnect")]
    Disconnect,
}

/// A classified push event.
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    pub kind: EventKind,
    pub payload: Value,
    /// Timestamp in milliseconds when the frame was classified.
    pub received_at: i64,
}

/// One inbound frame after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Reply {
        id: String,
        body: Value,
    },
    Push(PushEvent),
}

impl PushEvent {
    pub fn new(
        kind: EventKind,
        payload: Value,
    ) -> Self {
        Self {
            kind,
            payload,
            received_at: utils::time::time_millis(),
        }
    }
}

impl Frame {
    /// Parses and classifies a raw text frame.
    ///
    /// Returns `None` for frames that are not JSON, carry an unknown event
    /// kind, or are neither a push nor a reply.
    pub fn parse(text: &str) -> Option<Frame> {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                debug!("dropping unparseable frame: {}", e);
                return None;
            }
        };

        Self::classify(value)
    }

    pub fn classify(value: Value) -> Option<Frame> {
        if let Some(event) = value.get("event").and_then(Value::as_str) {
            let kind = match EventKind::from_str(event) {
                Ok(kind) => kind,
                Err(_) => {
                    debug!(event, "dropping frame with unknown event kind");
                    return None;
                }
            };
            let payload = value.get("data").or_else(|| value.get("payload")).cloned().unwrap_or(Value::Null);
            return Some(Frame::Push(PushEvent::new(kind, payload)));
        }

        match value.get("id").and_then(Value::as_str) {
            Some(id) => Some(Frame::Reply {
                id: id.to_string(),
                body: value,
            }),
            None => {
                debug!("dropping frame without id or event");
                None
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use serde_json::json;

    use super::{EventKind, Frame};

    #[test]
    fn test_event_kind_spellings() {
        assert_eq!(EventKind::from_str("workflow_updated").unwrap(), EventKind::WorkflowUpdated);
        assert_eq!(EventKind::from_str("dead-end-added").unwrap(), EventKind::DeadEndAdded);
        assert_eq!(EventKind::TaskProgress.as_ref(), "task_progress");
        assert!(EventKind::from_str("node_selected").is_err());
    }

    #[test]
    fn test_classify_push() {
        let frame = Frame::parse(r#"{"event": "task_progress", "data": {"task_id": "a"}}"#).unwrap();
        match frame {
            Frame::Push(event) => {
                assert_eq!(event.kind, EventKind::TaskProgress);
                assert_eq!(event.payload, json!({"task_id": "a"}));
            }
            other => panic!("expected push, got {:?}", other),
        }

        let frame = Frame::parse(r#"{"event": "log-update", "payload": "line"}"#).unwrap();
        assert!(matches!(frame, Frame::Push(ref e) if e.payload == json!("line")));
    }

    #[test]
    fn test_classify_reply() {
        let frame = Frame::parse(r#"{"id": "abc-1", "result": 42}"#).unwrap();
        assert_eq!(
            frame,
            Frame::Reply {
                id: "abc-1".to_string(),
                body: json!({"id": "abc-1", "result": 42}),
            }
        );
    }

    #[test]
    fn test_drop_unusable_frames() {
        assert!(Frame::parse("not json").is_none());
        assert!(Frame::parse(r#"{"event": "mystery"}"#).is_none());
        assert!(Frame::parse(r#"{"result": 1}"#).is_none());
        assert!(Frame::parse(r#"{"id": 7}"#).is_none());
    }
}
