use serde_json::Value;

use crate::{
    DagsyncError, Result,
    events::{EventKind, PushEvent},
    model::{EdgeModel, NodeModel, WorkflowModel},
    workflow::{NodePatch, NodeStatus, WorkflowAction},
};

impl PushEvent {
    /// Decodes a graph event into a reducer action.
    ///
    /// Returns `Ok(None)` for kinds that do not touch the graph.
    pub fn to_action(&self) -> Result<Option<WorkflowAction>> {
        let action = match self.kind {
            EventKind::WorkflowUpdated => WorkflowAction::ReplaceSnapshot(WorkflowModel::from_value(&self.payload)?),
            EventKind::TaskProgress => WorkflowAction::PatchNode(NodePatch::from_payload(&self.payload)?),
            EventKind::HitlRequest => WorkflowAction::PatchNode(NodePatch::status(NodePatch::target_id(&self.payload)?, NodeStatus::HitlRequired)),
            EventKind::DeadEndAdded => WorkflowAction::PatchNode(NodePatch::status(NodePatch::target_id(&self.payload)?, NodeStatus::DeadEnd)),
            EventKind::NodeAdded => {
                let node = self.payload.get("node").unwrap_or(&self.payload);
                WorkflowAction::AddNode(decode::<NodeModel>("node_added", node)?)
            }
            EventKind::EdgeAdded => WorkflowAction::UpsertEdges(edges_payload(&self.payload)?),
            _ => return Ok(None),
        };
        Ok(Some(action))
    }

    /// Payload of a `log_update`: one log line.
    pub fn log_line(&self) -> Result<&str> {
        self.payload.as_str().ok_or_else(|| DagsyncError::malformed("log_update payload is not a string"))
    }

    /// Payload of a `hitl_update`: the pending requests, counted.
    pub fn hitl_pending(&self) -> Result<usize> {
        self.payload.as_array().map(Vec::len).ok_or_else(|| DagsyncError::malformed("hitl_update payload is not an array"))
    }
}

/// `edge_added` accepts `{"edges": [...]}`, `{"edge": {...}}`, a bare list or a bare edge.
fn edges_payload(payload: &Value) -> Result<Vec<EdgeModel>> {
    if let Some(edges) = payload.get("edges") {
        return decode("edge_added", edges);
    }
    if let Some(edge) = payload.get("edge") {
        return Ok(vec![decode("edge_added", edge)?]);
    }
    if payload.is_array() {
        return decode("edge_added", payload);
    }
    Ok(vec![decode("edge_added", payload)?])
}

fn decode<T: serde::de::DeserializeOwned>(
    kind: &str,
    value: &Value,
) -> Result<T> {
    serde_json::from_value(value.clone()).map_err(|e| DagsyncError::MalformedEvent(format!("invalid {} payload: {}", kind, e)))
}
