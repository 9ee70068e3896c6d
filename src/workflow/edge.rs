//! Workflow edge definitions.
//!
//! Edges carry no status of their own; they are created by snapshots or
//! edge events and only ever replaced wholesale.

use serde::{Deserialize, Serialize};

use crate::{model::EdgeModel, workflow::node::NodeId};

/// Unique identifier for an edge within a workflow.
pub type EdgeId = String;

const DEFAULT_EDGE_KIND: &str = "default";

/// Execution dependency between two nodes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Edge {
    /// Unique edge identifier.
    pub id: EdgeId,
    /// ID of the source node.
    pub source: NodeId,
    /// ID of the target node.
    pub target: NodeId,
    /// Edge kind as drawn by the front-end.
    #[serde(rename = "type")]
    pub kind: String,
    /// Whether the edge is highlighted as active.
    pub animated: bool,
    /// Optional caption.
    pub label: Option<String>,
}

impl Edge {
    pub fn new(
        id: impl Into<EdgeId>,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            kind: DEFAULT_EDGE_KIND.to_string(),
            animated: false,
            label: None,
        }
    }
}

impl From<EdgeModel> for Edge {
    fn from(model: EdgeModel) -> Self {
        Self {
            id: model.id,
            source: model.source,
            target: model.target,
            kind: model.kind.unwrap_or_else(|| DEFAULT_EDGE_KIND.to_string()),
            animated: model.animated.unwrap_or(false),
            label: model.label,
        }
    }
}
