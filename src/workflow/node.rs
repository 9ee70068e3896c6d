use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::{DagsyncError, Result, model::NodeModel};

/// node id
pub type NodeId = String;

/// Payload key holding a status string the client does not know.
pub const REPORTED_STATUS_KEY: &str = "reported_status";

/// Kind of a workflow node as drawn by the front-end.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeKind {
    Start,
    Agent,
    #[default]
    Task,
    Decision,
    End,
}

/// Execution status mirrored from the backend.
///
/// There is no transition table: the backend is the authority on execution,
/// so any status may follow any other.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString, strum::EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    DeadEnd,
    HitlRequired,
}

/// Layout hint, advisory only.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A node of the mirrored workflow graph.
///
/// Nodes are never mutated in place: a patch produces a new value so graphs
/// handed out earlier keep their content.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Node {
    /// node id
    pub id: NodeId,
    /// node kind
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// last status reported by the backend
    pub status: NodeStatus,
    /// layout hint
    pub position: Position,
    /// display payload: label, reasoning, tool outputs, ...
    pub data: Map<String, Value>,
}

/// Kind-specific projection of a node for renderers.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeView<'a> {
    Start {
        label: Option<&'a str>,
    },
    Agent {
        agent: Option<&'a str>,
        label: Option<&'a str>,
        reasoning: Option<&'a str>,
    },
    Task {
        label: Option<&'a str>,
        status: NodeStatus,
    },
    Decision {
        label: Option<&'a str>,
    },
    End {
        label: Option<&'a str>,
    },
}

/// Partial update targeting one existing node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePatch {
    pub id: NodeId,
    pub status: Option<NodeStatus>,
    pub kind: Option<NodeKind>,
    pub position: Option<Position>,
    /// payload keys merged over the existing payload
    pub data: Map<String, Value>,
    /// edges accompanying the patch
    pub edges: Vec<crate::model::EdgeModel>,
}

impl Node {
    pub fn new(
        id: impl Into<NodeId>,
        kind: NodeKind,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            status: NodeStatus::default(),
            position: Position::default(),
            data: Map::new(),
        }
    }

    pub fn from_model(model: NodeModel) -> Result<Self> {
        if model.id.is_empty() {
            return Err(DagsyncError::MalformedEvent("node without id".to_string()));
        }

        let mut data = model.data.unwrap_or_default();
        // top-level display fields live in the payload
        for (key, value) in model.extra {
            if !value.is_null() {
                data.insert(key, value);
            }
        }
        let status = model.status.as_deref().map(|raw| reported_status(&model.id, raw, &mut data)).unwrap_or_default();

        Ok(Self {
            id: model.id,
            kind: model.kind.unwrap_or_default(),
            status,
            position: model.position.unwrap_or_default(),
            data,
        })
    }

    /// Returns a new node with the patch merged over this one.
    pub fn patched(
        &self,
        patch: &NodePatch,
    ) -> Self {
        let mut data = self.data.clone();
        if patch.status.is_some() {
            data.remove(REPORTED_STATUS_KEY);
        }
        for (key, value) in patch.data.iter() {
            data.insert(key.clone(), value.clone());
        }

        Self {
            id: self.id.clone(),
            kind: patch.kind.unwrap_or(self.kind),
            status: patch.status.unwrap_or(self.status),
            position: patch.position.unwrap_or(self.position),
            data,
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.data_str("label")
    }

    fn data_str(
        &self,
        key: &str,
    ) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn view(&self) -> NodeView<'_> {
        let label = self.label();
        match self.kind {
            NodeKind::Start => NodeView::Start {
                label,
            },
            NodeKind::Agent => NodeView::Agent {
                agent: self.data_str("agent"),
                label,
                reasoning: self.data_str("reasoning"),
            },
            NodeKind::Task => NodeView::Task {
                label,
                status: self.status,
            },
            NodeKind::Decision => NodeView::Decision {
                label,
            },
            NodeKind::End => NodeView::End {
                label,
            },
        }
    }
}

const PATCH_ID_KEYS: [&str; 2] = ["task_id", "id"];

impl NodePatch {
    pub fn status(
        id: impl Into<NodeId>,
        status: NodeStatus,
    ) -> Self {
        Self {
            id: id.into(),
            status: Some(status),
            ..Default::default()
        }
    }

    /// Parses a push payload such as `{"task_id": "a", "status": "running", "progress": 0.5}`.
    ///
    /// `status`, `type`, `position` and `edges` are typed fields, every other key is
    /// merged into the node payload.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let obj = payload.as_object().ok_or_else(|| DagsyncError::malformed("node patch payload is not an object"))?;
        let id = Self::target_id(payload)?;

        let mut patch = NodePatch {
            id,
            ..Default::default()
        };

        for (key, value) in obj.iter() {
            match key.as_str() {
                "task_id" | "id" => {}
                "status" => match value {
                    Value::Null => {}
                    Value::String(raw) => patch.status = Some(reported_status(&patch.id, raw, &mut patch.data)),
                    _ => return Err(DagsyncError::malformed("invalid 'status': expected a string")),
                },
                "type" => patch.kind = typed(key, value)?,
                "position" => patch.position = typed(key, value)?,
                "edges" => patch.edges = typed::<Vec<crate::model::EdgeModel>>(key, value)?.unwrap_or_default(),
                _ if value.is_null() => {}
                _ => {
                    patch.data.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(patch)
    }

    /// Extracts the target node id (`task_id`, falling back to `id`).
    pub fn target_id(payload: &Value) -> Result<NodeId> {
        PATCH_ID_KEYS
            .iter()
            .find_map(|key| payload.get(*key).and_then(Value::as_str))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| DagsyncError::malformed("node patch without task_id"))
    }
}

/// Maps a reported status. Unknown values count as pending and are kept in the payload.
fn reported_status(
    id: &str,
    raw: &str,
    data: &mut Map<String, Value>,
) -> NodeStatus {
    match NodeStatus::from_str(raw) {
        Ok(status) => status,
        Err(_) => {
            warn!(node = id, status = raw, "unknown node status, counting as pending");
            data.insert(REPORTED_STATUS_KEY.to_string(), Value::String(raw.to_string()));
            NodeStatus::Pending
        }
    }
}

fn typed<T: serde::de::DeserializeOwned>(
    key: &str,
    value: &Value,
) -> Result<Option<T>> {
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value.clone()).map(Some).map_err(|e| DagsyncError::MalformedEvent(format!("invalid '{}': {}", key, e)))
}
