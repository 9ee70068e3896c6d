use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::workflow::node::{NodeKind, Position};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeModel {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// status as reported, unknown values are tolerated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    /// top-level display fields such as `reasoning` and `tool_outputs`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
