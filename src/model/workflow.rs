use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    DagsyncError, Result,
    model::{EdgeModel, NodeModel},
};

/// Wire shape of a full workflow snapshot.
///
/// Both `nodes` and `edges` are required: a backend with no workflow yet sends
/// them as empty lists, anything else is a malformed payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowModel {
    pub nodes: Vec<NodeModel>,
    pub edges: Vec<EdgeModel>,
}

impl WorkflowModel {
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str::<WorkflowModel>(s).map_err(|e| DagsyncError::MalformedEvent(format!("invalid workflow snapshot: {}", e)))
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        WorkflowModel::deserialize(value).map_err(|e| DagsyncError::MalformedEvent(format!("invalid workflow snapshot: {}", e)))
    }
}
