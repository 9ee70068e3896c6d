pub mod edge;
pub mod graph;
pub mod node;
pub mod reducer;
pub mod stats;

pub use edge::{Edge, EdgeId};
pub use graph::{DroppedEdge, WorkflowGraph};
pub use node::{Node, NodeId, NodeKind, NodePatch, NodeStatus, NodeView, Position};
pub use reducer::{Applied, WorkflowAction, WorkflowReducer};
pub use stats::WorkflowStats;
