use serde::Serialize;

use crate::workflow::{graph::WorkflowGraph, node::NodeStatus};

/// Node counts per status bucket.
///
/// Always recomputed from a graph with a full scan, never maintained incrementally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkflowStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_end: usize,
    pub hitl_required: usize,
}

impl WorkflowStats {
    pub fn compute(graph: &WorkflowGraph) -> Self {
        let mut stats = WorkflowStats::default();
        for node in graph.nodes() {
            stats.total += 1;
            *stats.bucket_mut(node.status) += 1;
        }
        stats
    }

    pub fn count(
        &self,
        status: NodeStatus,
    ) -> usize {
        match status {
            NodeStatus::Pending => self.pending,
            NodeStatus::Running => self.running,
            NodeStatus::Completed => self.completed,
            NodeStatus::Failed => self.failed,
            NodeStatus::DeadEnd => self.dead_end,
            NodeStatus::HitlRequired => self.hitl_required,
        }
    }

    fn bucket_mut(
        &mut self,
        status: NodeStatus,
    ) -> &mut usize {
        match status {
            NodeStatus::Pending => &mut self.pending,
            NodeStatus::Running => &mut self.running,
            NodeStatus::Completed => &mut self.completed,
            NodeStatus::Failed => &mut self.failed,
            NodeStatus::DeadEnd => &mut self.dead_end,
            NodeStatus::HitlRequired => &mut self.hitl_required,
        }
    }
}
