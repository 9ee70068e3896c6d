//! The workflow state reducer.
//!
//! Holds the authoritative `WorkflowGraph` and applies snapshot, node and edge
//! events to it. A rejected event is returned as an error and leaves the held
//! graph as it was; an accepted one swaps in a new immutable graph and
//! recomputes stats. Reporting is left to the caller, outside any lock.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    DagsyncError, Result,
    model::{EdgeModel, NodeModel, WorkflowModel},
    workflow::{
        graph::{DroppedEdge, WorkflowGraph},
        node::{Node, NodePatch},
        stats::WorkflowStats,
    },
};

#[derive(Debug, Clone)]
pub enum WorkflowAction {
    /// Replace the whole graph.
    ReplaceSnapshot(WorkflowModel),
    /// Replace the whole graph with one already validated.
    ReplaceGraph(WorkflowGraph),
    /// Merge fields over one existing node.
    PatchNode(NodePatch),
    /// Create a node, or replace the node with the same id.
    AddNode(NodeModel),
    /// Merge edges by id.
    UpsertEdges(Vec<EdgeModel>),
}

/// Outcome of an accepted action.
#[derive(Debug, Clone)]
pub struct Applied {
    pub graph: Arc<WorkflowGraph>,
    pub stats: WorkflowStats,
    pub dropped_edges: Vec<DroppedEdge>,
}

pub struct WorkflowReducer {
    graph: Arc<WorkflowGraph>,
    stats: WorkflowStats,
}

impl Default for WorkflowReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowReducer {
    pub fn new() -> Self {
        Self {
            graph: Arc::new(WorkflowGraph::new()),
            stats: WorkflowStats::default(),
        }
    }

    /// current graph
    pub fn graph(&self) -> Arc<WorkflowGraph> {
        self.graph.clone()
    }

    /// stats of the current graph
    pub fn stats(&self) -> WorkflowStats {
        self.stats
    }

    pub fn apply(
        &mut self,
        action: WorkflowAction,
    ) -> Result<Applied> {
        match Self::reduce(&self.graph, action) {
            Ok((next, dropped_edges)) => {
                for dropped in dropped_edges.iter() {
                    warn!(edge = %dropped.id, "dropping edge: {}", dropped.error);
                }

                self.graph = Arc::new(next);
                self.stats = WorkflowStats::compute(&self.graph);
                debug!(nodes = self.stats.total, edges = self.graph.edge_count(), "workflow graph updated");

                Ok(Applied {
                    graph: self.graph.clone(),
                    stats: self.stats,
                    dropped_edges,
                })
            }
            Err(e) => {
                warn!("rejecting workflow event: {}", e);
                Err(e)
            }
        }
    }

    /// Pure reducing step: builds the next graph from the current one.
    fn reduce(
        current: &WorkflowGraph,
        action: WorkflowAction,
    ) -> Result<(WorkflowGraph, Vec<DroppedEdge>)> {
        match action {
            WorkflowAction::ReplaceSnapshot(model) => WorkflowGraph::from_model(model),
            WorkflowAction::ReplaceGraph(graph) => Ok((graph, Vec::new())),
            WorkflowAction::PatchNode(patch) => {
                let node = current.node(&patch.id).ok_or_else(|| DagsyncError::MalformedEvent(format!("patch for unknown node {}", patch.id)))?;

                let mut next = current.clone();
                next.put_node(node.patched(&patch));
                let dropped = next.merge_edges(patch.edges);
                Ok((next, dropped))
            }
            WorkflowAction::AddNode(model) => {
                let node = Node::from_model(model)?;
                if current.contains_node(&node.id) {
                    debug!(node = %node.id, "node added twice, replacing");
                }

                let mut next = current.clone();
                next.put_node(node);
                Ok((next, Vec::new()))
            }
            WorkflowAction::UpsertEdges(edges) => {
                let mut next = current.clone();
                let dropped = next.merge_edges(edges);
                Ok((next, dropped))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use serde_json::json;
    use strum::IntoEnumIterator;

    use super::{WorkflowAction, WorkflowReducer};
    use crate::{
        DagsyncError,
        model::{EdgeModel, NodeModel, WorkflowModel},
        workflow::node::{NodePatch, NodeStatus},
    };

    fn snapshot(value: serde_json::Value) -> WorkflowAction {
        WorkflowAction::ReplaceSnapshot(WorkflowModel::from_value(&value).unwrap())
    }

    fn patch(value: serde_json::Value) -> WorkflowAction {
        WorkflowAction::PatchNode(NodePatch::from_payload(&value).unwrap())
    }

    fn edge(
        id: &str,
        source: &str,
        target: &str,
    ) -> EdgeModel {
        EdgeModel {
            id: id.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_snapshot_then_patch() {
        let mut reducer = WorkflowReducer::new();
        reducer.apply(snapshot(json!({"nodes": [{"id": "a", "status": "pending"}], "edges": []}))).unwrap();
        let applied = reducer.apply(patch(json!({"id": "a", "status": "running"}))).unwrap();

        assert_eq!(applied.graph.node("a").unwrap().status, NodeStatus::Running);
        assert_eq!(applied.stats.running, 1);
        assert_eq!(applied.stats.total, 1);
        for status in NodeStatus::iter().filter(|s| *s != NodeStatus::Running) {
            assert_eq!(applied.stats.count(status), 0);
        }
    }

    #[test]
    fn test_patch_unknown_node_on_empty_graph() {
        let mut reducer = WorkflowReducer::new();

        let before = reducer.graph();
        let res = reducer.apply(patch(json!({"id": "missing", "status": "failed"})));

        assert!(matches!(res, Err(DagsyncError::MalformedEvent(_))));
        assert!(reducer.graph().is_empty());
        assert!(Arc::ptr_eq(&before, &reducer.graph()));
        assert_eq!(reducer.stats().total, 0);
    }

    #[test]
    fn test_dangling_edge_dropped() {
        let mut reducer = WorkflowReducer::new();
        reducer.apply(snapshot(json!({"nodes": [{"id": "a", "status": "running"}], "edges": []}))).unwrap();
        let node_before = reducer.graph().node("a").cloned();

        let applied = reducer.apply(WorkflowAction::UpsertEdges(vec![edge("e1", "a", "z")])).unwrap();

        assert_eq!(applied.dropped_edges.len(), 1);
        assert_eq!(applied.graph.edge_count(), 0);
        assert_eq!(applied.graph.node("a").cloned(), node_before);
    }

    #[test]
    fn test_patch_is_idempotent() {
        let mut reducer = WorkflowReducer::new();
        reducer.apply(snapshot(json!({"nodes": [{"id": "a"}, {"id": "b"}], "edges": []}))).unwrap();

        let once = reducer.apply(patch(json!({"task_id": "a", "status": "completed", "output": 1}))).unwrap().graph;
        let twice = reducer.apply(patch(json!({"task_id": "a", "status": "completed", "output": 1}))).unwrap().graph;

        assert_eq!(*once, *twice);
    }

    #[test]
    fn test_patches_never_add_ids() {
        let mut reducer = WorkflowReducer::new();
        reducer.apply(snapshot(json!({"nodes": [{"id": "a"}, {"id": "b"}], "edges": []}))).unwrap();

        let events = [
            json!({"id": "a", "status": "running"}),
            json!({"id": "x", "status": "running"}),
            json!({"id": "b", "status": "dead_end"}),
            json!({"id": "y", "status": "failed"}),
            json!({"id": "a", "status": "completed"}),
        ];
        for event in events {
            let _ = reducer.apply(patch(event));
            let stats = reducer.stats();
            assert_eq!(NodeStatus::iter().map(|s| stats.count(s)).sum::<usize>(), stats.total);
            assert_eq!(stats.total, reducer.graph().node_count());
        }

        let ids: Vec<_> = reducer.graph().node_ids().cloned().collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_any_status_transition_is_accepted() {
        let mut reducer = WorkflowReducer::new();
        reducer.apply(snapshot(json!({"nodes": [{"id": "a", "status": "completed"}], "edges": []}))).unwrap();

        for status in ["pending", "failed", "running", "hitl_required", "completed", "dead_end"] {
            let applied = reducer.apply(patch(json!({"id": "a", "status": status}))).unwrap();
            assert_eq!(applied.graph.node("a").unwrap().status.as_ref(), status);
        }
    }

    #[test]
    fn test_prior_graph_is_not_mutated() {
        let mut reducer = WorkflowReducer::new();
        reducer.apply(snapshot(json!({"nodes": [{"id": "a"}], "edges": []}))).unwrap();
        let held = reducer.graph();

        reducer.apply(patch(json!({"id": "a", "status": "running"}))).unwrap();

        assert_eq!(held.node("a").unwrap().status, NodeStatus::Pending);
        assert_eq!(reducer.graph().node("a").unwrap().status, NodeStatus::Running);
    }

    #[test]
    fn test_patch_with_edges() {
        let mut reducer = WorkflowReducer::new();
        reducer.apply(snapshot(json!({"nodes": [{"id": "a"}, {"id": "b"}], "edges": []}))).unwrap();

        let applied = reducer
            .apply(patch(json!({
                "task_id": "a",
                "status": "completed",
                "edges": [
                    {"id": "e1", "source": "a", "target": "b", "animated": true},
                    {"id": "e2", "source": "a", "target": "nowhere"}
                ]
            })))
            .unwrap();

        assert_eq!(applied.graph.edge_count(), 1);
        assert!(applied.graph.edge("e1").unwrap().animated);
        assert_eq!(applied.dropped_edges[0].id, "e2");
    }

    #[test]
    fn test_add_node_then_edge() {
        let mut reducer = WorkflowReducer::new();
        reducer.apply(snapshot(json!({"nodes": [{"id": "a"}], "edges": []}))).unwrap();

        let node: NodeModel = serde_json::from_value(json!({"id": "b", "type": "end", "status": "pending"})).unwrap();
        reducer.apply(WorkflowAction::AddNode(node)).unwrap();
        let applied = reducer.apply(WorkflowAction::UpsertEdges(vec![edge("e1", "a", "b")])).unwrap();

        assert_eq!(applied.stats.total, 2);
        assert_eq!(applied.graph.edge_count(), 1);
    }

    #[test]
    fn test_snapshot_replaces_everything() {
        let mut reducer = WorkflowReducer::new();
        reducer.apply(snapshot(json!({"nodes": [{"id": "a"}, {"id": "b"}], "edges": [{"id": "e", "source": "a", "target": "b"}]}))).unwrap();
        let applied = reducer.apply(snapshot(json!({"nodes": [{"id": "c", "status": "failed"}], "edges": []}))).unwrap();

        assert!(!applied.graph.contains_node("a"));
        assert_eq!(applied.graph.edge_count(), 0);
        assert_eq!(applied.stats.failed, 1);
    }
}
