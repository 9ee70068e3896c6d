//! Immutable workflow graph.
//!
//! A `WorkflowGraph` value never changes once built. Reducer steps produce new
//! graphs that share unchanged nodes and edges through `Arc`.

use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;
use tracing::warn;

use crate::{
    DagsyncError, Result,
    model::{EdgeModel, WorkflowModel},
    workflow::{
        edge::{Edge, EdgeId},
        node::{Node, NodeId},
    },
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkflowGraph {
    nodes: BTreeMap<NodeId, Arc<Node>>,
    edges: Vec<Arc<Edge>>,
}

/// An edge that was not applied because an endpoint is missing.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedEdge {
    pub id: EdgeId,
    pub error: DagsyncError,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from a snapshot.
    ///
    /// Any invalid node fails the whole snapshot. Edges with a missing endpoint
    /// are dropped and returned alongside the graph.
    pub fn from_model(model: WorkflowModel) -> Result<(Self, Vec<DroppedEdge>)> {
        let mut graph = WorkflowGraph::new();

        for node_model in model.nodes {
            let node = Node::from_model(node_model)?;
            if graph.nodes.contains_key(&node.id) {
                warn!(node = %node.id, "duplicate node id in snapshot, keeping the last one");
            }
            graph.nodes.insert(node.id.clone(), Arc::new(node));
        }

        let dropped = graph.merge_edges(model.edges);
        Ok((graph, dropped))
    }

    pub fn node(
        &self,
        id: &str,
    ) -> Option<&Node> {
        self.nodes.get(id).map(Arc::as_ref)
    }

    pub fn contains_node(
        &self,
        id: &str,
    ) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().map(Arc::as_ref)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge(
        &self,
        id: &str,
    ) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id).map(Arc::as_ref)
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().map(Arc::as_ref)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Outgoing edges of a node, in edge order.
    pub fn outgoing(
        &self,
        id: &str,
    ) -> impl Iterator<Item = &Edge> {
        self.edges().filter(move |e| e.source == id)
    }

    /// Stores a node, replacing any node with the same id.
    pub(crate) fn put_node(
        &mut self,
        node: Node,
    ) {
        self.nodes.insert(node.id.clone(), Arc::new(node));
    }

    /// Merges edges by id: a known id is replaced in place, a new id is appended.
    pub(crate) fn merge_edges(
        &mut self,
        edges: Vec<EdgeModel>,
    ) -> Vec<DroppedEdge> {
        let mut dropped = Vec::new();

        for model in edges {
            let edge = Edge::from(model);
            if let Err(error) = self.check_endpoints(&edge) {
                dropped.push(DroppedEdge {
                    id: edge.id,
                    error,
                });
                continue;
            }

            match self.edges.iter().position(|e| e.id == edge.id) {
                Some(idx) => self.edges[idx] = Arc::new(edge),
                None => self.edges.push(Arc::new(edge)),
            }
        }

        dropped
    }

    fn check_endpoints(
        &self,
        edge: &Edge,
    ) -> Result<()> {
        for endpoint in [&edge.source, &edge.target] {
            if !self.nodes.contains_key(endpoint) {
                return Err(DagsyncError::MalformedEvent(format!("edge {} references unknown node {}", edge.id, endpoint)));
            }
        }
        Ok(())
    }

    /// Multi-line dump used in logs and tests.
    pub fn schema(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Nodes: {}, Edges: {}", self.node_count(), self.edge_count()));
        for node in self.nodes() {
            lines.push(format!("[{}] {} ({})", node.id, node.kind.as_ref(), node.status.as_ref()));
        }
        for edge in self.edges() {
            lines.push(format!("{} --> {} (id: {})", edge.source, edge.target, edge.id));
        }

        lines.join("\n")
    }
}
