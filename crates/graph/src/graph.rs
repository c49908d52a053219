use crate::error::{GraphError, Result};
use crate::types::{EdgeAttributes, EdgeType, EdgeView, GraphEdge, GraphNode, NodeAttributes, NodeId, NodeKind};
use chrono::Utc;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use std::collections::HashMap;

/// Typed dependency graph over program elements.
///
/// Nodes live in one flat arena addressed by [`NodeIndex`]; `index` maps node
/// identity to that slot. The petgraph adjacency lists are the outgoing and
/// incoming indexes, so they can never drift from the edge set. Nothing is
/// ever removed, so indices are stable and ascending in insertion order.
#[derive(Debug, Default)]
pub struct SemanticGraph {
    graph: DiGraph<GraphNode, GraphEdge>,
    index: HashMap<NodeId, NodeIndex>,
}

impl SemanticGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Re-adding an existing identity is a no-op that keeps the
    /// first payload.
    pub fn add_node(&mut self, id: NodeId, attributes: NodeAttributes) -> NodeIndex {
        if let Some(&idx) = self.index.get(&id) {
            return idx;
        }
        let idx = self.graph.add_node(GraphNode {
            id: id.clone(),
            attributes,
            created_at: Utc::now(),
        });
        self.index.insert(id, idx);
        idx
    }

    /// Add an edge between two existing nodes.
    ///
    /// Returns `Ok(false)` if an edge of the same type already joins the pair.
    /// Fails when either endpoint has not been added.
    pub fn add_edge(
        &mut self,
        from: &NodeId,
        to: &NodeId,
        edge_type: EdgeType,
        attributes: EdgeAttributes,
    ) -> Result<bool> {
        let a = self
            .find(from)
            .ok_or_else(|| GraphError::missing_endpoint(from, to, edge_type, from))?;
        let b = self
            .find(to)
            .ok_or_else(|| GraphError::missing_endpoint(from, to, edge_type, to))?;

        if self
            .graph
            .edges_connecting(a, b)
            .any(|e| e.weight().edge_type == edge_type)
        {
            return Ok(false);
        }

        self.graph.add_edge(
            a,
            b,
            GraphEdge {
                edge_type,
                attributes,
            },
        );
        Ok(true)
    }

    pub fn find(&self, id: &NodeId) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }

    pub fn node(&self, id: &NodeId) -> Option<&GraphNode> {
        self.find(id).and_then(|idx| self.graph.node_weight(idx))
    }

    pub(crate) fn id_at(&self, idx: NodeIndex) -> &NodeId {
        &self.graph[idx].id
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.graph.node_weights()
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &GraphNode> {
        self.nodes().filter(move |n| n.id.kind == kind)
    }

    pub(crate) fn node_indices(&self) -> impl Iterator<Item = NodeIndex> {
        self.graph.node_indices()
    }

    /// Adjacent `(edge, neighbour)` pairs in edge insertion order.
    pub(crate) fn adjacent(&self, idx: NodeIndex, dir: Direction) -> Vec<(EdgeIndex, NodeIndex)> {
        let mut out: Vec<(EdgeIndex, NodeIndex)> = self
            .graph
            .edges_directed(idx, dir)
            .map(|e| {
                let other = match dir {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                (e.id(), other)
            })
            .collect();
        // petgraph walks its adjacency lists newest-first
        out.sort_by_key(|(e, _)| e.index());
        out
    }

    pub(crate) fn edge_weight(&self, edge: EdgeIndex) -> &GraphEdge {
        &self.graph[edge]
    }

    pub(crate) fn edge_view(&self, edge: EdgeIndex) -> Option<EdgeView> {
        let (a, b) = self.graph.edge_endpoints(edge)?;
        let weight = &self.graph[edge];
        Some(EdgeView {
            from: self.id_at(a).clone(),
            to: self.id_at(b).clone(),
            edge_type: weight.edge_type,
            attributes: weight.attributes.clone(),
        })
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> Vec<EdgeView> {
        self.graph
            .edge_indices()
            .filter_map(|e| self.edge_view(e))
            .collect()
    }

    pub fn outgoing(&self, id: &NodeId) -> Vec<EdgeView> {
        self.edges_in_direction(id, Direction::Outgoing)
    }

    pub fn incoming(&self, id: &NodeId) -> Vec<EdgeView> {
        self.edges_in_direction(id, Direction::Incoming)
    }

    fn edges_in_direction(&self, id: &NodeId, dir: Direction) -> Vec<EdgeView> {
        let Some(idx) = self.find(id) else {
            return Vec::new();
        };
        self.adjacent(idx, dir)
            .into_iter()
            .filter_map(|(e, _)| self.edge_view(e))
            .collect()
    }

    /// First edge of `edge_type` from `from` to `to`.
    pub fn edge_between(&self, from: &NodeId, to: &NodeId, edge_type: EdgeType) -> Option<EdgeView> {
        let a = self.find(from)?;
        let b = self.find(to)?;
        self.graph
            .edges_connecting(a, b)
            .find(|e| e.weight().edge_type == edge_type)
            .and_then(|e| self.edge_view(e.id()))
    }

    pub fn in_degree(&self, id: &NodeId) -> usize {
        self.find(id)
            .map(|idx| self.graph.edges_directed(idx, Direction::Incoming).count())
            .unwrap_or(0)
    }

    pub fn out_degree(&self, id: &NodeId) -> usize {
        self.find(id)
            .map(|idx| self.graph.edges_directed(idx, Direction::Outgoing).count())
            .unwrap_or(0)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Serializable copy of the whole graph.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self
                .nodes()
                .map(|n| NodeView {
                    id: n.id.to_string(),
                    kind: n.id.kind,
                    name: n.id.name.clone(),
                    attributes: n.attributes.clone(),
                    created_at: n.created_at.to_rfc3339(),
                })
                .collect(),
            edges: self.edges(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeView {
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    pub attributes: NodeAttributes,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeView>,
    pub edges: Vec<EdgeView>,
}

impl GraphSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MethodAttributes, UnitAttributes};
    use pretty_assertions::assert_eq;

    fn method(complexity: u32) -> NodeAttributes {
        NodeAttributes::Method(MethodAttributes {
            complexity,
            ..Default::default()
        })
    }

    #[test]
    fn add_node_keeps_first_payload() {
        let mut graph = SemanticGraph::new();
        let id = NodeId::method("Handler", "save");
        let first = graph.add_node(id.clone(), method(3));
        let second = graph.add_node(id.clone(), method(9));

        assert_eq!(first, second);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.node(&id).and_then(|n| n.attributes.complexity()), Some(3));
    }

    #[test]
    fn add_edge_requires_both_endpoints() {
        let mut graph = SemanticGraph::new();
        let unit = NodeId::unit("Handler");
        let save = NodeId::method("Handler", "save");
        graph.add_node(unit.clone(), NodeAttributes::Unit(UnitAttributes::default()));

        let err = graph
            .add_edge(&unit, &save, EdgeType::Contains, EdgeAttributes::None)
            .expect_err("target missing");
        match err {
            GraphError::MissingEndpoint { missing, .. } => assert_eq!(missing, save),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn duplicate_edges_are_ignored_per_type() {
        let mut graph = SemanticGraph::new();
        let a = NodeId::method("U", "a");
        let b = NodeId::method("U", "b");
        graph.add_node(a.clone(), method(1));
        graph.add_node(b.clone(), method(1));

        assert!(graph.add_edge(&a, &b, EdgeType::Calls, EdgeAttributes::None).unwrap());
        assert!(!graph.add_edge(&a, &b, EdgeType::Calls, EdgeAttributes::None).unwrap());
        assert!(graph.add_edge(&a, &b, EdgeType::UsesField, EdgeAttributes::None).unwrap());
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn adjacency_matches_edge_set() {
        let mut graph = SemanticGraph::new();
        let ids: Vec<NodeId> = ["a", "b", "c"].iter().map(|n| NodeId::method("U", n)).collect();
        for id in &ids {
            graph.add_node(id.clone(), method(1));
        }
        let pairs = [(0, 1), (1, 2), (2, 0), (0, 2), (0, 1)];
        for (from, to) in pairs {
            graph
                .add_edge(&ids[from], &ids[to], EdgeType::Calls, EdgeAttributes::None)
                .unwrap();
        }

        let edges = graph.edges();
        assert_eq!(edges.len(), 4);
        for edge in &edges {
            assert_eq!(graph.outgoing(&edge.from).iter().filter(|e| *e == edge).count(), 1);
            assert_eq!(graph.incoming(&edge.to).iter().filter(|e| *e == edge).count(), 1);
        }
        for id in &ids {
            for e in graph.outgoing(id) {
                assert!(edges.contains(&e));
                assert_eq!(&e.from, id);
            }
            for e in graph.incoming(id) {
                assert!(edges.contains(&e));
                assert_eq!(&e.to, id);
            }
        }
    }

    #[test]
    fn snapshot_serializes_ids_as_strings() {
        let mut graph = SemanticGraph::new();
        let unit = NodeId::unit("Handler");
        let save = NodeId::method("Handler", "save");
        graph.add_node(unit.clone(), NodeAttributes::Unit(UnitAttributes::default()));
        graph.add_node(save.clone(), method(2));
        graph
            .add_edge(&unit, &save, EdgeType::Contains, EdgeAttributes::None)
            .unwrap();

        let json = graph.snapshot().to_json().expect("serializable");
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["edges"][0]["from"], "unit:Handler");
        assert_eq!(value["edges"][0]["to"], "method:Handler.save");
        assert_eq!(value["edges"][0]["type"], "contains");
        assert_eq!(value["nodes"][1]["kind"], "method");
        assert_eq!(value["nodes"][1]["attributes"]["complexity"], 2);
    }
}
