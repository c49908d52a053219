use crate::graph::SemanticGraph;
use crate::types::{EdgeType, EdgeView, NodeId};
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::Direction;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};

/// Nodes within `depth` hops on either side of a centre node.
#[derive(Debug, Clone, Serialize)]
pub struct ImpactRadius {
    pub node: NodeId,
    /// Reached along incoming edges (things that depend on `node`).
    pub upstream: Vec<NodeId>,
    /// Reached along outgoing edges (things `node` depends on).
    pub downstream: Vec<NodeId>,
    /// Distinct nodes across both directions.
    pub scope_size: usize,
}

/// Bounded induced subgraph around a node.
#[derive(Debug, Clone, Serialize)]
pub struct ContextRadius {
    pub center: NodeId,
    pub depth: usize,
    /// Centre first, then the union of both directions in discovery order.
    pub nodes: Vec<NodeId>,
    /// Every edge whose endpoints both lie in `nodes`.
    pub edges: Vec<EdgeView>,
}

/// Edges of one cycle, starting at the node the back edge points to.
pub type Cycle = Vec<EdgeView>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

impl SemanticGraph {
    /// Nodes reachable along outgoing edges within `depth` hops.
    pub fn forward_dependencies(&self, node: &NodeId, depth: usize) -> Vec<NodeId> {
        self.reach_ids(node, depth, Direction::Outgoing)
    }

    /// Nodes reaching `node` along incoming edges within `depth` hops.
    pub fn backward_dependencies(&self, node: &NodeId, depth: usize) -> Vec<NodeId> {
        self.reach_ids(node, depth, Direction::Incoming)
    }

    fn reach_ids(&self, node: &NodeId, depth: usize, dir: Direction) -> Vec<NodeId> {
        let Some(start) = self.find(node) else {
            return Vec::new();
        };
        self.reach(start, depth, dir)
            .into_iter()
            .map(|idx| self.id_at(idx).clone())
            .collect()
    }

    /// Breadth-first reachability; each node is expanded at most once and the
    /// start node is never reported.
    pub(crate) fn reach(&self, start: NodeIndex, depth: usize, dir: Direction) -> Vec<NodeIndex> {
        let mut found = Vec::new();
        if depth == 0 {
            return found;
        }

        let mut visited: HashSet<NodeIndex> = HashSet::from([start]);
        let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::from([(start, 0)]);

        while let Some((current, hops)) = queue.pop_front() {
            if hops >= depth {
                continue;
            }
            for (_, next) in self.adjacent(current, dir) {
                if visited.insert(next) {
                    found.push(next);
                    queue.push_back((next, hops + 1));
                }
            }
        }

        found
    }

    pub fn impact_radius(&self, node: &NodeId, depth: usize) -> ImpactRadius {
        let upstream = self.backward_dependencies(node, depth);
        let downstream = self.forward_dependencies(node, depth);
        let scope_size = upstream
            .iter()
            .chain(downstream.iter())
            .collect::<HashSet<_>>()
            .len();

        ImpactRadius {
            node: node.clone(),
            upstream,
            downstream,
            scope_size,
        }
    }

    pub fn context_radius(&self, node: &NodeId, depth: usize) -> ContextRadius {
        let mut radius = ContextRadius {
            center: node.clone(),
            depth,
            nodes: Vec::new(),
            edges: Vec::new(),
        };
        let Some(start) = self.find(node) else {
            return radius;
        };

        let mut members: Vec<NodeIndex> = vec![start];
        let mut seen: HashSet<NodeIndex> = HashSet::from([start]);
        let backward = self.reach(start, depth, Direction::Incoming);
        let forward = self.reach(start, depth, Direction::Outgoing);
        for idx in backward.into_iter().chain(forward) {
            if seen.insert(idx) {
                members.push(idx);
            }
        }

        let mut edge_ids: Vec<EdgeIndex> = members
            .iter()
            .flat_map(|&idx| self.adjacent(idx, Direction::Outgoing))
            .filter(|(_, target)| seen.contains(target))
            .map(|(e, _)| e)
            .collect();
        edge_ids.sort_by_key(|e| e.index());

        radius.nodes = members.iter().map(|&idx| self.id_at(idx).clone()).collect();
        radius.edges = edge_ids.into_iter().filter_map(|e| self.edge_view(e)).collect();
        radius
    }

    /// Every simple path from `from` to `to` using at most `max_depth` edges.
    ///
    /// Paths come back in depth-first discovery order. `from == to` yields the
    /// single zero-length path.
    pub fn find_paths(&self, from: &NodeId, to: &NodeId, max_depth: usize) -> Vec<Vec<NodeId>> {
        let (Some(start), Some(goal)) = (self.find(from), self.find(to)) else {
            return Vec::new();
        };
        if start == goal {
            return vec![vec![from.clone()]];
        }

        let mut paths = Vec::new();
        let mut path = vec![start];
        let mut on_path: HashSet<NodeIndex> = HashSet::from([start]);
        self.walk_paths(goal, max_depth, &mut path, &mut on_path, &mut paths);

        paths
            .into_iter()
            .map(|p| p.into_iter().map(|idx| self.id_at(idx).clone()).collect())
            .collect()
    }

    fn walk_paths(
        &self,
        goal: NodeIndex,
        max_depth: usize,
        path: &mut Vec<NodeIndex>,
        on_path: &mut HashSet<NodeIndex>,
        paths: &mut Vec<Vec<NodeIndex>>,
    ) {
        // path holds nodes; edges used so far = len - 1
        if path.len() > max_depth {
            return;
        }
        let Some(&current) = path.last() else {
            return;
        };

        for (_, next) in self.adjacent(current, Direction::Outgoing) {
            if next == goal {
                let mut found = path.clone();
                found.push(next);
                paths.push(found);
                continue;
            }
            if on_path.insert(next) {
                path.push(next);
                self.walk_paths(goal, max_depth, path, on_path, paths);
                path.pop();
                on_path.remove(&next);
            }
        }
    }

    /// Three-colour DFS over every edge; one cycle per back edge.
    ///
    /// The same loop can be reported several times when it is entered through
    /// different edges; each report names the back edge that closed it.
    pub fn detect_cycles(&self) -> Vec<Cycle> {
        self.detect_cycles_by(|_| true)
    }

    /// Like [`detect_cycles`](Self::detect_cycles) but only follows edges
    /// whose type passes `follow`.
    pub fn detect_cycles_by(&self, follow: impl Fn(EdgeType) -> bool) -> Vec<Cycle> {
        let mut color = vec![Color::White; self.node_count()];
        let mut cycles = Vec::new();

        for root in self.node_indices() {
            if color[root.index()] != Color::White {
                continue;
            }

            // (node, outgoing edges, next position); entry[i] is the edge into stack[i + 1]
            let mut stack: Vec<(NodeIndex, Vec<(EdgeIndex, NodeIndex)>, usize)> = Vec::new();
            let mut entry: Vec<EdgeIndex> = Vec::new();
            color[root.index()] = Color::Gray;
            stack.push((root, self.followed(root, &follow), 0));

            while let Some((node, edges, pos)) = stack.last_mut() {
                if *pos >= edges.len() {
                    color[node.index()] = Color::Black;
                    stack.pop();
                    entry.pop();
                    continue;
                }
                let (edge, next) = edges[*pos];
                *pos += 1;

                match color[next.index()] {
                    Color::White => {
                        color[next.index()] = Color::Gray;
                        entry.push(edge);
                        let next_edges = self.followed(next, &follow);
                        stack.push((next, next_edges, 0));
                    }
                    Color::Gray => {
                        let Some(start) = stack.iter().position(|(n, _, _)| *n == next) else {
                            continue;
                        };
                        let cycle: Cycle = entry[start..]
                            .iter()
                            .chain(std::iter::once(&edge))
                            .filter_map(|&e| self.edge_view(e))
                            .collect();
                        cycles.push(cycle);
                    }
                    Color::Black => {}
                }
            }
        }

        cycles
    }

    fn followed(
        &self,
        node: NodeIndex,
        follow: &impl Fn(EdgeType) -> bool,
    ) -> Vec<(EdgeIndex, NodeIndex)> {
        self.adjacent(node, Direction::Outgoing)
            .into_iter()
            .filter(|(e, _)| follow(self.edge_weight(*e).edge_type))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EdgeAttributes, NodeAttributes, NodeKind};
    use pretty_assertions::assert_eq;

    fn graph_with(names: &[&str], calls: &[(&str, &str)]) -> SemanticGraph {
        let mut graph = SemanticGraph::new();
        for name in names {
            graph.add_node(id(name), NodeAttributes::empty(NodeKind::Method));
        }
        for (from, to) in calls {
            graph
                .add_edge(&id(from), &id(to), EdgeType::Calls, EdgeAttributes::None)
                .unwrap();
        }
        graph
    }

    fn id(name: &str) -> NodeId {
        NodeId::method("U", name)
    }

    fn names(ids: &[NodeId]) -> Vec<&str> {
        ids.iter().map(|i| i.short_name()).collect()
    }

    #[test]
    fn depth_zero_is_empty() {
        let graph = graph_with(&["a", "b"], &[("a", "b")]);
        assert!(graph.forward_dependencies(&id("a"), 0).is_empty());
        assert!(graph.backward_dependencies(&id("b"), 0).is_empty());
    }

    #[test]
    fn depth_counts_hops() {
        let graph = graph_with(&["a", "b", "c", "d"], &[("a", "b"), ("b", "c"), ("c", "d")]);
        assert_eq!(names(&graph.forward_dependencies(&id("a"), 1)), vec!["b"]);
        assert_eq!(names(&graph.forward_dependencies(&id("a"), 2)), vec!["b", "c"]);
        assert_eq!(names(&graph.backward_dependencies(&id("d"), 3)), vec!["c", "b", "a"]);
    }

    #[test]
    fn two_cycle_terminates_without_revisits() {
        let graph = graph_with(&["a", "b"], &[("a", "b"), ("b", "a")]);
        assert_eq!(names(&graph.forward_dependencies(&id("a"), 5)), vec!["b"]);

        let cycles = graph.detect_cycles();
        assert!(!cycles.is_empty());
        assert!(cycles.iter().all(|c| !c.is_empty()));
        assert_eq!(cycles[0].len(), 2);
        assert_eq!(cycles[0][0].from, id("a"));
        assert_eq!(cycles[0][1].to, id("a"));
    }

    #[test]
    fn self_loop_is_a_single_edge_cycle() {
        let graph = graph_with(&["a"], &[("a", "a")]);
        let cycles = graph.detect_cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), 1);
    }

    #[test]
    fn acyclic_graph_reports_nothing() {
        let graph = graph_with(&["a", "b", "c"], &[("a", "b"), ("a", "c"), ("b", "c")]);
        assert!(graph.detect_cycles().is_empty());
    }

    #[test]
    fn impact_radius_counts_distinct_nodes() {
        let graph = graph_with(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a")]);
        let radius = graph.impact_radius(&id("b"), 2);
        assert_eq!(names(&radius.upstream), vec!["a", "c"]);
        assert_eq!(names(&radius.downstream), vec!["c", "a"]);
        assert_eq!(radius.scope_size, 2);
    }

    #[test]
    fn context_radius_keeps_only_induced_edges() {
        let graph = graph_with(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("b", "c"), ("c", "d"), ("a", "c")],
        );
        let radius = graph.context_radius(&id("b"), 1);
        assert_eq!(names(&radius.nodes), vec!["b", "a", "c"]);
        let pairs: Vec<(&str, &str)> = radius
            .edges
            .iter()
            .map(|e| (e.from.short_name(), e.to.short_name()))
            .collect();
        assert_eq!(pairs, vec![("a", "b"), ("b", "c"), ("a", "c")]);
    }

    #[test]
    fn find_paths_returns_all_simple_paths_within_depth() {
        let graph = graph_with(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("b", "d"), ("a", "c"), ("c", "b"), ("a", "d")],
        );
        let found = graph.find_paths(&id("a"), &id("d"), 3);
        let paths: Vec<Vec<&str>> = found.iter().map(|p| names(p)).collect();
        assert_eq!(
            paths,
            vec![vec!["a", "b", "d"], vec!["a", "c", "b", "d"], vec!["a", "d"]]
        );

        let short = graph.find_paths(&id("a"), &id("d"), 1);
        assert_eq!(short.len(), 1);
        assert!(graph.find_paths(&id("d"), &id("a"), 5).is_empty());
    }

    #[test]
    fn unknown_nodes_yield_empty_results() {
        let graph = graph_with(&["a"], &[]);
        let ghost = id("ghost");
        assert!(graph.forward_dependencies(&ghost, 3).is_empty());
        assert!(graph.find_paths(&ghost, &id("a"), 3).is_empty());
        assert!(graph.context_radius(&ghost, 2).nodes.is_empty());
    }
}
