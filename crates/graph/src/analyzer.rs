//! Read-only metrics over a finished [`SemanticGraph`].

use crate::config::AnalysisDefaults;
use crate::graph::SemanticGraph;
use crate::resolver::{ImpactMap, ReferenceResolver};
use crate::traversal::ContextRadius;
use crate::types::{EdgeType, NodeId, NodeKind, RiskLevel};
use serde::Serialize;

/// Fixed per-kind weight used by impact scoring and hotspot ranking.
pub fn base_weight(kind: NodeKind) -> u32 {
    match kind {
        NodeKind::ExternalRecordType => 10,
        NodeKind::Unit => 8,
        NodeKind::Method => 5,
        NodeKind::Field => 3,
        NodeKind::RecordField => 2,
    }
}

/// Impact band for a score: `low < 5`, `medium < 15`, `high < 30`, otherwise critical.
pub fn impact_level(score: u32) -> RiskLevel {
    match score {
        0..=4 => RiskLevel::Low,
        5..=14 => RiskLevel::Medium,
        15..=29 => RiskLevel::High,
        _ => RiskLevel::Critical,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactAnalysis {
    pub node: NodeId,
    pub depth: usize,
    pub upstream: Vec<NodeId>,
    pub downstream: Vec<NodeId>,
    /// Distinct nodes across both directions
    pub affected: usize,
    pub score: u32,
    pub level: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hotspot {
    pub node: NodeId,
    pub in_degree: usize,
    pub out_degree: usize,
    pub criticality: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CohesionLevel {
    Low,
    Medium,
    High,
}

impl CohesionLevel {
    pub fn from_score(cohesion: f64) -> Self {
        if cohesion < 33.0 {
            Self::Low
        } else if cohesion < 66.0 {
            Self::Medium
        } else {
            Self::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohesionReport {
    pub unit: String,
    pub method_count: usize,
    pub field_count: usize,
    /// `(field, number of methods using it)` in declaration order
    pub field_usage: Vec<(String, usize)>,
    pub average_usage: f64,
    /// 0–100
    pub cohesion: f64,
    pub level: CohesionLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CouplingEntry {
    pub unit: String,
    pub record_types: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueReport {
    /// Methods whose only incoming edge is their containment edge.
    pub dead_methods: Vec<NodeId>,
    /// Fields whose only incoming edge is their containment edge.
    pub unused_fields: Vec<NodeId>,
    /// Loops in the call graph; each lists the methods in call order.
    pub call_cycles: Vec<Vec<NodeId>>,
}

impl IssueReport {
    pub fn is_clean(&self) -> bool {
        self.dead_methods.is_empty() && self.unused_fields.is_empty() && self.call_cycles.is_empty()
    }
}

/// Positional five-number summary; no interpolation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FiveNumberSummary {
    pub min: u32,
    pub q1: u32,
    pub median: u32,
    pub q3: u32,
    pub max: u32,
}

impl FiveNumberSummary {
    /// `sorted` must be ascending.
    pub fn from_sorted(sorted: &[u32]) -> Self {
        let n = sorted.len();
        if n == 0 {
            return Self::default();
        }
        Self {
            min: sorted[0],
            q1: sorted[n / 4],
            median: sorted[n / 2],
            q3: sorted[3 * n / 4],
            max: sorted[n - 1],
        }
    }
}

/// Method counts per complexity rating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ComplexityDistribution {
    /// 0–5
    pub simple: usize,
    /// 6–10
    pub moderate: usize,
    /// 11–20
    pub complex: usize,
    /// 21+
    pub very_complex: usize,
}

impl ComplexityDistribution {
    fn record(&mut self, complexity: u32) {
        match complexity {
            0..=5 => self.simple += 1,
            6..=10 => self.moderate += 1,
            11..=20 => self.complex += 1,
            _ => self.very_complex += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComplexityReport {
    pub method_count: usize,
    pub average: f64,
    pub max: u32,
    pub summary: FiveNumberSummary,
    pub distribution: ComplexityDistribution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallPath {
    pub from: NodeId,
    pub to: NodeId,
    pub path: Vec<NodeId>,
    /// Number of edges
    pub length: usize,
}

/// Analysis queries over a sealed graph and, optionally, the resolver that
/// added its call edges.
pub struct GraphAnalyzer<'a> {
    graph: &'a SemanticGraph,
    resolver: Option<&'a ReferenceResolver>,
    defaults: AnalysisDefaults,
}

impl<'a> GraphAnalyzer<'a> {
    pub fn new(graph: &'a SemanticGraph) -> Self {
        Self {
            graph,
            resolver: None,
            defaults: AnalysisDefaults::default(),
        }
    }

    pub fn with_resolver(mut self, resolver: &'a ReferenceResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_defaults(mut self, defaults: AnalysisDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Depths and limits callers can fall back on.
    pub fn defaults(&self) -> &AnalysisDefaults {
        &self.defaults
    }

    /// Risk score from the nodes within `depth` hops of `node`.
    ///
    /// `score = round(weight × min(affected / 5, 3))`. Returns `None` for an
    /// unknown node.
    pub fn analyze_impact(&self, node: &NodeId, depth: usize) -> Option<ImpactAnalysis> {
        if !self.graph.contains_node(node) {
            return None;
        }
        let radius = self.graph.impact_radius(node, depth);
        let factor = (radius.scope_size as f64 / 5.0).min(3.0);
        let score = (f64::from(base_weight(node.kind)) * factor).round() as u32;

        Some(ImpactAnalysis {
            node: node.clone(),
            depth,
            upstream: radius.upstream,
            downstream: radius.downstream,
            affected: radius.scope_size,
            score,
            level: impact_level(score),
        })
    }

    /// Nodes ranked by `(in × 2 + out) × weight`, ties kept in insertion order.
    pub fn find_hotspots(&self, limit: usize) -> Vec<Hotspot> {
        let mut hotspots: Vec<Hotspot> = self
            .graph
            .nodes()
            .map(|node| {
                let in_degree = self.graph.in_degree(&node.id);
                let out_degree = self.graph.out_degree(&node.id);
                let weighted = (in_degree * 2 + out_degree) as u32;
                Hotspot {
                    node: node.id.clone(),
                    in_degree,
                    out_degree,
                    criticality: weighted * base_weight(node.id.kind),
                }
            })
            .collect();

        // sort_by is stable
        hotspots.sort_by(|a, b| b.criticality.cmp(&a.criticality));
        hotspots.truncate(limit);
        hotspots
    }

    /// How evenly a unit's methods share its fields. `None` for an unknown unit.
    pub fn analyze_class_cohesion(&self, unit: &str) -> Option<CohesionReport> {
        let unit_id = NodeId::unit(unit);
        if !self.graph.contains_node(&unit_id) {
            return None;
        }

        let members: Vec<NodeId> = self
            .graph
            .outgoing(&unit_id)
            .into_iter()
            .filter(|e| e.edge_type == EdgeType::Contains)
            .map(|e| e.to)
            .collect();
        let method_count = members.iter().filter(|m| m.kind == NodeKind::Method).count();

        let field_usage: Vec<(String, usize)> = members
            .iter()
            .filter(|m| m.kind == NodeKind::Field)
            .map(|field| {
                let users = self
                    .graph
                    .incoming(field)
                    .into_iter()
                    .filter(|e| e.edge_type == EdgeType::UsesField && e.from.kind == NodeKind::Method)
                    .count();
                (field.short_name().to_string(), users)
            })
            .collect();
        let field_count = field_usage.len();

        let (average_usage, cohesion) = if method_count == 0 || field_count == 0 {
            (0.0, 0.0)
        } else {
            let total: usize = field_usage.iter().map(|(_, n)| n).sum();
            let average = total as f64 / field_count as f64;
            (average, (average / method_count as f64 * 100.0).min(100.0))
        };

        Some(CohesionReport {
            unit: unit.to_string(),
            method_count,
            field_count,
            field_usage,
            average_usage,
            cohesion,
            level: CohesionLevel::from_score(cohesion),
        })
    }

    /// Units ranked by the number of distinct record types they access.
    pub fn find_class_coupling(&self, limit: usize) -> Vec<CouplingEntry> {
        let mut entries: Vec<CouplingEntry> = self
            .graph
            .nodes_of_kind(NodeKind::Unit)
            .map(|unit| {
                let mut record_types: Vec<String> = Vec::new();
                for edge in self.graph.outgoing(&unit.id) {
                    if edge.edge_type == EdgeType::Accesses && !record_types.contains(&edge.to.name) {
                        record_types.push(edge.to.name);
                    }
                }
                CouplingEntry {
                    unit: unit.id.name.clone(),
                    count: record_types.len(),
                    record_types,
                }
            })
            .collect();

        entries.sort_by(|a, b| b.count.cmp(&a.count));
        entries.truncate(limit);
        entries
    }

    /// Dead methods, unused fields and call cycles.
    ///
    /// Only edges inside the analysed batch count, so a public method with
    /// no caller in the batch is reported dead.
    pub fn detect_issues(&self) -> IssueReport {
        let graph = self.graph;
        let dead_methods = graph
            .nodes_of_kind(NodeKind::Method)
            .filter(|m| {
                let incoming = graph.incoming(&m.id);
                incoming.len() == 1 && incoming.iter().all(|e| e.edge_type != EdgeType::Calls)
            })
            .map(|m| m.id.clone())
            .collect();

        let unused_fields = graph
            .nodes_of_kind(NodeKind::Field)
            .filter(|f| graph.in_degree(&f.id) == 1)
            .map(|f| f.id.clone())
            .collect();

        let call_cycles = graph
            .detect_cycles_by(|t| t == EdgeType::Calls)
            .into_iter()
            .map(|cycle| cycle.into_iter().map(|e| e.from).collect())
            .collect();

        IssueReport {
            dead_methods,
            unused_fields,
            call_cycles,
        }
    }

    pub fn generate_complexity_report(&self) -> ComplexityReport {
        let mut scores: Vec<u32> = self
            .graph
            .nodes_of_kind(NodeKind::Method)
            .filter_map(|m| m.attributes.complexity())
            .collect();
        if scores.is_empty() {
            return ComplexityReport::default();
        }
        scores.sort_unstable();

        let mut distribution = ComplexityDistribution::default();
        for &score in &scores {
            distribution.record(score);
        }
        let total: u64 = scores.iter().map(|&s| u64::from(s)).sum();
        let summary = FiveNumberSummary::from_sorted(&scores);

        ComplexityReport {
            method_count: scores.len(),
            average: total as f64 / scores.len() as f64,
            max: summary.max,
            summary,
            distribution,
        }
    }

    /// First shortest path from `from` to `to` within `max_depth` edges.
    pub fn trace_call_path(&self, from: &NodeId, to: &NodeId, max_depth: usize) -> Option<CallPath> {
        let shortest = self
            .graph
            .find_paths(from, to, max_depth)
            .into_iter()
            .reduce(|best, p| if p.len() < best.len() { p } else { best })?;

        Some(CallPath {
            from: from.clone(),
            to: to.clone(),
            length: shortest.len().saturating_sub(1),
            path: shortest,
        })
    }

    /// [`Self::analyze_impact`] at the configured `impact_depth`.
    pub fn impact(&self, node: &NodeId) -> Option<ImpactAnalysis> {
        self.analyze_impact(node, self.defaults.impact_depth)
    }

    /// [`Self::find_hotspots`] capped at `hotspot_limit`.
    pub fn hotspots(&self) -> Vec<Hotspot> {
        self.find_hotspots(self.defaults.hotspot_limit)
    }

    /// [`Self::find_class_coupling`] capped at `coupling_limit`.
    pub fn coupling(&self) -> Vec<CouplingEntry> {
        self.find_class_coupling(self.defaults.coupling_limit)
    }

    /// Neighbourhood of `node` within `context_depth` hops.
    pub fn context(&self, node: &NodeId) -> ContextRadius {
        self.graph.context_radius(node, self.defaults.context_depth)
    }

    /// [`Self::trace_call_path`] bounded by `max_path_depth`.
    pub fn call_path(&self, from: &NodeId, to: &NodeId) -> Option<CallPath> {
        self.trace_call_path(from, to, self.defaults.max_path_depth)
    }

    /// Caller-based impact map for a method, when a resolver is attached.
    pub fn call_impact(&self, method: &NodeId) -> Option<ImpactMap> {
        if method.kind != NodeKind::Method {
            return None;
        }
        self.resolver.map(|r| r.build_impact_map(&method.name))
    }
}
