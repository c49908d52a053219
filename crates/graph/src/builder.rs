use crate::analyzer::GraphAnalyzer;
use crate::config::{AnalysisDefaults, EngineConfig};
use crate::error::{GraphError, Result};
use crate::graph::SemanticGraph;
use crate::resolver::ReferenceResolver;
use crate::symbols::{extract_base_type, SymbolTable};
use crate::type_resolver::{TypeResolution, TypeResolver};
use crate::types::*;
use codeintel_protocol::{
    DmlOperation, MethodDeclaration, ReadOperation, SchemaProvider, SourceSet, UnitDeclaration,
};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;

/// A DML statement whose target variable could not be typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedMutation {
    pub method: String,
    pub target: String,
    pub operation: DmlOperation,
}

/// What the build did and which heuristics came up empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub units: usize,
    pub methods: usize,
    pub nodes: usize,
    pub edges: usize,
    pub call_edges: usize,
    pub field_usage_edges: usize,
    /// Calls found in source whose endpoints are not graph nodes.
    pub dropped_calls: usize,
    pub unresolved_mutations: Vec<UnresolvedMutation>,
    /// Methods whose body was not found in the supplied sources.
    pub unlocated_methods: Vec<String>,
}

/// Sealed build output. The graph is shared read-only from here on.
#[derive(Debug, Clone)]
pub struct BuiltGraph {
    pub graph: Arc<SemanticGraph>,
    pub resolver: ReferenceResolver,
    pub report: BuildReport,
    /// `[analysis]` section of the config the graph was built with.
    pub analysis: AnalysisDefaults,
}

impl BuiltGraph {
    /// Analyzer over this graph with the resolver attached and the
    /// configured analysis defaults.
    pub fn analyzer(&self) -> GraphAnalyzer<'_> {
        GraphAnalyzer::new(&self.graph)
            .with_resolver(&self.resolver)
            .with_defaults(self.analysis.clone())
    }
}

/// Builds a [`SemanticGraph`] from parsed unit declarations.
///
/// Per-unit work (symbol tables, type resolution) only produces a plan; the
/// plans are applied to the graph by a single writer in unit order, so the
/// result does not depend on scheduling.
pub struct GraphBuilder {
    config: EngineConfig,
    schema: Option<Arc<dyn SchemaProvider>>,
    units: Vec<UnitDeclaration>,
    sources: SourceSet,
}

impl GraphBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            schema: None,
            units: Vec::new(),
            sources: SourceSet::new(),
        }
    }

    /// Enrich record types and record fields from `schema`.
    ///
    /// The provider must already be loaded.
    pub fn with_schema(mut self, schema: Arc<dyn SchemaProvider>) -> Result<Self> {
        if !schema.is_loaded() {
            return Err(GraphError::SchemaNotLoaded);
        }
        self.schema = Some(schema);
        Ok(self)
    }

    pub fn with_sources(mut self, sources: SourceSet) -> Self {
        self.sources = sources;
        self
    }

    pub fn add_unit(&mut self, unit: UnitDeclaration) -> &mut Self {
        self.units.push(unit);
        self
    }

    pub fn add_units(&mut self, units: impl IntoIterator<Item = UnitDeclaration>) -> &mut Self {
        self.units.extend(units);
        self
    }

    pub fn finish(self) -> Result<BuiltGraph> {
        let Self {
            config,
            schema,
            units,
            sources,
        } = self;
        let schema = schema.as_deref();

        let plans: Vec<UnitPlan> = if config.build.parallel {
            units
                .par_iter()
                .map(|unit| plan_unit(unit, schema, &config))
                .collect()
        } else {
            units
                .iter()
                .map(|unit| plan_unit(unit, schema, &config))
                .collect()
        };

        let mut graph = SemanticGraph::new();
        let mut report = BuildReport {
            units: units.len(),
            methods: units.iter().map(|u| u.methods.len()).sum(),
            ..Default::default()
        };

        for plan in plans {
            for (id, attributes) in plan.nodes {
                graph.add_node(id, attributes);
            }
            for edge in plan.edges {
                graph.add_edge(&edge.from, &edge.to, edge.edge_type, edge.attributes)?;
            }
            report.unresolved_mutations.extend(plan.unresolved);
        }

        let resolver = ReferenceResolver::build(&units, &sources, config.build.field_usage);
        let stats = resolver.apply(&mut graph)?;

        report.call_edges = stats.call_edges;
        report.field_usage_edges = stats.field_edges;
        report.dropped_calls = stats.dropped_calls;
        report.unlocated_methods = resolver.unlocated().to_vec();
        report.nodes = graph.node_count();
        report.edges = graph.edge_count();

        log::info!(
            "Built semantic graph: {} nodes, {} edges from {} units",
            report.nodes,
            report.edges,
            report.units
        );
        if !report.unresolved_mutations.is_empty() {
            log::debug!(
                "{} DML targets left untyped",
                report.unresolved_mutations.len()
            );
        }

        Ok(BuiltGraph {
            graph: Arc::new(graph),
            resolver,
            report,
            analysis: config.analysis,
        })
    }
}

struct PlannedEdge {
    from: NodeId,
    to: NodeId,
    edge_type: EdgeType,
    attributes: EdgeAttributes,
}

/// Nodes and edges one unit contributes, in the order they must be added.
#[derive(Default)]
struct UnitPlan {
    nodes: Vec<(NodeId, NodeAttributes)>,
    edges: Vec<PlannedEdge>,
    unresolved: Vec<UnresolvedMutation>,
}

impl UnitPlan {
    fn node(&mut self, id: NodeId, attributes: NodeAttributes) {
        self.nodes.push((id, attributes));
    }

    fn edge(&mut self, from: &NodeId, to: &NodeId, edge_type: EdgeType, attributes: EdgeAttributes) {
        self.edges.push(PlannedEdge {
            from: from.clone(),
            to: to.clone(),
            edge_type,
            attributes,
        });
    }
}

fn plan_unit(
    unit: &UnitDeclaration,
    schema: Option<&dyn SchemaProvider>,
    config: &EngineConfig,
) -> UnitPlan {
    let mut plan = UnitPlan::default();
    let unit_id = NodeId::unit(unit.name.as_str());
    plan.node(
        unit_id.clone(),
        NodeAttributes::Unit(UnitAttributes {
            unit_kind: unit.kind,
            modifiers: unit.modifiers.clone(),
            file: unit.file.clone(),
            line: unit.start_line,
        }),
    );

    for field in &unit.fields {
        let field_id = NodeId::field(&unit.name, &field.name);
        plan.node(
            field_id.clone(),
            NodeAttributes::Field(FieldAttributes {
                declared_type: field.declared_type.clone(),
                base_type: extract_base_type(&field.declared_type),
                modifiers: field.modifiers.clone(),
            }),
        );
        plan.edge(&unit_id, &field_id, EdgeType::Contains, EdgeAttributes::None);
    }

    let mut types = TypeResolver::new(SymbolTable::for_unit(unit));
    for method in &unit.methods {
        let method_id = NodeId::method(&unit.name, &method.name);
        plan.node(method_id.clone(), method_attributes(method));
        plan.edge(&unit_id, &method_id, EdgeType::Contains, EdgeAttributes::None);

        for (record_type, fields) in merged_reads(&method.reads) {
            let record_id = NodeId::record_type(record_type.as_str());
            plan.node(record_id.clone(), record_type_attributes(&record_type, schema));
            if config.build.record_fields {
                for field in &fields {
                    let field_id = NodeId::record_field(&record_type, field);
                    plan.node(
                        field_id.clone(),
                        record_field_attributes(&record_type, field, schema),
                    );
                    plan.edge(&method_id, &field_id, EdgeType::AccessesField, EdgeAttributes::None);
                }
            }
            plan.edge(&method_id, &record_id, EdgeType::Reads, EdgeAttributes::read(fields));
            plan.edge(&unit_id, &record_id, EdgeType::Accesses, EdgeAttributes::None);
        }

        types.enter_method(method);
        for mutation in &method.mutations {
            match types.resolve_dml_target(&mutation.target) {
                TypeResolution::Resolved(record_type) => {
                    let record_id = NodeId::record_type(record_type.as_str());
                    plan.node(record_id.clone(), record_type_attributes(&record_type, schema));
                    plan.edge(
                        &method_id,
                        &record_id,
                        EdgeType::from(mutation.operation),
                        EdgeAttributes::Write {
                            target: mutation.target.clone(),
                        },
                    );
                    plan.edge(&unit_id, &record_id, EdgeType::Accesses, EdgeAttributes::None);
                }
                TypeResolution::Unresolved => {
                    log::warn!(
                        "cannot type {} target `{}` in {}",
                        mutation.operation,
                        mutation.target,
                        method_id.name
                    );
                    plan.unresolved.push(UnresolvedMutation {
                        method: method_id.name.clone(),
                        target: mutation.target.clone(),
                        operation: mutation.operation,
                    });
                }
            }
        }
        types.exit_method();
    }

    plan
}

fn method_attributes(method: &MethodDeclaration) -> NodeAttributes {
    NodeAttributes::Method(MethodAttributes {
        return_type: method.return_type.clone(),
        parameters: method
            .parameters
            .iter()
            .map(|p| format!("{} {}", p.param_type, p.name))
            .collect(),
        modifiers: method.modifiers.clone(),
        complexity: method.complexity,
        line: method.start_line,
        is_constructor: method.is_constructor,
    })
}

/// Reads of the same record type within one method collapse into one entry
/// whose field list is the union, first mention first.
fn merged_reads(reads: &[ReadOperation]) -> Vec<(String, Vec<String>)> {
    let mut merged: Vec<(String, Vec<String>)> = Vec::new();
    for read in reads {
        let pos = match merged.iter().position(|(rt, _)| *rt == read.record_type) {
            Some(pos) => pos,
            None => {
                merged.push((read.record_type.clone(), Vec::new()));
                merged.len() - 1
            }
        };
        let fields = &mut merged[pos].1;
        for field in &read.fields {
            if !fields.iter().any(|f| f.eq_ignore_ascii_case(field)) {
                fields.push(field.clone());
            }
        }
    }
    merged
}

fn record_type_attributes(record_type: &str, schema: Option<&dyn SchemaProvider>) -> NodeAttributes {
    let described = schema.and_then(|s| s.describe_record(record_type));
    NodeAttributes::RecordType(match described {
        Some(record) => RecordTypeAttributes {
            label: Some(record.label.clone()),
            custom: Some(record.custom),
            field_count: Some(record.fields.len()),
            validation_rules: record.active_rules().map(|r| r.name.clone()).collect(),
        },
        None => RecordTypeAttributes::default(),
    })
}

fn record_field_attributes(
    record_type: &str,
    field: &str,
    schema: Option<&dyn SchemaProvider>,
) -> NodeAttributes {
    let described = schema.and_then(|s| s.describe_field(record_type, field));
    NodeAttributes::RecordField(match described {
        Some(f) => RecordFieldAttributes {
            field_type: Some(f.field_type.clone()),
            required: Some(f.required),
            unique: Some(f.unique),
            length: f.length,
        },
        None => RecordFieldAttributes::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeintel_protocol::{
        FieldDeclaration, FieldDescribe, InMemorySchema, MutationOperation, RecordDescribe,
        RhsDescriptor, UnitKind,
    };
    use pretty_assertions::assert_eq;

    fn handler() -> UnitDeclaration {
        UnitDeclaration::new("Handler", UnitKind::Class)
            .field(FieldDeclaration::new("cache", "Map<Id, Account>"))
            .method(
                MethodDeclaration::new("load")
                    .reads(ReadOperation::new("Account", &["Id", "Name"]))
                    .reads(ReadOperation::new("Account", &["Name", "Industry"])),
            )
            .method(
                MethodDeclaration::new("save")
                    .param("accounts", "List<Account>")
                    .mutates(MutationOperation::new(DmlOperation::Update, "accounts"))
                    .mutates(MutationOperation::new(DmlOperation::Insert, "mystery")),
            )
    }

    fn build(config: EngineConfig, units: Vec<UnitDeclaration>) -> BuiltGraph {
        let mut builder = GraphBuilder::new(config);
        builder.add_units(units);
        builder.finish().expect("build succeeds")
    }

    #[test]
    fn structural_nodes_and_contains_edges() {
        let built = build(EngineConfig::default(), vec![handler()]);
        let graph = &built.graph;

        let unit = NodeId::unit("Handler");
        let targets: Vec<String> = graph
            .outgoing(&unit)
            .into_iter()
            .filter(|e| e.edge_type == EdgeType::Contains)
            .map(|e| e.to.to_string())
            .collect();
        assert_eq!(
            targets,
            vec!["field:Handler.cache", "method:Handler.load", "method:Handler.save"]
        );

        match &graph.node(&NodeId::field("Handler", "cache")).expect("field").attributes {
            NodeAttributes::Field(f) => assert_eq!(f.base_type, "Account"),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn repeated_reads_merge_fields() {
        let built = build(EngineConfig::default(), vec![handler()]);
        let reads = built
            .graph
            .edge_between(
                &NodeId::method("Handler", "load"),
                &NodeId::record_type("Account"),
                EdgeType::Reads,
            )
            .expect("reads edge");
        assert_eq!(reads.attributes.fields(), ["Id", "Name", "Industry"]);
        assert!(built
            .graph
            .contains_node(&NodeId::record_field("Account", "Industry")));
    }

    #[test]
    fn mutations_are_typed_or_reported() {
        let built = build(EngineConfig::default(), vec![handler()]);
        let update = built.graph.edge_between(
            &NodeId::method("Handler", "save"),
            &NodeId::record_type("Account"),
            EdgeType::Update,
        );
        assert!(update.is_some());
        assert_eq!(
            built.report.unresolved_mutations,
            vec![UnresolvedMutation {
                method: "Handler.save".to_string(),
                target: "mystery".to_string(),
                operation: DmlOperation::Insert,
            }]
        );

        let accesses: Vec<_> = built
            .graph
            .outgoing(&NodeId::unit("Handler"))
            .into_iter()
            .filter(|e| e.edge_type == EdgeType::Accesses)
            .collect();
        assert_eq!(accesses.len(), 1);
    }

    #[test]
    fn locals_type_dml_targets() {
        let unit = UnitDeclaration::new("Job", UnitKind::Class).method(
            MethodDeclaration::new("run")
                .local(
                    "contacts",
                    None,
                    Some(RhsDescriptor::Query {
                        record_type: "Contact".to_string(),
                    }),
                )
                .mutates(MutationOperation::new(DmlOperation::Delete, "contacts")),
        );
        let built = build(EngineConfig::minimal(), vec![unit]);
        assert!(built
            .graph
            .edge_between(
                &NodeId::method("Job", "run"),
                &NodeId::record_type("Contact"),
                EdgeType::Delete,
            )
            .is_some());
        assert!(built.report.unresolved_mutations.is_empty());
    }

    #[test]
    fn minimal_config_skips_record_fields() {
        let built = build(EngineConfig::minimal(), vec![handler()]);
        assert_eq!(built.graph.nodes_of_kind(NodeKind::RecordField).count(), 0);
        assert!(built.graph.contains_node(&NodeId::record_type("Account")));
    }

    #[test]
    fn sequential_and_parallel_builds_agree() {
        let units = vec![handler(), UnitDeclaration::new("Other", UnitKind::Trigger)];
        let parallel = build(EngineConfig::default(), units.clone());
        let mut sequential_config = EngineConfig::default();
        sequential_config.build.parallel = false;
        let sequential = build(sequential_config, units);

        assert_eq!(parallel.graph.edges(), sequential.graph.edges());
        let ids = |b: &BuiltGraph| b.graph.nodes().map(|n| n.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&parallel), ids(&sequential));
    }

    #[test]
    fn analyzer_carries_configured_defaults() {
        let config = EngineConfig::from_toml_str("[analysis]\nimpact_depth = 1\nhotspot_limit = 2\n")
            .expect("valid config");
        let built = build(config, vec![handler()]);
        assert_eq!(built.analysis.impact_depth, 1);
        assert!(built.graph.node_count() > 2);

        let analyzer = built.analyzer();
        assert_eq!(analyzer.hotspots().len(), 2);
        let impact = analyzer.impact(&NodeId::unit("Handler")).expect("known unit");
        assert_eq!(impact.depth, 1);
        assert_eq!(analyzer.defaults().max_path_depth, 6);
    }

    #[test]
    fn schema_must_be_loaded() {
        let schema = Arc::new(InMemorySchema::new());
        let err = GraphBuilder::new(EngineConfig::default())
            .with_schema(schema)
            .err()
            .expect("unloaded schema rejected");
        assert!(matches!(err, GraphError::SchemaNotLoaded));
    }

    #[test]
    fn schema_enriches_record_nodes() {
        let mut schema = InMemorySchema::new();
        schema.load([RecordDescribe {
            name: "Account".to_string(),
            label: "Account".to_string(),
            custom: false,
            fields: vec![FieldDescribe {
                name: "Name".to_string(),
                field_type: "string".to_string(),
                required: true,
                unique: false,
                length: Some(255),
            }],
            validation_rules: Vec::new(),
        }]);

        let mut builder = GraphBuilder::new(EngineConfig::default())
            .with_schema(Arc::new(schema))
            .expect("schema loaded");
        builder.add_unit(handler());
        let built = builder.finish().expect("build succeeds");

        match &built.graph.node(&NodeId::record_type("Account")).expect("record").attributes {
            NodeAttributes::RecordType(rt) => {
                assert_eq!(rt.label.as_deref(), Some("Account"));
                assert_eq!(rt.field_count, Some(1));
            }
            other => panic!("unexpected payload {other:?}"),
        }
        match &built.graph.node(&NodeId::record_field("Account", "Name")).expect("field").attributes {
            NodeAttributes::RecordField(f) => {
                assert_eq!(f.required, Some(true));
                assert_eq!(f.length, Some(255));
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
