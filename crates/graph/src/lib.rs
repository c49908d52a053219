//! # Codeintel Graph
//!
//! Typed dependency graph and code-intelligence metrics over parsed
//! declaration units.
//!
//! ## Features
//!
//! - **Scoped symbol resolution** - fields, methods, parameters and locals per unit
//! - **Type resolution** - DML targets typed to the record type they hold
//! - **Semantic graph** - units, methods, fields and record types joined by typed edges
//! - **Reference resolution** - call and field-usage edges recovered from source text
//! - **Analysis** - impact, hotspots, cohesion, coupling, dead code, complexity
//!
//! ## Architecture
//!
//! ```text
//! UnitDeclaration[] + SourceSet
//!     │
//!     ├──> Graph Builder (per unit, rayon)
//!     │      ├─ Symbol Table (unit scope + method scopes)
//!     │      ├─ Type Resolver (locals, DML targets)
//!     │      └─ Plan nodes + structural edges
//!     │
//!     ├──> Semantic Graph (petgraph, single writer)
//!     │      ├─ Nodes: unit, method, field, record type, record field
//!     │      └─ Edges: contains, reads, DML writes, accesses, ...
//!     │
//!     ├──> Reference Resolver
//!     │      ├─ this.m() / Unit.m() / m() call passes
//!     │      └─ calls + usesField edges
//!     │
//!     └──> Graph Analyzer (read-only)
//!            ├─ Impact, hotspots, cohesion, coupling
//!            └─ Issues, complexity, call paths
//! ```

mod analyzer;
mod builder;
mod config;
mod error;
mod graph;
mod resolver;
mod source;
mod symbols;
mod traversal;
mod type_resolver;
mod types;

pub use analyzer::{
    base_weight, impact_level, CallPath, CohesionLevel, CohesionReport, ComplexityDistribution,
    ComplexityReport, CouplingEntry, FiveNumberSummary, GraphAnalyzer, Hotspot, ImpactAnalysis,
    IssueReport,
};
pub use builder::{BuildReport, BuiltGraph, GraphBuilder, UnresolvedMutation};
pub use config::{AnalysisDefaults, BuildOptions, EngineConfig};
pub use error::{GraphError, Result};
pub use graph::{GraphSnapshot, NodeView, SemanticGraph};
pub use resolver::{
    impact_risk, ApplyStats, ImpactMap, MethodInteractions, ReferenceResolver, ResolvedCall,
};
pub use source::{blank_comments_and_strings, locate_method, DeclarationIndex, MethodSpan};
pub use symbols::{extract_base_type, FieldAccess, Symbol, SymbolKind, SymbolMetadata, SymbolTable};
pub use traversal::{ContextRadius, Cycle, ImpactRadius};
pub use type_resolver::{TypeResolution, TypeResolver, UNKNOWN_OBJECT};
pub use types::{
    CallKind, EdgeAttributes, EdgeType, EdgeView, FieldAttributes, GraphNode, MethodAttributes,
    NodeAttributes, NodeId, NodeKind, RecordFieldAttributes, RecordTypeAttributes, RiskLevel,
    UnitAttributes,
};
