use chrono::{DateTime, Utc};
use codeintel_protocol::{DmlOperation, UnitKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of program element a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Unit,
    Method,
    Field,
    ExternalRecordType,
    RecordField,
}

impl NodeKind {
    pub const ALL: [NodeKind; 5] = [
        NodeKind::Unit,
        NodeKind::Method,
        NodeKind::Field,
        NodeKind::ExternalRecordType,
        NodeKind::RecordField,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Method => "method",
            Self::Field => "field",
            Self::ExternalRecordType => "externalRecordType",
            Self::RecordField => "recordField",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown node kind: {s}"))
    }
}

/// Node identity: `(kind, qualified name)`.
///
/// Serialized as `"kind:name"`, e.g. `"method:Handler.save"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct NodeId {
    pub kind: NodeKind,
    pub name: String,
}

impl NodeId {
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn unit(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Unit, name)
    }

    pub fn method(unit: &str, method: &str) -> Self {
        Self::new(NodeKind::Method, format!("{unit}.{method}"))
    }

    pub fn field(unit: &str, field: &str) -> Self {
        Self::new(NodeKind::Field, format!("{unit}.{field}"))
    }

    pub fn record_type(name: impl Into<String>) -> Self {
        Self::new(NodeKind::ExternalRecordType, name)
    }

    pub fn record_field(record_type: &str, field: &str) -> Self {
        Self::new(NodeKind::RecordField, format!("{record_type}.{field}"))
    }

    /// Last segment of the qualified name (`save` for `Handler.save`).
    pub fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Owning prefix of a member name (`Handler` for `Handler.save`).
    pub fn owner(&self) -> Option<&str> {
        match self.kind {
            NodeKind::Method | NodeKind::Field | NodeKind::RecordField => {
                self.name.rsplit_once('.').map(|(owner, _)| owner)
            }
            NodeKind::Unit | NodeKind::ExternalRecordType => None,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for NodeId {
    type Error = String;

    fn try_from(raw: String) -> std::result::Result<Self, Self::Error> {
        let (kind, name) = raw
            .split_once(':')
            .ok_or_else(|| format!("node id without kind prefix: {raw}"))?;
        Ok(Self::new(kind.parse()?, name))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnitAttributes {
    pub unit_kind: UnitKind,
    pub modifiers: Vec<String>,
    pub file: Option<String>,
    pub line: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MethodAttributes {
    pub return_type: String,
    /// `Type name` pairs in declaration order.
    pub parameters: Vec<String>,
    pub modifiers: Vec<String>,
    pub complexity: u32,
    pub line: Option<usize>,
    pub is_constructor: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldAttributes {
    pub declared_type: String,
    /// Declared type with one collection/array level unwrapped.
    pub base_type: String,
    pub modifiers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordTypeAttributes {
    /// `None` when no schema provider knew the type.
    pub label: Option<String>,
    pub custom: Option<bool>,
    pub field_count: Option<usize>,
    pub validation_rules: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordFieldAttributes {
    pub field_type: Option<String>,
    pub required: Option<bool>,
    pub unique: Option<bool>,
    pub length: Option<u32>,
}

/// Typed payload of a node, one variant per [`NodeKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum NodeAttributes {
    Unit(UnitAttributes),
    Method(MethodAttributes),
    Field(FieldAttributes),
    RecordType(RecordTypeAttributes),
    RecordField(RecordFieldAttributes),
}

impl NodeAttributes {
    /// Empty payload matching `kind`.
    pub fn empty(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Unit => Self::Unit(UnitAttributes::default()),
            NodeKind::Method => Self::Method(MethodAttributes::default()),
            NodeKind::Field => Self::Field(FieldAttributes::default()),
            NodeKind::ExternalRecordType => Self::RecordType(RecordTypeAttributes::default()),
            NodeKind::RecordField => Self::RecordField(RecordFieldAttributes::default()),
        }
    }

    pub fn complexity(&self) -> Option<u32> {
        match self {
            Self::Method(m) => Some(m.complexity),
            _ => None,
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Unit(u) => u.line,
            Self::Method(m) => m.line,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub attributes: NodeAttributes,
    pub created_at: DateTime<Utc>,
}

/// How a call site named its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    /// `this.method(...)`
    Instance,
    /// `OtherUnit.method(...)`
    Static,
    /// bare `method(...)`
    Local,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instance => "instance",
            Self::Static => "static",
            Self::Local => "local",
        }
    }
}

/// Typed relationship between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeType {
    Contains,
    Calls,
    Reads,
    Insert,
    Update,
    Upsert,
    Delete,
    Undelete,
    Merge,
    Accesses,
    AccessesField,
    UsesField,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Calls => "calls",
            Self::Reads => "reads",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
            Self::Undelete => "undelete",
            Self::Merge => "merge",
            Self::Accesses => "accesses",
            Self::AccessesField => "accessesField",
            Self::UsesField => "usesField",
        }
    }

    pub fn is_write(&self) -> bool {
        self.dml_operation().is_some()
    }

    pub fn dml_operation(&self) -> Option<DmlOperation> {
        match self {
            Self::Insert => Some(DmlOperation::Insert),
            Self::Update => Some(DmlOperation::Update),
            Self::Upsert => Some(DmlOperation::Upsert),
            Self::Delete => Some(DmlOperation::Delete),
            Self::Undelete => Some(DmlOperation::Undelete),
            Self::Merge => Some(DmlOperation::Merge),
            _ => None,
        }
    }
}

impl From<DmlOperation> for EdgeType {
    fn from(op: DmlOperation) -> Self {
        match op {
            DmlOperation::Insert => Self::Insert,
            DmlOperation::Update => Self::Update,
            DmlOperation::Upsert => Self::Upsert,
            DmlOperation::Delete => Self::Delete,
            DmlOperation::Undelete => Self::Undelete,
            DmlOperation::Merge => Self::Merge,
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed payload of an edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EdgeAttributes {
    #[default]
    None,
    Read {
        fields: Vec<String>,
    },
    Write {
        /// Variable named in the DML statement.
        target: String,
    },
    Call {
        call_kind: CallKind,
    },
}

impl EdgeAttributes {
    pub fn read(fields: Vec<String>) -> Self {
        Self::Read { fields }
    }

    pub fn fields(&self) -> &[String] {
        match self {
            Self::Read { fields } => fields,
            _ => &[],
        }
    }
}

/// Edge weight stored in the graph; endpoints live in the graph structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub edge_type: EdgeType,
    pub attributes: EdgeAttributes,
}

/// Self-contained copy of an edge with its endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeView {
    pub from: NodeId,
    pub to: NodeId,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    pub attributes: EdgeAttributes,
}

/// Four-step severity scale shared by impact reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
