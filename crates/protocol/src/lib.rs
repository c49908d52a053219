//! Declaration records exchanged between the parsing layer and the graph engine.
//!
//! The parser is not part of this workspace. It hands us one [`UnitDeclaration`]
//! per top-level class/interface/trigger, plus the raw source text of each file
//! in a [`SourceSet`]. Record-type metadata comes from a [`SchemaProvider`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod schema;

pub use schema::{FieldDescribe, InMemorySchema, RecordDescribe, SchemaProvider, ValidationRule};

pub const DECLARATION_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    #[default]
    Class,
    Interface,
    Enum,
    Trigger,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Enum => "enum",
            Self::Trigger => "trigger",
        }
    }
}

/// Data-manipulation statement kind attached to a mutation.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DmlOperation {
    Insert,
    Update,
    Upsert,
    Delete,
    Undelete,
    Merge,
}

impl DmlOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
            Self::Undelete => "undelete",
            Self::Merge => "merge",
        }
    }

    /// Parse a DML keyword, ignoring case.
    pub fn parse(keyword: &str) -> Option<Self> {
        match keyword.trim().to_ascii_lowercase().as_str() {
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "upsert" => Some(Self::Upsert),
            "delete" => Some(Self::Delete),
            "undelete" => Some(Self::Undelete),
            "merge" => Some(Self::Merge),
            _ => None,
        }
    }
}

impl fmt::Display for DmlOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A query against an external record type (`SELECT Id, Name FROM Account`).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ReadOperation {
    pub record_type: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl ReadOperation {
    pub fn new(record_type: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            record_type: record_type.into(),
            fields: fields.iter().map(|f| (*f).to_string()).collect(),
        }
    }
}

/// A DML statement; `target` is the raw variable name as written in source.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MutationOperation {
    pub target: String,
    pub operation: DmlOperation,
}

impl MutationOperation {
    pub fn new(operation: DmlOperation, target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            operation,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, param_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
        }
    }
}

/// Shape of the right-hand side of a local variable initializer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RhsDescriptor {
    /// `[SELECT ... FROM T]`
    Query { record_type: String },
    /// `new T(...)`
    Instantiation { type_name: String },
    /// `items[0]`
    IndexedAccess { variable: String },
    /// `Receiver.method(...)`
    MethodCall { receiver: String, method: String },
    /// Explicitly annotated or cast value.
    Declared { type_name: String },
    /// Anything the parser could not classify.
    Opaque,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    pub name: String,
    #[serde(default)]
    pub declared_type: Option<String>,
    #[serde(default)]
    pub initializer: Option<RhsDescriptor>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct MethodDeclaration {
    pub name: String,
    #[serde(default = "default_return_type")]
    pub return_type: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub modifiers: Vec<String>,
    /// Cyclomatic complexity computed by the parser.
    #[serde(default = "default_complexity")]
    pub complexity: u32,
    /// 1-indexed declaration line, when the parser knows it.
    #[serde(default)]
    pub start_line: Option<usize>,
    #[serde(default)]
    pub reads: Vec<ReadOperation>,
    #[serde(default)]
    pub mutations: Vec<MutationOperation>,
    #[serde(default)]
    pub locals: Vec<LocalVariable>,
    #[serde(default)]
    pub is_constructor: bool,
}

fn default_return_type() -> String {
    "void".to_string()
}

fn default_complexity() -> u32 {
    1
}

impl MethodDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            return_type: default_return_type(),
            complexity: default_complexity(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn returns(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = return_type.into();
        self
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>, param_type: impl Into<String>) -> Self {
        self.parameters.push(Parameter::new(name, param_type));
        self
    }

    #[must_use]
    pub fn modifier(mut self, modifier: impl Into<String>) -> Self {
        self.modifiers.push(modifier.into());
        self
    }

    #[must_use]
    pub const fn complexity(mut self, complexity: u32) -> Self {
        self.complexity = complexity;
        self
    }

    #[must_use]
    pub const fn at_line(mut self, line: usize) -> Self {
        self.start_line = Some(line);
        self
    }

    #[must_use]
    pub fn reads(mut self, read: ReadOperation) -> Self {
        self.reads.push(read);
        self
    }

    #[must_use]
    pub fn mutates(mut self, mutation: MutationOperation) -> Self {
        self.mutations.push(mutation);
        self
    }

    #[must_use]
    pub fn local(
        mut self,
        name: impl Into<String>,
        declared_type: Option<&str>,
        initializer: Option<RhsDescriptor>,
    ) -> Self {
        self.locals.push(LocalVariable {
            name: name.into(),
            declared_type: declared_type.map(str::to_string),
            initializer,
        });
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FieldDeclaration {
    pub name: String,
    pub declared_type: String,
    #[serde(default)]
    pub modifiers: Vec<String>,
}

impl FieldDeclaration {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            modifiers: Vec::new(),
        }
    }

    pub fn is_static(&self) -> bool {
        self.modifiers
            .iter()
            .any(|m| m.eq_ignore_ascii_case("static"))
    }
}

/// One parsed top-level unit.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct UnitDeclaration {
    pub name: String,
    #[serde(default)]
    pub kind: UnitKind,
    #[serde(default)]
    pub modifiers: Vec<String>,
    /// Key into the [`SourceSet`] holding this unit's text.
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub start_line: Option<usize>,
    #[serde(default)]
    pub methods: Vec<MethodDeclaration>,
    #[serde(default)]
    pub fields: Vec<FieldDeclaration>,
}

impl UnitDeclaration {
    pub fn new(name: impl Into<String>, kind: UnitKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    #[must_use]
    pub fn modifier(mut self, modifier: impl Into<String>) -> Self {
        self.modifiers.push(modifier.into());
        self
    }

    #[must_use]
    pub fn method(mut self, method: MethodDeclaration) -> Self {
        self.methods.push(method);
        self
    }

    #[must_use]
    pub fn field(mut self, field: FieldDeclaration) -> Self {
        self.fields.push(field);
        self
    }

    pub fn find_method(&self, name: &str) -> Option<&MethodDeclaration> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn declares_method(&self, name: &str) -> bool {
        self.find_method(name).is_some()
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("invalid unit declaration JSON")
    }

    pub fn list_from_json(raw: &str) -> Result<Vec<Self>> {
        serde_json::from_str(raw).context("invalid unit declaration list JSON")
    }
}

/// Raw source text keyed by file identity.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct SourceSet {
    files: BTreeMap<String, String>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file: impl Into<String>, text: impl Into<String>) {
        self.files.insert(file.into(), text.into());
    }

    #[must_use]
    pub fn with(mut self, file: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(file, text);
        self
    }

    pub fn get(&self, file: &str) -> Option<&str> {
        self.files.get(file).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}
