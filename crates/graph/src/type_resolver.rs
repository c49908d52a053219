use crate::symbols::{extract_base_type, SymbolKind, SymbolMetadata, SymbolTable};
use codeintel_protocol::{MethodDeclaration, RhsDescriptor};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

/// Opaque type reported for calls nothing is known about.
pub const UNKNOWN_OBJECT: &str = "Object";

/// Return types of well-known framework calls, keyed `receiver.method` in lowercase.
static KNOWN_SIGNATURES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("database.insert", "List<Database.SaveResult>"),
        ("database.update", "List<Database.SaveResult>"),
        ("database.upsert", "List<Database.UpsertResult>"),
        ("database.delete", "List<Database.DeleteResult>"),
        ("database.undelete", "List<Database.UndeleteResult>"),
        ("database.merge", "List<Database.MergeResult>"),
        ("database.query", "List<SObject>"),
        ("database.getquerylocator", "Database.QueryLocator"),
        ("database.countquery", "Integer"),
        ("database.setsavepoint", "System.Savepoint"),
        ("string.valueof", "String"),
        ("string.isblank", "Boolean"),
        ("string.join", "String"),
        ("schema.getglobaldescribe", "Map<String, Schema.SObjectType>"),
        ("userinfo.getuserid", "Id"),
        ("userinfo.getname", "String"),
        ("system.now", "Datetime"),
        ("system.today", "Date"),
        ("json.serialize", "String"),
        ("limits.getqueries", "Integer"),
    ])
});

/// Outcome of a type lookup; `Unresolved` is an expected, non-fatal result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeResolution {
    Resolved(String),
    Unresolved,
}

impl TypeResolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    pub fn as_deref(&self) -> Option<&str> {
        match self {
            Self::Resolved(t) => Some(t),
            Self::Unresolved => None,
        }
    }

    pub fn into_option(self) -> Option<String> {
        match self {
            Self::Resolved(t) => Some(t),
            Self::Unresolved => None,
        }
    }
}

/// Expression and DML-target typing on top of a unit's [`SymbolTable`].
#[derive(Debug, Clone)]
pub struct TypeResolver {
    symbols: SymbolTable,
    /// Lowercased local name → inferred type, for the method being analysed.
    locals: HashMap<String, String>,
}

impl TypeResolver {
    pub fn new(symbols: SymbolTable) -> Self {
        Self {
            symbols,
            locals: HashMap::new(),
        }
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    pub fn local_types(&self) -> &HashMap<String, String> {
        &self.locals
    }

    /// Open a method scope holding its parameters and typed locals.
    pub fn enter_method(&mut self, method: &MethodDeclaration) {
        self.symbols.push_scope();
        self.locals.clear();
        for param in &method.parameters {
            self.symbols.add_symbol(
                &param.name,
                &param.param_type,
                SymbolMetadata::new(SymbolKind::Parameter),
            );
        }
        for local in &method.locals {
            self.record_local(&local.name, local.declared_type.as_deref(), local.initializer.as_ref());
        }
    }

    pub fn exit_method(&mut self) {
        self.symbols.pop_scope();
        self.locals.clear();
    }

    /// Type a local variable from its annotation, falling back to its initializer.
    pub fn record_local(
        &mut self,
        name: &str,
        declared: Option<&str>,
        initializer: Option<&RhsDescriptor>,
    ) -> TypeResolution {
        let resolution = match declared.map(str::trim).filter(|t| !t.is_empty() && *t != "var") {
            Some(declared) => TypeResolution::Resolved(declared.to_string()),
            None => initializer
                .map(|rhs| self.infer_assignment_type(rhs))
                .unwrap_or(TypeResolution::Unresolved),
        };

        if let TypeResolution::Resolved(local_type) = &resolution {
            self.locals.insert(name.to_ascii_lowercase(), local_type.clone());
            self.symbols
                .add_symbol(name, local_type, SymbolMetadata::new(SymbolKind::Local));
        } else {
            log::debug!("could not type local `{name}` in {}", self.symbols.unit_name());
        }
        resolution
    }

    /// Return type of `receiver.method(...)`. Never fails: unknown calls are
    /// typed as [`UNKNOWN_OBJECT`].
    pub fn resolve_method_call_type(&self, method: &str, receiver_type: Option<&str>) -> String {
        let method_key = method.trim().to_ascii_lowercase();
        if let Some(receiver) = receiver_type {
            let key = format!("{}.{}", receiver.trim().to_ascii_lowercase(), method_key);
            if let Some(known) = KNOWN_SIGNATURES.get(key.as_str()) {
                return (*known).to_string();
            }
            if let Some(collection) = collection_method_type(receiver.trim(), &method_key) {
                return collection;
            }
        }
        UNKNOWN_OBJECT.to_string()
    }

    pub fn infer_assignment_type(&self, rhs: &RhsDescriptor) -> TypeResolution {
        match rhs {
            RhsDescriptor::Query { record_type } => {
                TypeResolution::Resolved(format!("List<{}>", record_type.trim()))
            }
            RhsDescriptor::Instantiation { type_name } | RhsDescriptor::Declared { type_name } => {
                TypeResolution::Resolved(type_name.trim().to_string())
            }
            RhsDescriptor::IndexedAccess { variable } => {
                let Some(container) = self.variable_type(variable) else {
                    return TypeResolution::Unresolved;
                };
                let element = extract_base_type(&container);
                if element == container {
                    TypeResolution::Unresolved
                } else {
                    TypeResolution::Resolved(element)
                }
            }
            RhsDescriptor::MethodCall { receiver, method } => {
                // A variable receiver contributes its type; otherwise the
                // receiver is taken to be a type name (static call).
                let receiver_type = self
                    .variable_type(receiver)
                    .unwrap_or_else(|| receiver.trim().to_string());
                TypeResolution::Resolved(self.resolve_method_call_type(method, Some(&receiver_type)))
            }
            RhsDescriptor::Opaque => TypeResolution::Unresolved,
        }
    }

    /// Record type behind a DML target, checking `local_types` before the symbol table.
    ///
    /// Accepts `name`, `this.name` and `name[i]`.
    pub fn resolve_dml_target_type(
        &self,
        target: &str,
        local_types: &HashMap<String, String>,
    ) -> TypeResolution {
        let mut name = target.trim();
        let mut unit_only = false;
        if let Some(rest) = strip_this(name) {
            name = rest;
            unit_only = true;
        }
        if let Some(open) = name.find('[') {
            name = name[..open].trim_end();
        }
        if name.is_empty() || name.contains('.') {
            return TypeResolution::Unresolved;
        }

        let declared = if unit_only {
            None
        } else {
            lookup_local(local_types, name)
        };
        let declared = declared.or_else(|| {
            let symbol = if unit_only {
                self.symbols.resolve_unit_symbol(name)
            } else {
                self.symbols.resolve_symbol(name)
            };
            symbol.map(|s| s.symbol_type.clone())
        });

        match declared {
            Some(declared) => TypeResolution::Resolved(extract_base_type(&declared)),
            None => TypeResolution::Unresolved,
        }
    }

    /// [`resolve_dml_target_type`](Self::resolve_dml_target_type) against the
    /// locals recorded for the current method.
    pub fn resolve_dml_target(&self, target: &str) -> TypeResolution {
        self.resolve_dml_target_type(target, &self.locals)
    }

    fn variable_type(&self, name: &str) -> Option<String> {
        let name = strip_this(name.trim()).unwrap_or(name.trim());
        self.locals
            .get(&name.to_ascii_lowercase())
            .cloned()
            .or_else(|| self.symbols.resolve_symbol(name).map(|s| s.symbol_type.clone()))
    }
}

/// Local map lookup ignoring ASCII case; an exact-lowercase key wins.
fn lookup_local(local_types: &HashMap<String, String>, name: &str) -> Option<String> {
    local_types
        .get(&name.to_ascii_lowercase())
        .or_else(|| {
            local_types
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, local_type)| local_type)
        })
        .cloned()
}

fn strip_this(name: &str) -> Option<&str> {
    let (head, rest) = name.split_once('.')?;
    head.trim()
        .eq_ignore_ascii_case("this")
        .then(|| rest.trim())
}

/// Element-returning methods on `List<T>`, `Set<T>` and `Map<K, V>`.
fn collection_method_type(receiver_type: &str, method: &str) -> Option<String> {
    let (container, _) = receiver_type.split_once('<')?;
    let container = container.trim().to_ascii_lowercase();
    let element = extract_base_type(receiver_type);
    if element == receiver_type {
        return None;
    }
    let result = match (container.as_str(), method) {
        ("list", "get" | "remove") => element,
        ("list" | "set" | "map", "size") => "Integer".to_string(),
        ("list" | "set" | "map", "isempty" | "contains" | "containskey") => "Boolean".to_string(),
        ("map", "get" | "remove" | "put") => element,
        ("map", "values") => format!("List<{element}>"),
        ("list" | "set" | "map", "clone") => receiver_type.to_string(),
        _ => return None,
    };
    Some(result)
}
