//! Scope-chain symbol resolution for one unit.

use codeintel_protocol::UnitDeclaration;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Field,
    Method,
    Parameter,
    Constructor,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    pub name: String,
    #[serde(rename = "type")]
    pub symbol_type: String,
    pub kind: SymbolKind,
    pub modifiers: Vec<String>,
}

impl Symbol {
    pub fn is_static(&self) -> bool {
        self.modifiers.iter().any(|m| m.eq_ignore_ascii_case("static"))
    }
}

/// Extra facts recorded alongside a symbol's name and type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolMetadata {
    pub kind: SymbolKind,
    pub modifiers: Vec<String>,
}

impl SymbolMetadata {
    pub fn new(kind: SymbolKind) -> Self {
        Self {
            kind,
            modifiers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_modifiers(mut self, modifiers: &[String]) -> Self {
        self.modifiers = modifiers.to_vec();
        self
    }
}

/// Outcome of resolving a dotted access path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum FieldAccess {
    /// Single segment naming a known variable.
    Variable { name: String, declared_type: String },
    /// `variable.field`, or a bare field of the context record type.
    Field {
        declared_type: String,
        base_type: String,
        field: String,
    },
    /// `variable.a.b...`: only the head was resolved; `remainder` is left to the caller.
    Partial {
        declared_type: String,
        base_type: String,
        remainder: String,
    },
    Unresolved,
}

impl FieldAccess {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }
}

type Scope = HashMap<String, Symbol>;

/// Lexical scope stack over a unit scope that is never popped.
///
/// Names are matched case-insensitively. Lookup walks block scopes innermost
/// first, then falls back to the unit scope; the first match wins.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    unit_name: String,
    unit_scope: Scope,
    scopes: Vec<Scope>,
    access_cache: HashMap<(String, Option<String>), FieldAccess>,
}

impl SymbolTable {
    pub fn new(unit_name: impl Into<String>) -> Self {
        Self {
            unit_name: unit_name.into(),
            ..Default::default()
        }
    }

    /// Table seeded with a unit's fields, methods and constructors.
    pub fn for_unit(unit: &UnitDeclaration) -> Self {
        let mut table = Self::new(&unit.name);
        for field in &unit.fields {
            table.add_symbol(
                &field.name,
                &field.declared_type,
                SymbolMetadata::new(SymbolKind::Field).with_modifiers(&field.modifiers),
            );
        }
        for method in &unit.methods {
            // a same-named field keeps the slot; DML targets and field paths name fields
            if table
                .resolve_unit_symbol(&method.name)
                .is_some_and(|existing| existing.kind == SymbolKind::Field)
            {
                continue;
            }
            let (kind, symbol_type) = if method.is_constructor || method.name == unit.name {
                (SymbolKind::Constructor, unit.name.as_str())
            } else {
                (SymbolKind::Method, method.return_type.as_str())
            };
            table.add_symbol(
                &method.name,
                symbol_type,
                SymbolMetadata::new(kind).with_modifiers(&method.modifiers),
            );
        }
        table
    }

    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    /// Current depth, counting the unit scope.
    pub fn depth(&self) -> usize {
        self.scopes.len() + 1
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::new());
        self.access_cache.clear();
    }

    /// Pop the innermost block scope. Returns `false` at unit scope.
    pub fn pop_scope(&mut self) -> bool {
        let popped = self.scopes.pop().is_some();
        if popped {
            self.access_cache.clear();
        }
        popped
    }

    /// Insert or overwrite `name` in the innermost scope.
    pub fn add_symbol(&mut self, name: &str, symbol_type: &str, metadata: SymbolMetadata) {
        let symbol = Symbol {
            name: name.to_string(),
            symbol_type: symbol_type.trim().to_string(),
            kind: metadata.kind,
            modifiers: metadata.modifiers,
        };
        let scope = self.scopes.last_mut().unwrap_or(&mut self.unit_scope);
        scope.insert(name.to_ascii_lowercase(), symbol);
        self.access_cache.clear();
    }

    pub fn resolve_symbol(&self, name: &str) -> Option<&Symbol> {
        let key = name.trim().to_ascii_lowercase();
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(&key))
            .or_else(|| self.unit_scope.get(&key))
    }

    /// Class-level lookup only, skipping locals and parameters.
    pub fn resolve_unit_symbol(&self, name: &str) -> Option<&Symbol> {
        self.unit_scope.get(&name.trim().to_ascii_lowercase())
    }

    /// Resolve a dotted access path.
    ///
    /// `context` names the record type a bare single segment belongs to when
    /// it is not a variable (e.g. a field inside a query on that type).
    /// A leading `this` restricts the head lookup to the unit scope.
    /// Results are cached per `(path, context)` until the scopes change.
    pub fn resolve_field_access(&mut self, path: &str, context: Option<&str>) -> FieldAccess {
        let key = (path.to_string(), context.map(str::to_string));
        if let Some(hit) = self.access_cache.get(&key) {
            return hit.clone();
        }
        let resolved = self.resolve_access_uncached(path, context);
        self.access_cache.insert(key, resolved.clone());
        resolved
    }

    fn resolve_access_uncached(&self, path: &str, context: Option<&str>) -> FieldAccess {
        let mut segments: Vec<&str> = path.split('.').map(str::trim).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return FieldAccess::Unresolved;
        }

        let unit_only = segments.len() > 1 && segments[0].eq_ignore_ascii_case("this");
        if unit_only {
            segments.remove(0);
        }
        let head = segments[0];
        let symbol = if unit_only {
            self.resolve_unit_symbol(head)
        } else {
            self.resolve_symbol(head)
        };

        match (segments.len(), symbol) {
            (1, Some(symbol)) => FieldAccess::Variable {
                name: symbol.name.clone(),
                declared_type: symbol.symbol_type.clone(),
            },
            (1, None) => match context {
                Some(record_type) if !unit_only => FieldAccess::Field {
                    declared_type: record_type.to_string(),
                    base_type: extract_base_type(record_type),
                    field: head.to_string(),
                },
                _ => FieldAccess::Unresolved,
            },
            (2, Some(symbol)) => FieldAccess::Field {
                declared_type: symbol.symbol_type.clone(),
                base_type: extract_base_type(&symbol.symbol_type),
                field: segments[1].to_string(),
            },
            (_, Some(symbol)) => FieldAccess::Partial {
                declared_type: symbol.symbol_type.clone(),
                base_type: extract_base_type(&symbol.symbol_type),
                remainder: segments[1..].join("."),
            },
            (_, None) => FieldAccess::Unresolved,
        }
    }
}

/// Strip one trailing `[]`, or unwrap one generic level (`List<T>` → `T`,
/// `Map<K, V>` → `V`). Anything else, including malformed generics, comes
/// back unchanged.
pub fn extract_base_type(type_name: &str) -> String {
    let trimmed = type_name.trim();

    if let Some(element) = trimmed.strip_suffix("[]") {
        let element = element.trim_end();
        return if element.is_empty() {
            trimmed.to_string()
        } else {
            element.to_string()
        };
    }

    let Some(open) = trimmed.find('<') else {
        return trimmed.to_string();
    };
    if !trimmed.ends_with('>') || trimmed[..open].trim().is_empty() {
        return trimmed.to_string();
    }

    let inner = &trimmed[open + 1..trimmed.len() - 1];
    match last_type_argument(inner) {
        Some(arg) => arg.to_string(),
        None => trimmed.to_string(),
    }
}

/// Last top-level comma-separated argument, or `None` if brackets are
/// unbalanced or an argument is empty.
fn last_type_argument(inner: &str) -> Option<&str> {
    let mut depth = 0i32;
    let mut start = 0;
    let mut args = Vec::new();
    for (i, ch) in inner.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            ',' if depth == 0 => {
                args.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    args.push(inner[start..].trim());
    if args.iter().any(|a| a.is_empty()) {
        return None;
    }
    args.last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeintel_protocol::{FieldDeclaration, MethodDeclaration, UnitKind};
    use pretty_assertions::assert_eq;

    fn table() -> SymbolTable {
        let unit = UnitDeclaration::new("Handler", UnitKind::Class)
            .field(FieldDeclaration::new("accounts", "List<Account>"))
            .field(FieldDeclaration::new("owner", "User"))
            .method(MethodDeclaration::new("save").returns("Boolean"))
            .method(MethodDeclaration::new("Handler"));
        SymbolTable::for_unit(&unit)
    }

    #[test]
    fn extract_base_type_cases() {
        assert_eq!(extract_base_type("List<Account>"), "Account");
        assert_eq!(extract_base_type("Account[]"), "Account");
        assert_eq!(extract_base_type("Account"), "Account");
        assert_eq!(extract_base_type("Map<Id, Contact>"), "Contact");
        assert_eq!(extract_base_type("List<List<Account>>"), "List<Account>");
        assert_eq!(extract_base_type(" Set<Id> "), "Id");
    }

    #[test]
    fn extract_base_type_leaves_malformed_input_alone() {
        assert_eq!(extract_base_type("List<Account"), "List<Account");
        assert_eq!(extract_base_type("List<>"), "List<>");
        assert_eq!(extract_base_type("<Account>"), "<Account>");
        assert_eq!(extract_base_type("List<Account>>"), "List<Account>>");
        assert_eq!(extract_base_type("[]"), "[]");
    }

    #[test]
    fn field_outranks_same_named_method() {
        let unit = UnitDeclaration::new("Batch", UnitKind::Class)
            .field(FieldDeclaration::new("items", "List<Account>"))
            .method(MethodDeclaration::new("items").returns("Integer"))
            .method(MethodDeclaration::new("flush").returns("Boolean"));
        let table = SymbolTable::for_unit(&unit);

        let items = table.resolve_symbol("items").expect("field symbol");
        assert_eq!(items.kind, SymbolKind::Field);
        assert_eq!(items.symbol_type, "List<Account>");
        assert_eq!(
            table.resolve_symbol("flush").map(|s| s.kind),
            Some(SymbolKind::Method)
        );
    }

    #[test]
    fn unit_scope_is_never_popped() {
        let mut table = table();
        assert_eq!(table.depth(), 1);
        assert!(!table.pop_scope());
        table.push_scope();
        assert_eq!(table.depth(), 2);
        assert!(table.pop_scope());
        assert!(table.resolve_symbol("accounts").is_some());
    }

    #[test]
    fn inner_scope_shadows_unit_scope() {
        let mut table = table();
        table.push_scope();
        table.add_symbol("owner", "Contact", SymbolMetadata::new(SymbolKind::Parameter));

        let symbol = table.resolve_symbol("OWNER").expect("resolves case-insensitively");
        assert_eq!(symbol.symbol_type, "Contact");
        assert_eq!(symbol.kind, SymbolKind::Parameter);

        table.pop_scope();
        assert_eq!(table.resolve_symbol("owner").unwrap().symbol_type, "User");
    }

    #[test]
    fn methods_and_constructors_are_registered() {
        let table = table();
        assert_eq!(table.resolve_symbol("save").unwrap().kind, SymbolKind::Method);
        assert_eq!(table.resolve_symbol("save").unwrap().symbol_type, "Boolean");
        assert_eq!(
            table.resolve_unit_symbol("Handler").unwrap().kind,
            SymbolKind::Constructor
        );
        assert!(table.resolve_symbol("missing").is_none());
    }

    #[test]
    fn field_access_by_path_length() {
        let mut table = table();
        assert_eq!(
            table.resolve_field_access("accounts", None),
            FieldAccess::Variable {
                name: "accounts".to_string(),
                declared_type: "List<Account>".to_string(),
            }
        );
        assert_eq!(
            table.resolve_field_access("accounts.Name", None),
            FieldAccess::Field {
                declared_type: "List<Account>".to_string(),
                base_type: "Account".to_string(),
                field: "Name".to_string(),
            }
        );
        assert_eq!(
            table.resolve_field_access("owner.Manager.Email", None),
            FieldAccess::Partial {
                declared_type: "User".to_string(),
                base_type: "User".to_string(),
                remainder: "Manager.Email".to_string(),
            }
        );
        assert_eq!(table.resolve_field_access("ghost.Name", None), FieldAccess::Unresolved);
        assert_eq!(table.resolve_field_access("a..b", None), FieldAccess::Unresolved);
    }

    #[test]
    fn bare_segment_uses_context_type() {
        let mut table = table();
        assert_eq!(table.resolve_field_access("Industry", None), FieldAccess::Unresolved);
        assert_eq!(
            table.resolve_field_access("Industry", Some("Account")),
            FieldAccess::Field {
                declared_type: "Account".to_string(),
                base_type: "Account".to_string(),
                field: "Industry".to_string(),
            }
        );
    }

    #[test]
    fn this_prefix_skips_locals() {
        let mut table = table();
        table.push_scope();
        table.add_symbol("accounts", "Account", SymbolMetadata::new(SymbolKind::Local));
        match table.resolve_field_access("this.accounts", None) {
            FieldAccess::Variable { declared_type, .. } => assert_eq!(declared_type, "List<Account>"),
            other => panic!("unexpected: {other:?}"),
        }
        match table.resolve_field_access("accounts", None) {
            FieldAccess::Variable { declared_type, .. } => assert_eq!(declared_type, "Account"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn cache_is_dropped_when_scopes_change() {
        let mut table = table();
        assert!(!table.resolve_field_access("acc", None).is_resolved());
        table.push_scope();
        table.add_symbol("acc", "Account", SymbolMetadata::new(SymbolKind::Local));
        assert!(table.resolve_field_access("acc", None).is_resolved());
    }
}
