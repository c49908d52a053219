use crate::error::Result;
use crate::graph::SemanticGraph;
use crate::source::{blank_comments_and_strings, DeclarationIndex, MethodSpan};
use crate::types::{CallKind, EdgeAttributes, EdgeType, NodeId, NodeKind, RiskLevel};
use codeintel_protocol::{DmlOperation, MethodDeclaration, SourceSet, UnitDeclaration};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

static THIS_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bthis\s*\.\s*([A-Za-z_]\w*)\s*\(").expect("valid regex"));

static QUALIFIED_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Za-z_]\w*)\s*\.\s*([A-Za-z_]\w*)\s*\(").expect("valid regex")
});

static BARE_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Za-z_]\w*)\s*\(").expect("valid regex"));

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Za-z_]\w*\b").expect("valid regex"));

/// Names never resolved as bare calls: keywords plus collection, string and
/// framework intrinsics. Compared in lowercase.
static BUILTIN_METHODS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // keywords that precede a parenthesis
        "if", "for", "while", "switch", "catch", "return", "new", "super", "this", "do",
        "synchronized", "throw",
        // collections
        "add", "addall", "put", "putall", "get", "set", "size", "isempty", "contains",
        "containskey", "containsall", "remove", "removeall", "clear", "keyset", "values",
        "sort", "clone", "iterator", "hasnext", "next", "retainall",
        // strings and objects
        "equals", "equalsignorecase", "hashcode", "tostring", "valueof", "format", "trim",
        "split", "substring", "startswith", "endswith", "indexof", "replace", "replaceall",
        "length", "tolowercase", "touppercase", "isblank", "isnotblank", "join", "escapesinglequotes",
        // framework
        "debug", "assert", "assertequals", "assertnotequals", "insert", "update", "upsert",
        "delete", "undelete", "merge", "query", "getdescribe", "getsobjecttype", "adderror",
        "getmessage", "now", "today", "enqueuejob", "schedule", "executebatch",
    ]
    .into_iter()
    .collect()
});

/// One call site resolved to a declared method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedCall {
    /// Qualified name of the callee (`Unit.method`)
    pub target: String,
    pub kind: CallKind,
}

/// Direct and second-hop callers of a method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpactMap {
    pub target: String,
    pub direct: Vec<String>,
    /// Callers of direct callers, excluding the target and direct callers.
    pub indirect: Vec<String>,
    pub total: usize,
    pub risk: RiskLevel,
}

/// Everything known about how one method touches the rest of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodInteractions {
    pub method: String,
    pub calls: Vec<ResolvedCall>,
    pub called_by: Vec<String>,
    pub fields_used: Vec<String>,
    /// `(record type, accessed fields)`
    pub reads: Vec<(String, Vec<String>)>,
    pub writes: Vec<(String, DmlOperation)>,
}

/// Statistics from mirroring resolver output into a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplyStats {
    pub call_edges: usize,
    pub field_edges: usize,
    /// Calls whose endpoints are not both graph nodes.
    pub dropped_calls: usize,
}

/// Risk band for a number of affected callers: `low ≤ 2`, `medium 3–5`,
/// `high 6–10`, `critical > 10`.
pub fn impact_risk(total: usize) -> RiskLevel {
    match total {
        0..=2 => RiskLevel::Low,
        3..=5 => RiskLevel::Medium,
        6..=10 => RiskLevel::High,
        _ => RiskLevel::Critical,
    }
}

/// Call and field-usage relationships recovered from method source text.
///
/// Computed once from a fixed unit set. Adding units afterwards makes it
/// stale; build a new one instead.
#[derive(Debug, Clone, Default)]
pub struct ReferenceResolver {
    calls: BTreeMap<String, Vec<ResolvedCall>>,
    callers: BTreeMap<String, Vec<String>>,
    field_usage: BTreeMap<String, Vec<String>>,
    spans: HashMap<String, (usize, usize)>,
    unlocated: Vec<String>,
}

struct UnitIndex<'a> {
    /// lowercase unit name → unit
    units: HashMap<String, &'a UnitDeclaration>,
}

impl<'a> UnitIndex<'a> {
    fn new(units: &'a [UnitDeclaration]) -> Self {
        Self {
            units: units
                .iter()
                .map(|u| (u.name.to_ascii_lowercase(), u))
                .collect(),
        }
    }

    fn unit(&self, name: &str) -> Option<&'a UnitDeclaration> {
        self.units.get(&name.to_ascii_lowercase()).copied()
    }
}

/// Declared method of `unit` matching `name` ignoring case.
fn declared_method<'u>(unit: &'u UnitDeclaration, name: &str) -> Option<&'u MethodDeclaration> {
    unit.methods.iter().find(|m| m.name.eq_ignore_ascii_case(name))
}

impl ReferenceResolver {
    /// Scan every method of `units` for call sites and, when `field_usage`
    /// is set, for references to fields of its own unit.
    ///
    /// Overloads share one qualified name. Each is matched to its own
    /// declaration and their calls and field uses are merged.
    pub fn build(units: &[UnitDeclaration], sources: &SourceSet, field_usage: bool) -> Self {
        let index = UnitIndex::new(units);
        let mut resolver = Self::default();
        let declarations: HashMap<&str, DeclarationIndex> = units
            .iter()
            .filter_map(|u| u.file.as_deref())
            .filter_map(|file| {
                sources
                    .get(file)
                    .map(|raw| (file, DeclarationIndex::scan(&blank_comments_and_strings(raw))))
            })
            .collect();

        for unit in units {
            let declared = unit.file.as_deref().and_then(|file| declarations.get(file));

            for (position, method) in unit.methods.iter().enumerate() {
                let caller = format!("{}.{}", unit.name, method.name);
                resolver.calls.entry(caller.clone()).or_default();

                let overload = unit.methods[..position]
                    .iter()
                    .filter(|m| m.name.eq_ignore_ascii_case(&method.name))
                    .count();
                let span = declared.and_then(|d| d.locate(&method.name, method.start_line, overload));
                let Some(span) = span else {
                    log::debug!("no source span for {caller}; skipping call scan");
                    if !resolver.unlocated.contains(&caller) {
                        resolver.unlocated.push(caller);
                    }
                    continue;
                };
                resolver
                    .spans
                    .entry(caller.clone())
                    .or_insert((span.start_line, span.end_line));

                for call in scan_calls(span, unit, method, &index) {
                    resolver.record_call(&caller, call);
                }
                if field_usage {
                    let used = resolver.field_usage.entry(caller.clone()).or_default();
                    for field in scan_field_usage(span, unit, method) {
                        if !used.contains(&field) {
                            used.push(field);
                        }
                    }
                    if used.is_empty() {
                        resolver.field_usage.remove(&caller);
                    }
                }
            }
        }

        resolver
    }

    /// Record one call, once per `(caller, target)` pair.
    fn record_call(&mut self, caller: &str, call: ResolvedCall) {
        let calls = self.calls.entry(caller.to_string()).or_default();
        if calls.iter().any(|c| c.target.eq_ignore_ascii_case(&call.target)) {
            return;
        }
        let callers = self.callers.entry(call.target.clone()).or_default();
        if !callers.iter().any(|c| c == caller) {
            callers.push(caller.to_string());
        }
        calls.push(call);
    }

    /// Forward call map: caller → resolved calls in discovery order.
    pub fn call_map(&self) -> &BTreeMap<String, Vec<ResolvedCall>> {
        &self.calls
    }

    /// Reverse call map: callee → callers.
    pub fn reverse_call_map(&self) -> &BTreeMap<String, Vec<String>> {
        &self.callers
    }

    pub fn calls_from(&self, method: &str) -> &[ResolvedCall] {
        self.calls.get(method).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn callers_of(&self, method: &str) -> &[String] {
        self.callers.get(method).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fields_used_by(&self, method: &str) -> &[String] {
        self.field_usage.get(method).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Source line range found for a method. For overloads, the first
    /// located declaration.
    pub fn span_of(&self, method: &str) -> Option<(usize, usize)> {
        self.spans.get(method).copied()
    }

    /// Methods whose body could not be found in the supplied sources.
    pub fn unlocated(&self) -> &[String] {
        &self.unlocated
    }

    /// Add `calls` and `usesField` edges for every relationship whose
    /// endpoints already exist in `graph`; others are left out of the graph.
    pub fn apply(&self, graph: &mut SemanticGraph) -> Result<ApplyStats> {
        let mut stats = ApplyStats::default();

        for (caller, calls) in &self.calls {
            let from = NodeId::new(NodeKind::Method, caller.as_str());
            for call in calls {
                let to = NodeId::new(NodeKind::Method, call.target.as_str());
                if !graph.contains_node(&from) || !graph.contains_node(&to) {
                    stats.dropped_calls += 1;
                    continue;
                }
                let attributes = EdgeAttributes::Call {
                    call_kind: call.kind,
                };
                if graph.add_edge(&from, &to, EdgeType::Calls, attributes)? {
                    stats.call_edges += 1;
                }
            }
        }

        for (method, fields) in &self.field_usage {
            let from = NodeId::new(NodeKind::Method, method.as_str());
            for field in fields {
                let to = NodeId::new(NodeKind::Field, field.as_str());
                if graph.contains_node(&from)
                    && graph.contains_node(&to)
                    && graph.add_edge(&from, &to, EdgeType::UsesField, EdgeAttributes::None)?
                {
                    stats.field_edges += 1;
                }
            }
        }

        log::debug!(
            "resolver applied {} call edges, {} field edges, dropped {} calls",
            stats.call_edges,
            stats.field_edges,
            stats.dropped_calls
        );
        Ok(stats)
    }

    /// Direct callers plus callers of those callers, with a risk band over
    /// the combined count.
    pub fn build_impact_map(&self, target: &str) -> ImpactMap {
        let direct: Vec<String> = self.callers_of(target).to_vec();

        let mut seen: HashSet<&str> = direct.iter().map(String::as_str).collect();
        seen.insert(target);
        let mut indirect = Vec::new();
        for caller in &direct {
            for second in self.callers_of(caller) {
                if seen.insert(second.as_str()) {
                    indirect.push(second.clone());
                }
            }
        }

        let total = direct.len() + indirect.len();
        ImpactMap {
            target: target.to_string(),
            direct,
            indirect,
            total,
            risk: impact_risk(total),
        }
    }

    /// Calls, callers, field usage and data access for one method.
    pub fn method_summary(&self, graph: &SemanticGraph, method: &str) -> Option<MethodInteractions> {
        let id = NodeId::new(NodeKind::Method, method);
        if !graph.contains_node(&id) && !self.calls.contains_key(method) {
            return None;
        }

        let mut reads = Vec::new();
        let mut writes = Vec::new();
        for edge in graph.outgoing(&id) {
            if edge.edge_type == EdgeType::Reads {
                reads.push((edge.to.name.clone(), edge.attributes.fields().to_vec()));
            } else if let Some(op) = edge.edge_type.dml_operation() {
                writes.push((edge.to.name.clone(), op));
            }
        }

        Some(MethodInteractions {
            method: method.to_string(),
            calls: self.calls_from(method).to_vec(),
            called_by: self.callers_of(method).to_vec(),
            fields_used: self.fields_used_by(method).to_vec(),
            reads,
            writes,
        })
    }
}

/// Run the three call passes in precedence order; the first pass to name a
/// target wins and later mentions of it are ignored.
fn scan_calls(
    span: &MethodSpan,
    unit: &UnitDeclaration,
    method: &MethodDeclaration,
    index: &UnitIndex<'_>,
) -> Vec<ResolvedCall> {
    let body = span.body.as_str();
    let own = format!("{}.{}", unit.name, method.name).to_ascii_lowercase();
    let mut seen: HashSet<String> = HashSet::new();
    let mut found = Vec::new();

    let mut push = |target_unit: &UnitDeclaration, callee: &MethodDeclaration, kind: CallKind| {
        let target = format!("{}.{}", target_unit.name, callee.name);
        let key = target.to_ascii_lowercase();
        if key != own && seen.insert(key) {
            found.push(ResolvedCall { target, kind });
        }
    };

    for caps in THIS_CALL.captures_iter(body) {
        if let Some(callee) = declared_method(unit, &caps[1]) {
            push(unit, callee, CallKind::Instance);
        }
    }

    for caps in QUALIFIED_CALL.captures_iter(body) {
        let Some(other) = index.unit(&caps[1]) else {
            continue;
        };
        if let Some(callee) = declared_method(other, &caps[2]) {
            push(other, callee, CallKind::Static);
        }
    }

    for caps in BARE_CALL.captures_iter(body) {
        let Some(name) = caps.get(1) else {
            continue;
        };
        if BUILTIN_METHODS.contains(name.as_str().to_ascii_lowercase().as_str()) {
            continue;
        }
        let before = body[..name.start()].trim_end();
        if before.ends_with('.') || ends_with_word(before, "new") {
            continue;
        }
        if let Some(callee) = declared_method(unit, name.as_str()) {
            push(unit, callee, CallKind::Local);
        }
    }

    found
}

/// Fields of `unit` mentioned in the body as `this.field` or as a bare name
/// that no parameter or local shadows. Calls (`name(`) are not field uses.
fn scan_field_usage(span: &MethodSpan, unit: &UnitDeclaration, method: &MethodDeclaration) -> Vec<String> {
    if unit.fields.is_empty() {
        return Vec::new();
    }
    let shadowed: HashSet<String> = method
        .parameters
        .iter()
        .map(|p| p.name.to_ascii_lowercase())
        .chain(method.locals.iter().map(|l| l.name.to_ascii_lowercase()))
        .collect();

    let body = span.body.as_str();
    let mut used = Vec::new();
    for token in IDENTIFIER.find_iter(body) {
        let Some(field) = unit
            .fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(token.as_str()))
        else {
            continue;
        };
        if body[token.end()..].trim_start().starts_with('(') {
            continue;
        }
        let before = body[..token.start()].trim_end();
        let qualified_by_this = before
            .strip_suffix('.')
            .map(|b| ends_with_word(b.trim_end(), "this"))
            .unwrap_or(false);
        let bare = !before.ends_with('.');
        if qualified_by_this || (bare && !shadowed.contains(&field.name.to_ascii_lowercase())) {
            let qualified = format!("{}.{}", unit.name, field.name);
            if !used.contains(&qualified) {
                used.push(qualified);
            }
        }
    }
    used
}

fn ends_with_word(text: &str, word: &str) -> bool {
    let Some(at) = text.len().checked_sub(word.len()) else {
        return false;
    };
    match (text.get(..at), text.get(at..)) {
        (Some(head), Some(tail)) => {
            tail.eq_ignore_ascii_case(word)
                && head
                    .chars()
                    .last()
                    .map_or(true, |c| !(c.is_alphanumeric() || c == '_'))
        }
        _ => false,
    }
}
