//! Locating method bodies inside raw unit source.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Body of one method within its unit's source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSpan {
    /// Line of the declaration (1-indexed)
    pub start_line: usize,
    /// Line of the closing brace (1-indexed, inclusive)
    pub end_line: usize,
    /// Text between the braces, with comments and string literals blanked.
    pub body: String,
}

impl MethodSpan {
    #[must_use]
    pub const fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// Replace comment and string-literal contents with spaces, keeping newlines
/// so byte offsets and line numbers still line up with the original.
pub fn blank_comments_and_strings(source: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        LineComment,
        BlockComment,
        Str(char),
    }

    let mut out = String::with_capacity(source.len());
    let mut state = State::Code;
    let mut chars = source.chars().peekable();

    while let Some(ch) = chars.next() {
        match state {
            State::Code => match ch {
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    out.push_str("  ");
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    out.push_str("  ");
                    state = State::BlockComment;
                }
                '\'' | '"' => {
                    out.push(ch);
                    state = State::Str(ch);
                }
                _ => out.push(ch),
            },
            State::LineComment => {
                if ch == '\n' {
                    out.push('\n');
                    state = State::Code;
                } else {
                    push_blank(&mut out, ch);
                }
            }
            State::BlockComment => {
                if ch == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("  ");
                    state = State::Code;
                } else {
                    push_blank(&mut out, ch);
                }
            }
            State::Str(quote) => {
                if ch == '\\' {
                    push_blank(&mut out, ch);
                    if let Some(escaped) = chars.next() {
                        push_blank(&mut out, escaped);
                    }
                } else if ch == quote {
                    out.push(ch);
                    state = State::Code;
                } else {
                    push_blank(&mut out, ch);
                }
            }
        }
    }

    out
}

fn push_blank(out: &mut String, ch: char) {
    if ch == '\n' {
        out.push('\n');
    } else {
        // keep byte length so offsets stay valid
        for _ in 0..ch.len_utf8() {
            out.push(' ');
        }
    }
}

/// A name directly followed by `(`, the shape shared by calls and declarations.
static NAME_BEFORE_PAREN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Za-z_]\w*)\s*\(").expect("valid regex"));

/// Every brace-bodied method declaration in one blanked source file, grouped
/// by lowercase name in source order.
#[derive(Debug, Clone, Default)]
pub struct DeclarationIndex {
    by_name: HashMap<String, Vec<MethodSpan>>,
}

impl DeclarationIndex {
    /// Scan already-blanked `source` once. Call sites are skipped: a
    /// declaration is a name preceded by a type or modifier and followed by a
    /// parameter list and `{`.
    pub fn scan(source: &str) -> Self {
        let mut by_name: HashMap<String, Vec<MethodSpan>> = HashMap::new();
        for caps in NAME_BEFORE_PAREN.captures_iter(source) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if !looks_like_declaration(&source[..name.start()]) {
                continue;
            }
            let Some((open, close)) = body_after_parameters(source, whole.end() - 1) else {
                continue;
            };
            by_name
                .entry(name.as_str().to_ascii_lowercase())
                .or_default()
                .push(MethodSpan {
                    start_line: line_of(source, name.start()),
                    end_line: line_of(source, close),
                    body: source[open + 1..close].to_string(),
                });
        }
        Self { by_name }
    }

    /// Declarations named `method`, ignoring case, in source order.
    pub fn declarations(&self, method: &str) -> &[MethodSpan] {
        self.by_name
            .get(&method.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Pick one declaration of `method`.
    ///
    /// With `hint_line`, the first declaration at or after that line wins.
    /// Otherwise `overload` selects the n-th same-named declaration, falling
    /// back to the first when the file has fewer.
    pub fn locate(&self, method: &str, hint_line: Option<usize>, overload: usize) -> Option<&MethodSpan> {
        let spans = self.declarations(method);
        if let Some(hint) = hint_line {
            if let Some(span) = spans.iter().find(|s| s.start_line >= hint) {
                return Some(span);
            }
        }
        spans.get(overload).or_else(|| spans.first())
    }
}

/// Find the declaration of `method` in already-blanked `source` and return its
/// brace-delimited body.
///
/// When `hint_line` is given, the first declaration at or after that line wins;
/// otherwise the first declaration in the file.
pub fn locate_method(source: &str, method: &str, hint_line: Option<usize>) -> Option<MethodSpan> {
    DeclarationIndex::scan(source)
        .locate(method, hint_line, 0)
        .cloned()
}

/// Text before the name must end in a type or modifier token, not in an
/// operator, a member access, or a statement keyword.
fn looks_like_declaration(before: &str) -> bool {
    let line = before.rsplit('\n').next().unwrap_or(before).trim_end();
    let Some(last) = line.chars().last() else {
        return false;
    };
    if last == '>' || last == ']' {
        return true;
    }
    if !(last.is_alphanumeric() || last == '_') {
        return false;
    }
    let word = line
        .rsplit(|c: char| !(c.is_alphanumeric() || c == '_'))
        .next()
        .unwrap_or("");
    !matches!(
        word.to_ascii_lowercase().as_str(),
        "new" | "return" | "else" | "throw" | "if" | "while" | "for" | "when"
    )
}

/// Given the offset of `(`, find the matching `)` and then the body braces.
/// Returns offsets of `{` and its matching `}`.
fn body_after_parameters(source: &str, open_paren: usize) -> Option<(usize, usize)> {
    let close_paren = matching(source, open_paren, b'(', b')')?;
    let rest = &source[close_paren + 1..];
    let offset = rest.find(|c: char| !c.is_whitespace())?;
    let open_brace = close_paren + 1 + offset;
    if source.as_bytes()[open_brace] != b'{' {
        return None;
    }
    let close_brace = matching(source, open_brace, b'{', b'}')?;
    Some((open_brace, close_brace))
}

fn matching(source: &str, open_at: usize, open: u8, close: u8) -> Option<usize> {
    let mut depth = 0usize;
    for (i, &b) in source.as_bytes().iter().enumerate().skip(open_at) {
        if b == open {
            depth += 1;
        } else if b == close {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset].bytes().filter(|&b| b == b'\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = r#"public class Handler {
    // save(list) is documented here
    public void save(List<Account> list) {
        String s = 'call save(now)';
        validate(list);
        update list;
    }

    private Boolean validate(List<Account> list) {
        return save != null;
    }
}"#;

    #[test]
    fn blanking_preserves_layout() {
        let blanked = blank_comments_and_strings(SOURCE);
        assert_eq!(blanked.len(), SOURCE.len());
        assert_eq!(blanked.lines().count(), SOURCE.lines().count());
        assert!(!blanked.contains("documented"));
        assert!(!blanked.contains("call save(now)"));
        assert!(blanked.contains("validate(list);"));
    }

    #[test]
    fn escaped_quotes_stay_inside_the_literal() {
        let blanked = blank_comments_and_strings(r"x = 'it\'s foo()'; bar();");
        assert!(!blanked.contains("foo()"));
        assert!(blanked.contains("bar();"));
    }

    #[test]
    fn locates_declaration_not_call_sites() {
        let blanked = blank_comments_and_strings(SOURCE);
        let save = locate_method(&blanked, "save", None).expect("save located");
        assert_eq!(save.start_line, 3);
        assert_eq!(save.end_line, 7);
        assert!(save.body.contains("validate(list)"));

        let validate = locate_method(&blanked, "validate", None).expect("validate located");
        assert_eq!(validate.start_line, 9);
        assert_eq!(validate.line_count(), 3);
    }

    #[test]
    fn hint_line_selects_overload() {
        let src = "class A {\n void run() { a(); }\n void run(Integer x) { b(); }\n}";
        let second = locate_method(src, "run", Some(3)).expect("overload found");
        assert!(second.body.contains("b()"));
        let first = locate_method(src, "run", None).expect("first found");
        assert!(first.body.contains("a()"));
    }

    #[test]
    fn one_scan_indexes_every_declaration() {
        let blanked = blank_comments_and_strings(SOURCE);
        let index = DeclarationIndex::scan(&blanked);

        assert_eq!(index.declarations("SAVE").len(), 1);
        assert_eq!(index.declarations("validate")[0].start_line, 9);
        // call sites and keywords are not declarations
        assert!(index.declarations("update").is_empty());
        assert!(index.declarations("return").is_empty());
    }

    #[test]
    fn overload_ordinal_picks_nth_declaration() {
        let src = "class A {\n void run() { a(); }\n void run(Integer x) { b(); }\n}";
        let index = DeclarationIndex::scan(src);

        let first = index.locate("run", None, 0).expect("first overload");
        let second = index.locate("run", None, 1).expect("second overload");
        assert_eq!((first.start_line, second.start_line), (2, 3));
        assert!(second.body.contains("b()"));
        // more overloads declared than written falls back to the first
        assert_eq!(index.locate("run", None, 5), Some(first));
        // a hint beats the ordinal
        assert_eq!(index.locate("run", Some(3), 0), Some(second));
    }

    #[test]
    fn missing_method_is_none() {
        assert!(locate_method(SOURCE, "delete", None).is_none());
        assert!(locate_method("void broken( {", "broken", None).is_none());
    }
}
