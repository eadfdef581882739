//! CSS selector engine and the selector generation heuristic.
//!
//! The engine covers exactly the subset the generator emits plus what
//! planner models produce in practice: `#id`, `.class`, `tag`,
//! `[attr]`, `[attr="value"]` (single or double quotes), `:nth-of-type(n)`,
//! compound simple selectors, and descendant/child combinators.

use crate::dom::{Document, NodeId};
use crate::errors::ProbeError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    /// `(name, None)` for presence, `(name, Some(value))` for equality.
    attrs: Vec<(String, Option<String>)>,
    nth_of_type: Option<usize>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && self.nth_of_type.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ComplexSelector {
    /// Leftmost first; combinator precedes each compound after the first.
    parts: Vec<(Option<Combinator>, Compound)>,
}

/// Parse a selector string.
pub fn parse(selector: &str) -> Result<ComplexSelector, ProbeError> {
    let trimmed = selector.trim();
    if trimmed.is_empty() {
        return Err(ProbeError::invalid_selector(selector, "empty selector"));
    }

    let chars: Vec<char> = trimmed.chars().collect();
    let mut i = 0;
    let mut parts: Vec<(Option<Combinator>, Compound)> = Vec::new();
    let mut pending: Option<Combinator> = None;

    while i < chars.len() {
        // Combinator run between compounds.
        if chars[i].is_whitespace() || chars[i] == '>' {
            let mut child = false;
            while i < chars.len() && (chars[i].is_whitespace() || chars[i] == '>') {
                if chars[i] == '>' {
                    child = true;
                }
                i += 1;
            }
            if !parts.is_empty() {
                pending = Some(if child {
                    Combinator::Child
                } else {
                    Combinator::Descendant
                });
            }
            continue;
        }

        let (compound, next) = parse_compound(&chars, i, selector)?;
        if compound.is_empty() {
            return Err(ProbeError::invalid_selector(selector, "empty compound"));
        }
        let combinator = if parts.is_empty() { None } else { pending.take() };
        parts.push((combinator, compound));
        i = next;
    }

    if parts.is_empty() {
        return Err(ProbeError::invalid_selector(selector, "no compounds"));
    }
    Ok(ComplexSelector { parts })
}

fn parse_compound(
    chars: &[char],
    mut i: usize,
    original: &str,
) -> Result<(Compound, usize), ProbeError> {
    let mut compound = Compound::default();

    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() || c == '>' => break,
            '#' => {
                let (ident, next) = take_ident(chars, i + 1);
                if ident.is_empty() {
                    return Err(ProbeError::invalid_selector(original, "empty id"));
                }
                compound.id = Some(ident);
                i = next;
            }
            '.' => {
                let (ident, next) = take_ident(chars, i + 1);
                if ident.is_empty() {
                    return Err(ProbeError::invalid_selector(original, "empty class"));
                }
                compound.classes.push(ident);
                i = next;
            }
            '[' => {
                let (name, value, next) = parse_attr(chars, i + 1, original)?;
                compound.attrs.push((name, value));
                i = next;
            }
            ':' => {
                let rest: String = chars[i..].iter().collect();
                if let Some(tail) = rest.strip_prefix(":nth-of-type(") {
                    let close = tail.find(')').ok_or_else(|| {
                        ProbeError::invalid_selector(original, "unterminated nth-of-type")
                    })?;
                    let n: usize = tail[..close].trim().parse().map_err(|_| {
                        ProbeError::invalid_selector(original, "bad nth-of-type index")
                    })?;
                    compound.nth_of_type = Some(n);
                    i += ":nth-of-type(".len() + close + 1;
                } else {
                    return Err(ProbeError::invalid_selector(
                        original,
                        "unsupported pseudo-class",
                    ));
                }
            }
            _ => {
                let (ident, next) = take_ident(chars, i);
                if ident.is_empty() {
                    return Err(ProbeError::invalid_selector(
                        original,
                        format!("unexpected character {:?}", chars[i]),
                    ));
                }
                compound.tag = Some(ident.to_ascii_uppercase());
                i = next;
            }
        }
    }

    Ok((compound, i))
}

fn parse_attr(
    chars: &[char],
    mut i: usize,
    original: &str,
) -> Result<(String, Option<String>, usize), ProbeError> {
    let (name, next) = take_ident(chars, i);
    if name.is_empty() {
        return Err(ProbeError::invalid_selector(original, "empty attribute name"));
    }
    i = next;

    match chars.get(i) {
        Some(']') => Ok((name, None, i + 1)),
        Some('=') => {
            i += 1;
            let quote = match chars.get(i) {
                Some('"') => Some('"'),
                Some('\'') => Some('\''),
                _ => None,
            };
            let value = if let Some(quote) = quote {
                i += 1;
                let start = i;
                while i < chars.len() && chars[i] != quote {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(ProbeError::invalid_selector(original, "unterminated string"));
                }
                let value: String = chars[start..i].iter().collect();
                i += 1; // closing quote
                value
            } else {
                let start = i;
                while i < chars.len() && chars[i] != ']' {
                    i += 1;
                }
                chars[start..i].iter().collect()
            };
            match chars.get(i) {
                Some(']') => Ok((name, Some(value), i + 1)),
                _ => Err(ProbeError::invalid_selector(original, "unterminated attribute")),
            }
        }
        _ => Err(ProbeError::invalid_selector(original, "unterminated attribute")),
    }
}

fn take_ident(chars: &[char], start: usize) -> (String, usize) {
    let mut i = start;
    let mut out = String::new();
    while i < chars.len() {
        let c = chars[i];
        if c.is_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
            i += 1;
        } else {
            break;
        }
    }
    (out, i)
}

fn matches_compound(doc: &Document, id: NodeId, compound: &Compound) -> bool {
    let node = doc.node(id);
    if node.overlay {
        return false;
    }
    if let Some(tag) = &compound.tag {
        if node.tag != *tag {
            return false;
        }
    }
    if let Some(wanted) = &compound.id {
        if node.id() != Some(wanted.as_str()) {
            return false;
        }
    }
    for class in &compound.classes {
        if !node.classes().contains(&class.as_str()) {
            return false;
        }
    }
    for (name, value) in &compound.attrs {
        match (node.attr(name), value) {
            (Some(actual), Some(wanted)) if actual == wanted => {}
            (Some(_), None) => {}
            _ => return false,
        }
    }
    if let Some(n) = compound.nth_of_type {
        if doc.nth_of_type(id) != n {
            return false;
        }
    }
    true
}

fn matches_complex(doc: &Document, id: NodeId, parts: &[(Option<Combinator>, Compound)]) -> bool {
    let (combinator, compound) = match parts.last() {
        Some(last) => last,
        None => return true,
    };
    if !matches_compound(doc, id, compound) {
        return false;
    }
    let rest = &parts[..parts.len() - 1];
    if rest.is_empty() {
        return true;
    }
    match combinator {
        Some(Combinator::Child) | None => {
            // `None` is unreachable for non-first compounds; treat as child.
            match doc.node(id).parent {
                Some(parent) => matches_complex(doc, parent, rest),
                None => false,
            }
        }
        Some(Combinator::Descendant) => {
            let mut current = doc.node(id).parent;
            while let Some(ancestor) = current {
                if matches_complex(doc, ancestor, rest) {
                    return true;
                }
                current = doc.node(ancestor).parent;
            }
            false
        }
    }
}

/// All nodes matching `selector`, in document order.
pub fn query_all(doc: &Document, selector: &str) -> Result<Vec<NodeId>, ProbeError> {
    let complex = parse(selector)?;
    Ok(doc
        .walk()
        .into_iter()
        .filter(|id| matches_complex(doc, *id, &complex.parts))
        .collect())
}

/// First matching node, like `querySelector`.
pub fn query_first(doc: &Document, selector: &str) -> Result<Option<NodeId>, ProbeError> {
    Ok(query_all(doc, selector)?.into_iter().next())
}

/// First matching node or the typed Not-Found error.
pub fn require(doc: &Document, selector: &str) -> Result<NodeId, ProbeError> {
    query_first(doc, selector)?.ok_or_else(|| ProbeError::not_found(selector))
}

fn is_css_ident(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn resolves_to(doc: &Document, selector: &str, id: NodeId) -> bool {
    match query_all(doc, selector) {
        Ok(matches) => matches.len() == 1 && matches[0] == id,
        Err(_) => false,
    }
}

/// Generate a selector for `id`, stable within this document.
///
/// Preference order: `#id`, a globally unique class, a unique
/// `[aria-label="…"]`, `[data-testid="…"]`, a unique `[name="…"]`, then an
/// `nth-of-type` path. The result resolves to exactly one node at call time;
/// it may differ across snapshots when the page rewrites classes.
pub fn generate(doc: &Document, id: NodeId) -> String {
    let node = doc.node(id);

    if let Some(node_id) = node.id() {
        if is_css_ident(node_id) {
            let candidate = format!("#{node_id}");
            if resolves_to(doc, &candidate, id) {
                return candidate;
            }
        }
    }

    for class in node.classes() {
        if is_css_ident(class) {
            let candidate = format!(".{class}");
            if resolves_to(doc, &candidate, id) {
                return candidate;
            }
        }
    }

    for attr in ["aria-label", "data-testid", "name"] {
        if let Some(value) = node.attr(attr) {
            if !value.is_empty() && !value.contains('"') {
                let candidate = format!("[{attr}=\"{value}\"]");
                if resolves_to(doc, &candidate, id) {
                    return candidate;
                }
            }
        }
    }

    nth_path(doc, id)
}

/// `nth-of-type` path from the nearest anchored ancestor down to the node.
fn nth_path(doc: &Document, id: NodeId) -> String {
    let mut segments: Vec<String> = Vec::new();
    let mut current = Some(id);

    while let Some(node_id) = current {
        if node_id == doc.body() {
            segments.push("body".to_string());
            break;
        }
        let node = doc.node(node_id);
        if node_id != id {
            if let Some(anchor) = node.id() {
                if is_css_ident(anchor) && resolves_to(doc, &format!("#{anchor}"), node_id) {
                    segments.push(format!("#{anchor}"));
                    break;
                }
            }
        }
        segments.push(format!(
            "{}:nth-of-type({})",
            node.tag.to_ascii_lowercase(),
            doc.nth_of_type(node_id)
        ));
        current = node.parent;

        if segments.len() >= 4 {
            let candidate = join_path(&segments);
            if resolves_to(doc, &candidate, id) {
                return candidate;
            }
        }
    }

    join_path(&segments)
}

fn join_path(reversed: &[String]) -> String {
    let mut parts: Vec<&str> = reversed.iter().map(String::as_str).collect();
    parts.reverse();
    parts.join(" > ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Node, Viewport};

    fn sample_doc() -> Document {
        let mut doc = Document::new("https://example.com", "Example", Viewport::default());
        let form = doc.append(None, Node::new("form").with_id("login"));
        doc.append(
            Some(form),
            Node::new("input")
                .with_attr("type", "text")
                .with_attr("name", "user")
                .with_class("field"),
        );
        doc.append(
            Some(form),
            Node::new("input")
                .with_attr("type", "password")
                .with_attr("name", "pass")
                .with_class("field"),
        );
        doc.append(
            Some(form),
            Node::new("button")
                .with_text("Sign in")
                .with_attr("aria-label", "Sign in"),
        );
        doc
    }

    #[test]
    fn id_and_class_queries() {
        let doc = sample_doc();
        assert_eq!(query_all(&doc, "#login").unwrap().len(), 1);
        assert_eq!(query_all(&doc, ".field").unwrap().len(), 2);
        assert_eq!(query_all(&doc, "form .field").unwrap().len(), 2);
        assert_eq!(query_all(&doc, "form > button").unwrap().len(), 1);
    }

    #[test]
    fn attribute_queries_accept_both_quote_styles() {
        let doc = sample_doc();
        assert_eq!(query_all(&doc, r#"[name="user"]"#).unwrap().len(), 1);
        assert_eq!(query_all(&doc, "[name='user']").unwrap().len(), 1);
        assert_eq!(
            query_all(&doc, r#"input[type="password"]"#).unwrap().len(),
            1
        );
    }

    #[test]
    fn nth_of_type_query() {
        let doc = sample_doc();
        let seconds = query_all(&doc, "input:nth-of-type(2)").unwrap();
        assert_eq!(seconds.len(), 1);
        assert_eq!(doc.node(seconds[0]).attr("name"), Some("pass"));
    }

    #[test]
    fn require_raises_typed_not_found() {
        let doc = sample_doc();
        match require(&doc, "#missing") {
            Err(ProbeError::NotFound { selector }) => assert_eq!(selector, "#missing"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn generate_prefers_id_then_unique_attr() {
        let doc = sample_doc();
        let form = query_first(&doc, "form").unwrap().unwrap();
        assert_eq!(generate(&doc, form), "#login");

        let user = query_first(&doc, "[name='user']").unwrap().unwrap();
        // `.field` is shared, so the name attribute wins.
        assert_eq!(generate(&doc, user), "[name=\"user\"]");

        let button = query_first(&doc, "button").unwrap().unwrap();
        assert_eq!(generate(&doc, button), "[aria-label=\"Sign in\"]");
    }

    #[test]
    fn generated_selectors_resolve_uniquely() {
        let mut doc = Document::new("https://example.com", "", Viewport::default());
        let list = doc.append(None, Node::new("ul"));
        for _ in 0..3 {
            doc.append(Some(list), Node::new("li").with_class("tile"));
        }
        for id in doc.walk() {
            if id == doc.body() {
                continue;
            }
            let selector = generate(&doc, id);
            let matches = query_all(&doc, &selector).unwrap();
            assert_eq!(matches, vec![id], "selector {selector:?} not unique");
        }
    }

    #[test]
    fn nth_path_anchors_on_ancestor_id() {
        let mut doc = Document::new("https://example.com", "", Viewport::default());
        let panel = doc.append(None, Node::new("div").with_id("panel"));
        let row = doc.append(Some(panel), Node::new("div"));
        let cell = doc.append(Some(row), Node::new("span"));
        let selector = generate(&doc, cell);
        assert!(selector.starts_with("#panel > "), "got {selector}");
        assert_eq!(query_all(&doc, &selector).unwrap(), vec![cell]);
    }
}
