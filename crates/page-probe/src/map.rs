//! Visual Page Map construction.
//!
//! The map is the planner's primary perception input, so its grammar is
//! fixed: a header, one summary line, then one line per element sorted by
//! ascending (y, x). The differ and the system prompts both depend on this
//! exact shape.

use tabpilot_core_types::element::{MAX_ELEMENT_TEXT, MAX_OPTIONS, MAX_VALUE_TEXT};
use tabpilot_core_types::{SelectOption, VisualElement};

use crate::dom::{Document, NodeId};
use crate::selector;

pub const MAP_HEADER: &str = "=== VISUAL PAGE MAP ===";

/// Hard cap on elements per frame map.
pub const MAX_ELEMENTS: usize = 500;

const REJECTED_TAGS: &[&str] = &[
    "SCRIPT", "STYLE", "NOSCRIPT", "SVG", "PATH", "META", "LINK", "BR", "HR",
];

const INTERACTIVE_TAGS: &[&str] = &["A", "BUTTON", "INPUT", "SELECT", "TEXTAREA"];

const INTERACTIVE_ROLES: &[&str] = &[
    "button", "link", "tab", "checkbox", "radio", "option", "menuitem",
];

fn subtree_rejected(doc: &Document, id: NodeId) -> bool {
    let node = doc.node(id);
    node.overlay
        || REJECTED_TAGS.contains(&node.tag.as_str())
        || node.style.hidden()
}

fn is_interactive(doc: &Document, id: NodeId) -> bool {
    let node = doc.node(id);
    if INTERACTIVE_TAGS.contains(&node.tag.as_str()) {
        return true;
    }
    if let Some(role) = node.attr("role") {
        if INTERACTIVE_ROLES.contains(&role.to_ascii_lowercase().as_str()) {
            return true;
        }
    }
    node.listeners.contains("click")
        || node.attr("tabindex").is_some()
        || node.is_draggable()
}

fn cap_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn capture(doc: &Document, id: NodeId) -> VisualElement {
    let node = doc.node(id);
    let mut el = VisualElement::new(node.tag.clone(), selector::generate(doc, id));

    el.x = node.rect.x;
    el.y = node.rect.y;
    el.w = node.rect.w.max(0);
    el.h = node.rect.h.max(0);
    el.visible = node.rect.intersects(&doc.viewport.rect());
    el.interactive = is_interactive(doc, id);

    let text = node.text.trim();
    if !text.is_empty() {
        el.text = Some(cap_chars(text, MAX_ELEMENT_TEXT));
    }

    el.input_type = node.input_type();
    if !node.value.is_empty() {
        el.value = Some(cap_chars(&node.value, MAX_VALUE_TEXT));
    }
    el.placeholder = node.attr("placeholder").map(str::to_string);
    el.aria_label = node.attr("aria-label").map(str::to_string);
    if matches!(el.input_type.as_deref(), Some("radio") | Some("checkbox")) {
        el.checked = Some(node.checked);
    }
    el.draggable = node.is_draggable();
    el.droptarget = node.is_droptarget();
    el.disabled = node.is_disabled();
    if node.tag == "A" {
        el.href = node.attr("href").map(str::to_string);
    }
    el.options = node
        .options
        .iter()
        .take(MAX_OPTIONS)
        .map(|opt| SelectOption {
            value: opt.value.clone(),
            text: opt.text.clone(),
            selected: opt.selected,
        })
        .collect();

    el
}

/// Collect the frame's elements in (y, x) order, capped at
/// [`MAX_ELEMENTS`].
pub fn collect_elements(doc: &Document) -> Vec<VisualElement> {
    let mut out = Vec::new();
    let mut stack = vec![doc.body()];

    while let Some(id) = stack.pop() {
        if subtree_rejected(doc, id) {
            continue;
        }
        let node = doc.node(id);
        if id != doc.body()
            && node.rect.area() > 0
            && (!node.text.trim().is_empty() || is_interactive(doc, id))
        {
            out.push(capture(doc, id));
            if out.len() >= MAX_ELEMENTS {
                break;
            }
        }
        for child in node.children.iter().rev() {
            stack.push(*child);
        }
    }

    out.sort_by(|a, b| a.y.cmp(&b.y).then(a.x.cmp(&b.x)));
    out
}

fn quoted(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "'"))
}

fn render_element(el: &VisualElement) -> String {
    let mut line = String::new();

    line.push('[');
    if el.interactive {
        line.push('*');
    }
    line.push_str(&el.tag);
    if let Some(input_type) = &el.input_type {
        line.push('[');
        line.push_str(input_type);
        line.push(']');
    }
    line.push(']');

    line.push_str(&format!(" @({},{} {}x{})", el.x, el.y, el.w, el.h));
    if !el.visible {
        line.push_str(" [offscreen]");
    }
    line.push_str(&format!(" sel={}", quoted(&el.selector)));

    if let Some(text) = &el.text {
        line.push(' ');
        line.push_str(&quoted(text));
    }
    if let Some(value) = &el.value {
        line.push_str(&format!(" value={}", quoted(value)));
    }
    if let Some(placeholder) = &el.placeholder {
        line.push_str(&format!(" placeholder={}", quoted(placeholder)));
    }
    if let Some(aria) = &el.aria_label {
        line.push_str(&format!(" aria-label={}", quoted(aria)));
    }
    if let Some(checked) = el.checked {
        line.push_str(if checked { " [checked]" } else { " [unchecked]" });
    }
    if el.draggable {
        line.push_str(" [draggable]");
    }
    if el.droptarget {
        line.push_str(" [droptarget]");
    }
    if el.disabled {
        line.push_str(" [disabled]");
    }
    if let Some(href) = &el.href {
        line.push_str(&format!(" href={}", quoted(href)));
    }
    if !el.options.is_empty() {
        let rendered: Vec<String> = el
            .options
            .iter()
            .map(|opt| {
                let mark = if opt.selected { "*" } else { "" };
                format!("{}:{}{}", opt.value, quoted(&opt.text), mark)
            })
            .collect();
        line.push_str(&format!(" options=[{}]", rendered.join(", ")));
    }

    line
}

/// Render the frame's Visual Page Map.
pub fn build_visual_map(doc: &Document) -> String {
    let elements = collect_elements(doc);
    let mut out = String::new();
    out.push_str(MAP_HEADER);
    out.push('\n');
    out.push_str(&format!(
        "Viewport: {}x{} | Scroll: ({},{}) | Elements: {}\n",
        doc.viewport.width,
        doc.viewport.height,
        doc.viewport.scroll_x,
        doc.viewport.scroll_y,
        elements.len()
    ));
    for el in &elements {
        out.push_str(&render_element(el));
        out.push('\n');
    }
    out
}
