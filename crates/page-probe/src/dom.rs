//! The frame's document model.
//!
//! An explicit element tree with the pieces of browser state the probe
//! reads and mutates: geometry, computed-style visibility, bound listeners,
//! form state, and a synthetic-event record so actions are observable from
//! the outside.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Index of a node inside its [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Document-coordinate bounding box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn center(&self) -> (i32, i32) {
        (self.x + self.w / 2, self.y + self.h / 2)
    }

    pub fn area(&self) -> i64 {
        self.w as i64 * self.h as i64
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.w
            && other.x < self.x + self.w
            && self.y < other.y + other.h
            && other.y < self.y + self.h
    }
}

/// Viewport geometry and scroll offset of the frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Viewport {
    pub width: i32,
    pub height: i32,
    pub scroll_x: i32,
    pub scroll_y: i32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            scroll_x: 0,
            scroll_y: 0,
        }
    }
}

impl Viewport {
    /// The viewport as a document-coordinate rect.
    pub fn rect(&self) -> Rect {
        Rect::new(self.scroll_x, self.scroll_y, self.width, self.height)
    }
}

/// One option of a SELECT control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionEntry {
    pub value: String,
    pub text: String,
    pub selected: bool,
}

/// Computed-style visibility flags the map filter honours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleFlags {
    pub display_none: bool,
    pub visibility_hidden: bool,
    pub opacity_zero: bool,
}

impl StyleFlags {
    pub fn hidden(&self) -> bool {
        self.display_none || self.visibility_hidden || self.opacity_zero
    }
}

/// One element node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Uppercased element kind.
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    /// Direct-child text, untrimmed.
    pub text: String,
    pub rect: Rect,
    pub style: StyleFlags,
    /// Event types with a bound handler (`click`, `drop`, `dragover`, …).
    pub listeners: BTreeSet<String>,
    /// Live form value (INPUT/TEXTAREA/SELECT).
    pub value: String,
    pub checked: bool,
    pub options: Vec<OptionEntry>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    /// Probe-owned overlay nodes are invisible to the map walker.
    pub overlay: bool,
}

impl Node {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_uppercase(),
            attrs: BTreeMap::new(),
            text: String::new(),
            rect: Rect::default(),
            style: StyleFlags::default(),
            listeners: BTreeSet::new(),
            value: String::new(),
            checked: false,
            options: Vec::new(),
            children: Vec::new(),
            parent: None,
            overlay: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.attrs.insert("id".into(), id.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        let class = class.into();
        match self.attrs.get_mut("class") {
            Some(existing) => {
                existing.push(' ');
                existing.push_str(&class);
            }
            None => {
                self.attrs.insert("class".into(), class);
            }
        }
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_rect(mut self, x: i32, y: i32, w: i32, h: i32) -> Self {
        self.rect = Rect::new(x, y, w, h);
        self
    }

    pub fn with_listener(mut self, event: impl Into<String>) -> Self {
        self.listeners.insert(event.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_option(mut self, value: impl Into<String>, text: impl Into<String>) -> Self {
        self.options.push(OptionEntry {
            value: value.into(),
            text: text.into(),
            selected: false,
        });
        self
    }

    pub fn checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.style.display_none = true;
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.attrs.get("id").map(String::as_str).filter(|s| !s.is_empty())
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attrs
            .get("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Lowercased `type` attribute of an INPUT.
    pub fn input_type(&self) -> Option<String> {
        if self.tag == "INPUT" {
            Some(
                self.attr("type")
                    .unwrap_or("text")
                    .to_ascii_lowercase(),
            )
        } else {
            None
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.attrs.contains_key("disabled")
    }

    pub fn is_draggable(&self) -> bool {
        self.attr("draggable") == Some("true") || self.listeners.contains("dragstart")
    }

    pub fn is_droptarget(&self) -> bool {
        self.listeners.contains("drop") || self.listeners.contains("dragover")
    }

    fn is_checkable(&self) -> bool {
        matches!(self.input_type().as_deref(), Some("radio") | Some("checkbox"))
    }
}

/// A synthetic event dispatched by the probe, recorded for observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticEvent {
    pub kind: String,
    pub target: NodeId,
    pub client_x: i32,
    pub client_y: i32,
    /// Key for keyboard events, transfer payload for drag events.
    pub data: Option<String>,
}

/// One frame's document.
#[derive(Debug, Clone)]
pub struct Document {
    pub url: String,
    pub title: String,
    pub viewport: Viewport,
    nodes: Vec<Node>,
    body: NodeId,
    events: Vec<SyntheticEvent>,
    active: Option<NodeId>,
    probe_installed: bool,
}

impl Document {
    pub fn new(url: impl Into<String>, title: impl Into<String>, viewport: Viewport) -> Self {
        let mut body = Node::new("BODY");
        body.rect = Rect::new(0, 0, viewport.width, viewport.height);
        Self {
            url: url.into(),
            title: title.into(),
            viewport,
            nodes: vec![body],
            body: NodeId(0),
            events: Vec::new(),
            active: None,
            probe_installed: false,
        }
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Append an element under `parent` (the body when `None`).
    pub fn append(&mut self, parent: Option<NodeId>, mut node: Node) -> NodeId {
        let parent = parent.unwrap_or(self.body);
        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Depth-first walk in tree order starting at the body.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.body];
        while let Some(id) = stack.pop() {
            out.push(id);
            for child in self.node(id).children.iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// 1-based position of `id` among same-tag siblings.
    pub fn nth_of_type(&self, id: NodeId) -> usize {
        let node = self.node(id);
        let Some(parent) = node.parent else {
            return 1;
        };
        let mut position = 0;
        for sibling in &self.node(parent).children {
            if self.node(*sibling).tag == node.tag {
                position += 1;
            }
            if *sibling == id {
                break;
            }
        }
        position.max(1)
    }

    pub fn scroll_to(&mut self, x: i32, y: i32) {
        self.viewport.scroll_x = x.max(0);
        self.viewport.scroll_y = y.max(0);
    }

    pub fn scroll_by(&mut self, dx: i32, dy: i32) {
        self.scroll_to(self.viewport.scroll_x + dx, self.viewport.scroll_y + dy);
    }

    /// Bring the node's rect into the viewport if it is outside.
    pub fn scroll_into_view(&mut self, id: NodeId) {
        let rect = self.node(id).rect;
        if !rect.intersects(&self.viewport.rect()) {
            let y = (rect.y - self.viewport.height / 3).max(0);
            let x = (rect.x - self.viewport.width / 3).max(0);
            self.scroll_to(x, y);
        }
    }

    /// Client (viewport-relative) center of a node.
    pub fn client_center(&self, id: NodeId) -> (i32, i32) {
        let (x, y) = self.node(id).rect.center();
        (x - self.viewport.scroll_x, y - self.viewport.scroll_y)
    }

    pub fn focus(&mut self, id: NodeId) {
        self.active = Some(id);
        self.record(SyntheticEvent {
            kind: "focus".into(),
            target: id,
            client_x: 0,
            client_y: 0,
            data: None,
        });
    }

    pub fn active_element(&self) -> Option<NodeId> {
        self.active
    }

    /// Dispatch a synthetic event and apply the document's built-in
    /// reactions (radio groups, checkbox toggles).
    pub fn dispatch(&mut self, target: NodeId, kind: &str, client_x: i32, client_y: i32) {
        self.dispatch_with_data(target, kind, client_x, client_y, None);
    }

    pub fn dispatch_with_data(
        &mut self,
        target: NodeId,
        kind: &str,
        client_x: i32,
        client_y: i32,
        data: Option<String>,
    ) {
        if kind == "click" && self.node(target).is_checkable() {
            self.apply_check(target);
        }
        self.record(SyntheticEvent {
            kind: kind.to_string(),
            target,
            client_x,
            client_y,
            data,
        });
    }

    fn apply_check(&mut self, target: NodeId) {
        let input_type = self.node(target).input_type();
        match input_type.as_deref() {
            Some("checkbox") => {
                let node = self.node_mut(target);
                node.checked = !node.checked;
            }
            Some("radio") => {
                let group = self.node(target).attr("name").map(str::to_string);
                if let Some(group) = group {
                    for id in self.walk() {
                        let node = &self.nodes[id.0];
                        if node.input_type().as_deref() == Some("radio")
                            && node.attr("name") == Some(group.as_str())
                        {
                            self.nodes[id.0].checked = id == target;
                        }
                    }
                } else {
                    self.node_mut(target).checked = true;
                }
            }
            _ => {}
        }
    }

    fn record(&mut self, event: SyntheticEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[SyntheticEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<SyntheticEvent> {
        std::mem::take(&mut self.events)
    }

    /// Full visible text of the document, for the in-model `evaluate`.
    pub fn inner_text(&self, root: NodeId) -> String {
        let mut parts = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if node.style.hidden() {
                continue;
            }
            let trimmed = node.text.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
            for child in node.children.iter().rev() {
                stack.push(*child);
            }
        }
        parts.join("\n")
    }

    pub(crate) fn probe_installed(&self) -> bool {
        self.probe_installed
    }

    pub(crate) fn mark_probe_installed(&mut self) {
        self.probe_installed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_radios() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new("https://example.com/quiz", "Quiz", Viewport::default());
        let a = doc.append(
            None,
            Node::new("input")
                .with_attr("type", "radio")
                .with_attr("name", "q1")
                .with_id("opt1")
                .with_rect(10, 10, 20, 20),
        );
        let b = doc.append(
            None,
            Node::new("input")
                .with_attr("type", "radio")
                .with_attr("name", "q1")
                .with_id("opt2")
                .with_rect(10, 40, 20, 20),
        );
        (doc, a, b)
    }

    #[test]
    fn radio_click_unchecks_name_group() {
        let (mut doc, a, b) = doc_with_radios();
        doc.dispatch(a, "click", 20, 20);
        assert!(doc.node(a).checked);
        doc.dispatch(b, "click", 20, 50);
        assert!(!doc.node(a).checked);
        assert!(doc.node(b).checked);
    }

    #[test]
    fn checkbox_click_toggles() {
        let mut doc = Document::new("about:blank", "", Viewport::default());
        let cb = doc.append(None, Node::new("input").with_attr("type", "checkbox"));
        doc.dispatch(cb, "click", 0, 0);
        assert!(doc.node(cb).checked);
        doc.dispatch(cb, "click", 0, 0);
        assert!(!doc.node(cb).checked);
    }

    #[test]
    fn scroll_into_view_moves_viewport() {
        let mut doc = Document::new("about:blank", "", Viewport::default());
        let far = doc.append(None, Node::new("div").with_rect(0, 5000, 100, 40));
        doc.scroll_into_view(far);
        assert!(doc
            .node(far)
            .rect
            .intersects(&doc.viewport.rect()));
    }

    #[test]
    fn nth_of_type_counts_same_tag_siblings_only() {
        let mut doc = Document::new("about:blank", "", Viewport::default());
        let _span = doc.append(None, Node::new("span"));
        let _div1 = doc.append(None, Node::new("div"));
        let div2 = doc.append(None, Node::new("div"));
        assert_eq!(doc.nth_of_type(div2), 2);
    }

    #[test]
    fn tree_walk_is_document_order() {
        let mut doc = Document::new("about:blank", "", Viewport::default());
        let outer = doc.append(None, Node::new("div"));
        let inner = doc.append(Some(outer), Node::new("p"));
        let after = doc.append(None, Node::new("section"));
        assert_eq!(doc.walk(), vec![doc.body(), outer, inner, after]);
    }
}
