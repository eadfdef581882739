//! In-frame action execution.
//!
//! Each operation mirrors what the injected script does against the live
//! DOM: resolve the selector, synthesize the event sequence real pages
//! listen for, and report a result the executor can log. Selector-bearing
//! actions raise the typed Not-Found error on zero matches.

use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::debug;

use tabpilot_core_types::{Action, ScrollDirection};

use crate::dom::{Document, NodeId};
use crate::errors::ProbeError;
use crate::selector;
use crate::tempo::Tempo;

/// Result of one in-frame action.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ActionOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn ok_with(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Highlight overlay state. The overlay is probe-owned chrome: it sits on a
/// top z-index with `pointer-events: none`, so it can never receive events,
/// and the map walker skips it.
#[derive(Debug, Default, Clone)]
pub struct Overlay {
    pub flashes: u32,
    pub last_rect: Option<crate::dom::Rect>,
}

impl Overlay {
    pub fn flash(&mut self, rect: crate::dom::Rect) {
        self.flashes += 1;
        self.last_rect = Some(rect);
    }
}

const DEFAULT_SCROLL_AMOUNT: i32 = 300;
const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_SLEEP_MS: u64 = 500;
const WAIT_POLL_MS: u64 = 100;
const EVAL_RESULT_CAP: usize = 5_000;
const DRAG_MOVE_STEPS: i32 = 10;

/// Execute one action against this frame's document.
pub async fn execute(
    doc: &Mutex<Document>,
    overlay: &Mutex<Overlay>,
    tempo: &Tempo,
    action: &Action,
) -> Result<ActionOutcome, ProbeError> {
    debug!(target: "page_probe", action = action.name(), "execute");
    match action {
        Action::Click { selector } => click(doc, overlay, selector),
        Action::Type {
            selector,
            text,
            clear,
        } => type_text(doc, tempo, selector, text, clear.unwrap_or(true)).await,
        Action::Select { selector, value } => select(doc, selector, value),
        Action::Hover { selector } => hover(doc, selector),
        Action::Scroll {
            direction,
            amount,
            selector,
        } => scroll(doc, *direction, *amount, selector.as_deref()),
        Action::Extract {
            selector,
            attribute,
        } => extract(doc, selector, attribute.as_deref()),
        Action::Evaluate { expression } => evaluate(doc, expression),
        Action::Keyboard { key } => keyboard(doc, key),
        Action::Wait {
            selector,
            timeout,
            milliseconds,
        } => wait(doc, selector.as_deref(), *timeout, *milliseconds).await,
        Action::Drag {
            from_selector,
            to_selector,
        } => drag(doc, tempo, from_selector, to_selector).await,
        Action::Describe { text } => Ok(ActionOutcome::ok(text.clone())),
        other => Err(ProbeError::unsupported(format!(
            "action {:?} is not an in-frame operation",
            other.name()
        ))),
    }
}

fn click(
    doc: &Mutex<Document>,
    overlay: &Mutex<Overlay>,
    selector: &str,
) -> Result<ActionOutcome, ProbeError> {
    let rect = {
        let mut doc = doc.lock();
        let id = selector::require(&doc, selector)?;
        doc.scroll_into_view(id);
        let (cx, cy) = doc.client_center(id);
        for kind in ["mouseover", "mousedown", "mouseup", "click"] {
            doc.dispatch(id, kind, cx, cy);
        }
        doc.node(id).rect
    };
    overlay.lock().flash(rect);
    Ok(ActionOutcome::ok(format!("clicked {selector}")))
}

async fn type_text(
    doc: &Mutex<Document>,
    tempo: &Tempo,
    selector: &str,
    text: &str,
    clear: bool,
) -> Result<ActionOutcome, ProbeError> {
    let id = {
        let mut doc = doc.lock();
        let id = selector::require(&doc, selector)?;
        doc.scroll_into_view(id);
        doc.focus(id);
        if clear {
            doc.node_mut(id).value.clear();
            doc.dispatch(id, "input", 0, 0);
        }
        id
    };

    for (i, ch) in text.chars().enumerate() {
        {
            let mut doc = doc.lock();
            doc.dispatch_with_data(id, "keydown", 0, 0, Some(ch.to_string()));
            doc.node_mut(id).value.push(ch);
            doc.dispatch(id, "input", 0, 0);
            doc.dispatch_with_data(id, "keyup", 0, 0, Some(ch.to_string()));
        }
        tokio::time::sleep(tempo.key_delay(i)).await;
    }

    doc.lock().dispatch(id, "change", 0, 0);
    Ok(ActionOutcome::ok(format!(
        "typed {} characters into {selector}",
        text.chars().count()
    )))
}

fn select(doc: &Mutex<Document>, selector: &str, value: &str) -> Result<ActionOutcome, ProbeError> {
    let mut doc = doc.lock();
    let id = selector::require(&doc, selector)?;
    let found = {
        let node = doc.node_mut(id);
        let mut found = false;
        for opt in node.options.iter_mut() {
            opt.selected = opt.value == value || opt.text == value;
            found |= opt.selected;
        }
        if found {
            node.value = value.to_string();
        }
        found
    };
    if !found {
        return Ok(ActionOutcome::fail(format!(
            "no option {value:?} in {selector}"
        )));
    }
    doc.dispatch(id, "change", 0, 0);
    doc.dispatch(id, "input", 0, 0);
    Ok(ActionOutcome::ok(format!("selected {value:?} in {selector}")))
}

fn hover(doc: &Mutex<Document>, selector: &str) -> Result<ActionOutcome, ProbeError> {
    let mut doc = doc.lock();
    let id = selector::require(&doc, selector)?;
    let (cx, cy) = doc.client_center(id);
    for kind in ["mouseenter", "mouseover", "mousemove"] {
        doc.dispatch(id, kind, cx, cy);
    }
    Ok(ActionOutcome::ok(format!("hovering {selector}")))
}

fn scroll(
    doc: &Mutex<Document>,
    direction: ScrollDirection,
    amount: Option<i32>,
    selector: Option<&str>,
) -> Result<ActionOutcome, ProbeError> {
    let amount = amount.unwrap_or(DEFAULT_SCROLL_AMOUNT).abs();
    let (dx, dy) = match direction {
        ScrollDirection::Up => (0, -amount),
        ScrollDirection::Down => (0, amount),
        ScrollDirection::Left => (-amount, 0),
        ScrollDirection::Right => (amount, 0),
    };

    let mut doc = doc.lock();
    if let Some(selector) = selector {
        let id = selector::require(&doc, selector)?;
        doc.dispatch(id, "scroll", dx, dy);
        return Ok(ActionOutcome::ok(format!("scrolled {selector}")));
    }
    doc.scroll_by(dx, dy);
    let vp = doc.viewport;
    Ok(ActionOutcome::ok(format!(
        "scrolled to ({},{})",
        vp.scroll_x, vp.scroll_y
    )))
}

fn subtree_text(doc: &Document, root: NodeId) -> String {
    let mut parts = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let node = doc.node(id);
        let trimmed = node.text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed.to_string());
        }
        for child in node.children.iter().rev() {
            stack.push(*child);
        }
    }
    parts.join(" ")
}

fn extract(
    doc: &Mutex<Document>,
    selector: &str,
    attribute: Option<&str>,
) -> Result<ActionOutcome, ProbeError> {
    let doc = doc.lock();
    let matches = selector::query_all(&doc, selector)?;
    if matches.is_empty() {
        return Err(ProbeError::not_found(selector));
    }

    let values: Vec<Value> = matches
        .iter()
        .map(|id| {
            let text = match attribute {
                None | Some("textContent") | Some("innerHTML") => subtree_text(&doc, *id),
                Some(attr) => doc.node(*id).attr(attr).unwrap_or_default().to_string(),
            };
            Value::String(text)
        })
        .collect();

    Ok(ActionOutcome::ok_with(
        format!("extracted {} nodes for {selector}", values.len()),
        Value::Array(values),
    ))
}

fn evaluate(doc: &Mutex<Document>, expression: &str) -> Result<ActionOutcome, ProbeError> {
    let doc = doc.lock();
    let expr = expression.trim();

    let result = if expr == "document.title" {
        Some(doc.title.clone())
    } else if matches!(expr, "location.href" | "window.location.href" | "document.URL") {
        Some(doc.url.clone())
    } else if matches!(expr, "document.body.innerText" | "document.body.textContent") {
        Some(doc.inner_text(doc.body()))
    } else if let Some(sel) = parse_query_call(expr, "document.querySelectorAll(", ").length") {
        Some(selector::query_all(&doc, &sel)?.len().to_string())
    } else if let Some(sel) = parse_query_call(expr, "document.querySelector(", ").textContent") {
        let id = selector::require(&doc, &sel)?;
        Some(subtree_text(&doc, id))
    } else {
        None
    };

    match result {
        Some(mut text) => {
            if text.chars().count() > EVAL_RESULT_CAP {
                text = text.chars().take(EVAL_RESULT_CAP).collect();
            }
            Ok(ActionOutcome::ok_with("evaluated", json!(text)))
        }
        None => Ok(ActionOutcome::fail(format!(
            "unsupported expression: {}",
            expr.chars().take(120).collect::<String>()
        ))),
    }
}

fn parse_query_call(expr: &str, prefix: &str, suffix: &str) -> Option<String> {
    let inner = expr.strip_prefix(prefix)?.strip_suffix(suffix)?;
    let inner = inner.trim();
    let unquoted = inner
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))?;
    Some(unquoted.to_string())
}

fn keyboard(doc: &Mutex<Document>, key: &str) -> Result<ActionOutcome, ProbeError> {
    let mut doc = doc.lock();
    let target = doc.active_element().unwrap_or_else(|| doc.body());
    doc.dispatch_with_data(target, "keydown", 0, 0, Some(key.to_string()));
    if key == "Enter" {
        doc.dispatch_with_data(target, "keypress", 0, 0, Some(key.to_string()));
    }
    doc.dispatch_with_data(target, "keyup", 0, 0, Some(key.to_string()));
    Ok(ActionOutcome::ok(format!("pressed {key}")))
}

async fn wait(
    doc: &Mutex<Document>,
    selector: Option<&str>,
    timeout: Option<u64>,
    milliseconds: Option<u64>,
) -> Result<ActionOutcome, ProbeError> {
    match selector {
        Some(sel) => {
            let deadline = timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS);
            let mut waited = 0u64;
            loop {
                if selector::query_first(&doc.lock(), sel)?.is_some() {
                    return Ok(ActionOutcome::ok(format!("{sel} appeared after {waited} ms")));
                }
                if waited >= deadline {
                    return Ok(ActionOutcome::fail(format!(
                        "timed out after {deadline} ms waiting for {sel}"
                    )));
                }
                tokio::time::sleep(std::time::Duration::from_millis(WAIT_POLL_MS)).await;
                waited += WAIT_POLL_MS;
            }
        }
        None => {
            let ms = milliseconds.unwrap_or(DEFAULT_SLEEP_MS);
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
            Ok(ActionOutcome::ok(format!("waited {ms} ms")))
        }
    }
}

pub(crate) fn short_label(doc: &Document, id: NodeId) -> String {
    let node = doc.node(id);
    let text = node.text.trim();
    let label = if !text.is_empty() {
        text
    } else if let Some(aria) = node.attr("aria-label") {
        aria
    } else {
        node.tag.as_str()
    };
    label.chars().take(40).collect()
}

/// Synthesized two-phase drag: pointer/mouse interpolation first, then a
/// best-effort HTML5 sequence. Different drag libraries listen on
/// different subsets, so both phases always run.
async fn drag(
    doc: &Mutex<Document>,
    tempo: &Tempo,
    from_selector: &str,
    to_selector: &str,
) -> Result<ActionOutcome, ProbeError> {
    let (from_id, to_id, from_center, to_center, payload) = {
        let mut doc = doc.lock();
        let from_id = selector::require(&doc, from_selector)?;
        let to_id = selector::require(&doc, to_selector)?;
        doc.scroll_into_view(from_id);
        let from_center = doc.client_center(from_id);
        let to_center = doc.client_center(to_id);
        let payload = short_label(&doc, from_id);
        (from_id, to_id, from_center, to_center, payload)
    };

    {
        let mut doc = doc.lock();
        doc.dispatch(from_id, "pointerdown", from_center.0, from_center.1);
        doc.dispatch(from_id, "mousedown", from_center.0, from_center.1);
    }
    tokio::time::sleep(tempo.drag_phase()).await;

    for step in 1..=DRAG_MOVE_STEPS {
        let x = from_center.0 + (to_center.0 - from_center.0) * step / DRAG_MOVE_STEPS;
        let y = from_center.1 + (to_center.1 - from_center.1) * step / DRAG_MOVE_STEPS;
        {
            let mut doc = doc.lock();
            doc.dispatch(from_id, "pointermove", x, y);
            doc.dispatch(from_id, "mousemove", x, y);
        }
        tokio::time::sleep(tempo.drag_step()).await;
    }

    {
        let mut doc = doc.lock();
        doc.dispatch(to_id, "mouseenter", to_center.0, to_center.1);
        doc.dispatch(to_id, "mouseover", to_center.0, to_center.1);
        doc.dispatch(to_id, "pointerup", to_center.0, to_center.1);
        doc.dispatch(to_id, "mouseup", to_center.0, to_center.1);
    }
    tokio::time::sleep(tempo.drag_phase()).await;

    {
        let mut doc = doc.lock();
        let data = Some(payload.clone());
        doc.dispatch_with_data(from_id, "dragstart", from_center.0, from_center.1, data.clone());
        doc.dispatch(to_id, "dragenter", to_center.0, to_center.1);
        doc.dispatch(to_id, "dragover", to_center.0, to_center.1);
        doc.dispatch_with_data(to_id, "drop", to_center.0, to_center.1, data);
        doc.dispatch(from_id, "dragend", from_center.0, from_center.1);
    }

    Ok(ActionOutcome::ok(format!(
        "dragged {from_selector} to {to_selector}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Node, Viewport};

    fn locked(doc: Document) -> (Mutex<Document>, Mutex<Overlay>) {
        (Mutex::new(doc), Mutex::new(Overlay::default()))
    }

    fn form_doc() -> Document {
        let mut doc = Document::new("https://example.com", "Form", Viewport::default());
        doc.append(
            None,
            Node::new("input")
                .with_attr("type", "text")
                .with_id("q")
                .with_rect(10, 10, 200, 24),
        );
        doc.append(
            None,
            Node::new("button").with_id("go").with_text("Go").with_rect(10, 50, 40, 24),
        );
        doc
    }

    #[tokio::test]
    async fn click_dispatches_full_mouse_sequence() {
        let (doc, overlay) = locked(form_doc());
        let outcome = execute(
            &doc,
            &overlay,
            &Tempo::instant(),
            &Action::Click {
                selector: "#go".into(),
            },
        )
        .await
        .unwrap();
        assert!(outcome.success);

        let kinds: Vec<String> = doc.lock().events().iter().map(|e| e.kind.clone()).collect();
        assert_eq!(kinds, vec!["mouseover", "mousedown", "mouseup", "click"]);
        assert_eq!(overlay.lock().flashes, 1);
    }

    #[tokio::test]
    async fn type_emits_per_character_keys_and_final_change() {
        let (doc, overlay) = locked(form_doc());
        execute(
            &doc,
            &overlay,
            &Tempo::instant(),
            &Action::Type {
                selector: "#q".into(),
                text: "hi".into(),
                clear: None,
            },
        )
        .await
        .unwrap();

        let doc = doc.lock();
        let input = selector::query_first(&doc, "#q").unwrap().unwrap();
        assert_eq!(doc.node(input).value, "hi");
        let kinds: Vec<&str> = doc.events().iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds.iter().filter(|k| **k == "keydown").count(), 2);
        assert_eq!(kinds.last(), Some(&"change"));
    }

    #[tokio::test]
    async fn missing_selector_raises_not_found() {
        let (doc, overlay) = locked(form_doc());
        let err = execute(
            &doc,
            &overlay,
            &Tempo::instant(),
            &Action::Click {
                selector: "#absent".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProbeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn extract_returns_many_matches() {
        let mut base = form_doc();
        base.append(None, Node::new("p").with_class("row").with_text("one").with_rect(0, 0, 5, 5));
        base.append(None, Node::new("p").with_class("row").with_text("two").with_rect(0, 6, 5, 5));
        let (doc, overlay) = locked(base);

        let outcome = execute(
            &doc,
            &overlay,
            &Tempo::instant(),
            &Action::Extract {
                selector: ".row".into(),
                attribute: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(
            outcome.data.unwrap(),
            serde_json::json!(["one", "two"])
        );
    }

    #[tokio::test]
    async fn evaluate_supports_query_length() {
        let (doc, overlay) = locked(form_doc());
        let outcome = execute(
            &doc,
            &overlay,
            &Tempo::instant(),
            &Action::Evaluate {
                expression: "document.querySelectorAll('input').length".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(outcome.data.unwrap(), serde_json::json!("1"));
    }

    #[tokio::test]
    async fn drag_runs_pointer_then_html5_phases() {
        let mut base = Document::new("https://example.com", "", Viewport::default());
        base.append(
            None,
            Node::new("div")
                .with_id("tile")
                .with_text("Tile A")
                .with_attr("draggable", "true")
                .with_rect(10, 10, 40, 40),
        );
        base.append(
            None,
            Node::new("div")
                .with_id("zone")
                .with_listener("drop")
                .with_rect(300, 10, 80, 80),
        );
        let (doc, overlay) = locked(base);

        execute(
            &doc,
            &overlay,
            &Tempo::instant(),
            &Action::Drag {
                from_selector: "#tile".into(),
                to_selector: "#zone".into(),
            },
        )
        .await
        .unwrap();

        let doc = doc.lock();
        let kinds: Vec<&str> = doc.events().iter().map(|e| e.kind.as_str()).collect();
        let pos = |k: &str| kinds.iter().position(|x| *x == k).unwrap_or(usize::MAX);
        assert!(pos("pointerdown") < pos("pointermove"));
        assert!(pos("mouseup") < pos("dragstart"));
        assert!(pos("dragover") < pos("drop"));
        assert!(pos("drop") < pos("dragend"));
        assert_eq!(kinds.iter().filter(|k| **k == "mousemove").count(), 10);

        let drop = doc.events().iter().find(|e| e.kind == "drop").unwrap();
        assert_eq!(drop.data.as_deref(), Some("Tile A"));
    }
}
