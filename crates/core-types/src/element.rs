//! Perception records: one captured element and the per-step page bundle.

use serde::{Deserialize, Serialize};

/// Upper bound on captured direct text per element.
pub const MAX_ELEMENT_TEXT: usize = 200;
/// Upper bound on captured input values.
pub const MAX_VALUE_TEXT: usize = 100;
/// Upper bound on captured select options.
pub const MAX_OPTIONS: usize = 20;

/// One entry of a selection control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub text: String,
    pub selected: bool,
}

/// A single on-page element as captured by the probe.
///
/// Invariants: `selector` is non-empty and resolves to exactly one node in
/// its frame at capture time; `w` and `h` are non-negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualElement {
    /// Uppercased element kind, e.g. `BUTTON`.
    pub tag: String,
    /// CSS expression stable within the element's frame.
    pub selector: String,
    /// Document-coordinate bounding box.
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    /// Whether the box intersects the viewport.
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub interactive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(default)]
    pub draggable: bool,
    #[serde(default)]
    pub droptarget: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
}

impl VisualElement {
    /// Minimal element for construction sites that fill fields incrementally.
    pub fn new(tag: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            selector: selector.into(),
            x: 0,
            y: 0,
            w: 0,
            h: 0,
            visible: true,
            text: None,
            interactive: false,
            input_type: None,
            value: None,
            placeholder: None,
            aria_label: None,
            checked: None,
            draggable: false,
            droptarget: false,
            disabled: false,
            href: None,
            options: Vec::new(),
        }
    }

    /// Best label for log lines and the key-controls digest.
    pub fn label(&self) -> &str {
        self.text
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.aria_label.as_deref())
            .or(self.placeholder.as_deref())
            .unwrap_or(self.tag.as_str())
    }
}

/// The per-step perception bundle handed to the planner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageContext {
    pub url: String,
    pub title: String,
    /// Full visual map, or a section diff on follow-up quiz steps.
    pub visual_map: String,
    /// Base64 PNG attached when the step needs vision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default)]
    pub needs_vision: bool,
    /// Secondary simplified DOM tree, when a host provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom: Option<serde_json::Value>,
}

impl PageContext {
    pub fn new(url: impl Into<String>, title: impl Into<String>, visual_map: String) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            visual_map,
            screenshot: None,
            needs_vision: false,
            dom: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_prefers_text_over_aria() {
        let mut el = VisualElement::new("BUTTON", "#a");
        el.aria_label = Some("Close dialog".into());
        assert_eq!(el.label(), "Close dialog");
        el.text = Some("Next".into());
        assert_eq!(el.label(), "Next");
    }

    #[test]
    fn empty_optionals_are_omitted_from_json() {
        let el = VisualElement::new("DIV", ".card");
        let json = serde_json::to_string(&el).unwrap();
        assert!(!json.contains("placeholder"));
        assert!(!json.contains("options"));
    }
}
