//! The action vocabulary the planner emits and the executor consumes.
//!
//! Every action is one tagged variant; `frameId` is orthogonal and carried
//! by [`ActionRequest`]. The serde shape is the wire JSON the LLM produces:
//! a `type` tag plus camelCase payload fields.

use serde::{Deserialize, Serialize};

use crate::FrameId;

/// Scroll direction for the `scroll` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl Default for ScrollDirection {
    fn default() -> Self {
        ScrollDirection::Down
    }
}

/// One DOM- or tab-level action.
///
/// Selector-bearing variants use `selector` (or `fromSelector`/`toSelector`
/// for drag). Tab indices are zero-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Click {
        selector: String,
    },
    Type {
        selector: String,
        text: String,
        /// Clear the field before typing. Defaults to true.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        clear: Option<bool>,
    },
    Select {
        selector: String,
        value: String,
    },
    Hover {
        selector: String,
    },
    Scroll {
        #[serde(default)]
        direction: ScrollDirection,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount: Option<i32>,
        /// Scroll a specific element instead of the window.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
    },
    Extract {
        selector: String,
        /// `None` reads textContent; `"innerHTML"` reads markup; anything
        /// else reads that attribute.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attribute: Option<String>,
    },
    Evaluate {
        expression: String,
    },
    Keyboard {
        key: String,
    },
    Wait {
        /// Poll for this selector to exist (bounded by `timeout`).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
        /// Plain sleep when no selector is given.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        milliseconds: Option<u64>,
    },
    Describe {
        #[serde(default)]
        text: String,
    },
    Snapshot,
    Screenshot,
    Navigate {
        url: String,
    },
    #[serde(rename_all = "camelCase")]
    Drag {
        from_selector: String,
        to_selector: String,
    },
    Search {
        query: String,
    },
    TabNew {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    TabClose {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },
    TabSwitch {
        index: usize,
    },
    TabList,
    #[serde(rename_all = "camelCase")]
    TabGroupCreate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab_indices: Option<Vec<usize>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    TabGroupAdd {
        group_id: i64,
        tab_indices: Vec<usize>,
    },
    #[serde(rename_all = "camelCase")]
    TabGroupRemove {
        group_id: i64,
    },
}

impl Action {
    /// Wire name of the action, matching the serde tag.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Click { .. } => "click",
            Action::Type { .. } => "type",
            Action::Select { .. } => "select",
            Action::Hover { .. } => "hover",
            Action::Scroll { .. } => "scroll",
            Action::Extract { .. } => "extract",
            Action::Evaluate { .. } => "evaluate",
            Action::Keyboard { .. } => "keyboard",
            Action::Wait { .. } => "wait",
            Action::Describe { .. } => "describe",
            Action::Snapshot => "snapshot",
            Action::Screenshot => "screenshot",
            Action::Navigate { .. } => "navigate",
            Action::Drag { .. } => "drag",
            Action::Search { .. } => "search",
            Action::TabNew { .. } => "tab_new",
            Action::TabClose { .. } => "tab_close",
            Action::TabSwitch { .. } => "tab_switch",
            Action::TabList => "tab_list",
            Action::TabGroupCreate { .. } => "tab_group_create",
            Action::TabGroupAdd { .. } => "tab_group_add",
            Action::TabGroupRemove { .. } => "tab_group_remove",
        }
    }

    /// Primary selector the action targets, when it has one.
    pub fn selector(&self) -> Option<&str> {
        match self {
            Action::Click { selector }
            | Action::Type { selector, .. }
            | Action::Select { selector, .. }
            | Action::Hover { selector }
            | Action::Extract { selector, .. } => Some(selector),
            Action::Scroll { selector, .. } => selector.as_deref(),
            Action::Wait { selector, .. } => selector.as_deref(),
            Action::Drag { from_selector, .. } => Some(from_selector),
            _ => None,
        }
    }

    /// True for the narration-only echo action.
    pub fn is_describe(&self) -> bool {
        matches!(self, Action::Describe { .. })
    }

    /// Short human-readable line for action logs.
    pub fn summary(&self) -> String {
        match self {
            Action::Click { selector } => format!("click {selector}"),
            Action::Type { selector, text, .. } => {
                format!("type {:?} into {selector}", truncate(text, 40))
            }
            Action::Select { selector, value } => format!("select {value:?} in {selector}"),
            Action::Hover { selector } => format!("hover {selector}"),
            Action::Scroll {
                direction, amount, ..
            } => format!("scroll {direction:?} {}", amount.unwrap_or(0)),
            Action::Extract { selector, .. } => format!("extract {selector}"),
            Action::Evaluate { .. } => "evaluate expression".to_string(),
            Action::Keyboard { key } => format!("press {key}"),
            Action::Wait {
                selector,
                milliseconds,
                ..
            } => match selector {
                Some(sel) => format!("wait for {sel}"),
                None => format!("wait {} ms", milliseconds.unwrap_or(0)),
            },
            Action::Describe { text } => format!("note: {}", truncate(text, 60)),
            Action::Snapshot => "snapshot page".to_string(),
            Action::Screenshot => "capture screenshot".to_string(),
            Action::Navigate { url } => format!("navigate to {url}"),
            Action::Drag {
                from_selector,
                to_selector,
            } => format!("drag {from_selector} -> {to_selector}"),
            Action::Search { query } => format!("search: {}", truncate(query, 60)),
            Action::TabNew { url } => match url {
                Some(url) => format!("open tab {url}"),
                None => "open tab".to_string(),
            },
            Action::TabClose { index } => match index {
                Some(i) => format!("close tab {i}"),
                None => "close current tab".to_string(),
            },
            Action::TabSwitch { index } => format!("switch to tab {index}"),
            Action::TabList => "list tabs".to_string(),
            Action::TabGroupCreate { title, .. } => {
                format!("create tab group {:?}", title.as_deref().unwrap_or(""))
            }
            Action::TabGroupAdd { group_id, .. } => format!("add tabs to group {group_id}"),
            Action::TabGroupRemove { group_id } => format!("ungroup {group_id}"),
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max).collect();
        format!("{head}…")
    }
}

/// An [`Action`] plus its optional target frame.
///
/// Absence of `frameId` means the top frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    #[serde(flatten)]
    pub action: Action,

    #[serde(
        rename = "frameId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub frame_id: Option<FrameId>,
}

impl ActionRequest {
    pub fn top(action: Action) -> Self {
        Self {
            action,
            frame_id: None,
        }
    }

    pub fn in_frame(action: Action, frame: FrameId) -> Self {
        Self {
            action,
            frame_id: Some(frame),
        }
    }

    /// Target frame, defaulting to the top document.
    pub fn frame(&self) -> FrameId {
        self.frame_id.unwrap_or(FrameId::TOP)
    }
}

impl From<Action> for ActionRequest {
    fn from(action: Action) -> Self {
        ActionRequest::top(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_wire_shape() {
        let req = ActionRequest::in_frame(
            Action::Click {
                selector: "#next".into(),
            },
            FrameId(7),
        );
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "click");
        assert_eq!(json["selector"], "#next");
        assert_eq!(json["frameId"], 7);
    }

    #[test]
    fn drag_uses_camel_case_selectors() {
        let raw = r#"{"type":"drag","fromSelector":".tile","toSelector":".zone","frameId":3}"#;
        let req: ActionRequest = serde_json::from_str(raw).unwrap();
        match &req.action {
            Action::Drag {
                from_selector,
                to_selector,
            } => {
                assert_eq!(from_selector, ".tile");
                assert_eq!(to_selector, ".zone");
            }
            other => panic!("unexpected action: {other:?}"),
        }
        assert_eq!(req.frame(), FrameId(3));
    }

    #[test]
    fn missing_frame_id_targets_top() {
        let req: ActionRequest = serde_json::from_str(r#"{"type":"snapshot"}"#).unwrap();
        assert_eq!(req.frame(), FrameId::TOP);
        assert_eq!(req.action.name(), "snapshot");
    }

    #[test]
    fn tab_actions_round_trip() {
        let raw = r#"{"type":"tab_group_add","groupId":4,"tabIndices":[0,2]}"#;
        let req: ActionRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(
            req.action,
            Action::TabGroupAdd {
                group_id: 4,
                tab_indices: vec![0, 2]
            }
        );
        let back = serde_json::to_string(&req).unwrap();
        assert!(back.contains("\"groupId\":4"));
    }
}
