//! Planner output and the conversation entries the dispatcher retains.

use serde::{Deserialize, Serialize};

use crate::action::ActionRequest;

/// Loop operating mode. Quiz mode tightens break-points and pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    Normal,
    Quiz,
}

impl AgentMode {
    pub fn is_quiz(&self) -> bool {
        matches!(self, AgentMode::Quiz)
    }
}

/// One structured decision from the planner model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelDecision {
    #[serde(default)]
    pub thinking: String,

    /// Required; an empty batch does not count as progress.
    #[serde(default)]
    pub actions: Vec<ActionRequest>,

    #[serde(default)]
    pub done: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Planner-requested mode switch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<AgentMode>,
}

impl ModelDecision {
    /// Decision with no actions, used when every parse attempt failed so the
    /// loop can retry instead of crashing.
    pub fn neutral() -> Self {
        Self::default()
    }

    /// A decision counts as progress only when it carries at least one
    /// non-`describe` action. Narrating models otherwise loop forever.
    pub fn has_progress(&self) -> bool {
        self.actions.iter().any(|a| !a.action.is_describe())
    }
}

/// Chat role for conversation entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One retained exchange line in the dispatcher's window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub content: String,
}

impl ConversationEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;

    #[test]
    fn describe_only_batch_is_not_progress() {
        let decision = ModelDecision {
            actions: vec![ActionRequest::top(Action::Describe {
                text: "the page shows a quiz".into(),
            })],
            ..Default::default()
        };
        assert!(!decision.has_progress());

        let decision = ModelDecision {
            actions: vec![
                ActionRequest::top(Action::Describe { text: "…".into() }),
                ActionRequest::top(Action::Snapshot),
            ],
            ..Default::default()
        };
        assert!(decision.has_progress());
    }

    #[test]
    fn mode_parses_from_snake_case() {
        let decision: ModelDecision =
            serde_json::from_str(r#"{"actions":[],"mode":"quiz"}"#).unwrap();
        assert_eq!(decision.mode, Some(AgentMode::Quiz));
    }
}
