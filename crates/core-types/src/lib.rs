//! Shared primitives for the tabpilot agent driver.
//!
//! Everything the driver crates exchange lives here: host-protocol ids,
//! the action sum type, the perception bundle, planner decisions, driver
//! events, and the host-facing ports (`TabHandle`, `Storage`).

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

pub mod action;
pub mod decision;
pub mod element;
pub mod events;
pub mod ports;

pub use action::{Action, ActionRequest, ScrollDirection};
pub use decision::{AgentMode, ConversationEntry, ModelDecision, Role};
pub use element::{PageContext, SelectOption, VisualElement};
pub use events::{ActionLog, DriverEvent, DriverStatus, ExecutionStateChanged, LogKind, StatusUpdate};
pub use ports::{FrameInfo, Storage, TabGroupInfo, TabHandle, TabInfo};

/// Error surfaced by host-provided capabilities (tab, storage, debug channel).
///
/// The host side is free-form; the driver only needs the message and whether
/// the capability is present at all.
#[derive(Debug, Error, Clone)]
pub enum HostError {
    #[error("{message}")]
    Message { message: String },

    #[error("capability not supported by this host: {0}")]
    Unsupported(String),
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    pub fn unsupported(capability: impl Into<String>) -> Self {
        Self::Unsupported(capability.into())
    }
}

/// Host tab identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TabId(pub i64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab:{}", self.0)
    }
}

/// Frame identifier within a tab. The top document is always `FrameId(0)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FrameId(pub u64);

impl FrameId {
    pub const TOP: FrameId = FrameId(0);

    pub fn is_top(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame:{}", self.0)
    }
}

/// Tab-group identifier as reported by the host.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct GroupId(pub i64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group:{}", self.0)
    }
}

/// Correlation id for one natural-language command run through the loop.
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CommandId(pub String);

impl CommandId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd:{}", self.0)
    }
}
