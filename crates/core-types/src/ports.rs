//! Host-facing ports.
//!
//! The driver core never talks to a browser directly; it consumes a
//! [`TabHandle`] with DOM/debug capabilities and a [`Storage`] with the
//! user's credentials. Hosts (an extension bridge, a CDP adapter, or the
//! in-process test host) implement these traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::{FrameId, GroupId, HostError, TabId};

/// One frame of a tab as reported by the host's frame enumeration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameInfo {
    pub frame_id: FrameId,
    pub parent_frame_id: Option<FrameId>,
    pub url: String,
}

impl FrameInfo {
    pub fn is_top(&self) -> bool {
        self.frame_id.is_top()
    }
}

/// One open tab, for `tab_list` and index-addressed tab operations.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TabInfo {
    pub id: TabId,
    pub title: String,
    pub url: String,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupId>,
}

/// One tab group, for `tab_list`'s structured payload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TabGroupInfo {
    pub id: GroupId,
    pub title: String,
    pub color: String,
}

/// Host-provided handle to one browser tab.
///
/// Capability methods are grouped the way the host exposes them: frame
/// messaging, navigation, tab/tab-group management, and the low-level debug
/// channel used for screenshots and trusted input replay.
#[async_trait]
pub trait TabHandle: Send + Sync {
    fn id(&self) -> TabId;

    async fn url(&self) -> Result<String, HostError>;

    async fn title(&self) -> Result<String, HostError>;

    /// Install the page probe into every frame. Idempotent; frames that
    /// already carry a probe keep it.
    async fn inject_probe_all_frames(&self) -> Result<(), HostError>;

    /// Navigation-stable frame enumeration. Preferred over injection-based
    /// discovery because iframes can navigate mid-step.
    async fn enumerate_frames(&self) -> Result<Vec<FrameInfo>, HostError>;

    /// Request/reply to the probe in one frame. `None` means the frame did
    /// not answer (missing probe, restricted document).
    async fn send_to_frame(
        &self,
        frame: FrameId,
        message: Value,
    ) -> Result<Option<Value>, HostError>;

    async fn update_url(&self, url: &str) -> Result<(), HostError>;

    /// Wait until the tab reports completed loading, bounded by `timeout`.
    /// Returns false on timeout.
    async fn wait_loaded(&self, timeout: Duration) -> Result<bool, HostError>;

    async fn activate(&self) -> Result<(), HostError>;

    async fn close(&self) -> Result<(), HostError>;

    /// Activate another tab of the same window by id.
    async fn activate_tab(&self, tab: TabId) -> Result<(), HostError>;

    /// Close another tab of the same window by id.
    async fn close_tab(&self, tab: TabId) -> Result<(), HostError>;

    /// Open a new tab, optionally at a URL.
    async fn open(&self, url: Option<&str>) -> Result<Arc<dyn TabHandle>, HostError>;

    async fn list_tabs(&self) -> Result<Vec<TabInfo>, HostError>;

    async fn list_tab_groups(&self) -> Result<Vec<TabGroupInfo>, HostError>;

    async fn group_tabs(
        &self,
        tab_ids: &[TabId],
        color: Option<&str>,
        title: Option<&str>,
    ) -> Result<GroupId, HostError>;

    async fn add_to_group(&self, group: GroupId, tab_ids: &[TabId]) -> Result<(), HostError>;

    async fn ungroup(&self, group: GroupId) -> Result<(), HostError>;

    /// Bind the browser's debug channel to this tab. Idempotent.
    async fn debug_attach(&self) -> Result<(), HostError>;

    async fn debug_detach(&self) -> Result<(), HostError>;

    /// Raw debug-channel command, e.g. `Input.dispatchMouseEvent`.
    async fn debug_send(&self, method: &str, params: Value) -> Result<Value, HostError>;

    /// Capture the visible viewport as base64 PNG over the debug channel.
    async fn capture_screenshot(&self) -> Result<String, HostError>;
}

/// Well-known storage keys for the driver's configuration.
pub mod keys {
    pub const AI_PROVIDER: &str = "aiProvider";
    pub const AI_MODEL: &str = "aiModel";
    pub const AI_API_KEY: &str = "aiApiKey";
    pub const GROQ_VISION_MODEL: &str = "groqVisionModel";
    pub const SEARCH_ENABLED: &str = "searchEnabled";
    pub const SEARCH_MODEL: &str = "searchModel";
}

/// Key-value persistence for credentials and model choices.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, HostError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), HostError>;
}
