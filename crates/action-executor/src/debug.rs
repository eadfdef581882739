//! Debug-channel plumbing: idempotent attach tracking and trusted mouse
//! replay.

use dashmap::DashSet;
use serde_json::json;
use tracing::debug;

use tabpilot_core_types::{HostError, TabHandle, TabId};

/// Process-wide record of tabs currently bound to the debug channel.
///
/// Attach is idempotent per tab; detach (including tab close) removes the
/// entry so a later command re-attaches cleanly.
#[derive(Debug, Default)]
pub struct DebugRegistry {
    attached: DashSet<TabId>,
}

impl DebugRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self, tab: TabId) -> bool {
        self.attached.contains(&tab)
    }

    /// Attach the debug channel to `tab` unless it already is.
    pub async fn ensure_attached(&self, tab: &dyn TabHandle) -> Result<(), HostError> {
        if self.attached.contains(&tab.id()) {
            return Ok(());
        }
        tab.debug_attach().await?;
        self.attached.insert(tab.id());
        debug!(target: "action_executor", tab = %tab.id(), "debugger attached");
        Ok(())
    }

    pub async fn detach(&self, tab: &dyn TabHandle) -> Result<(), HostError> {
        if self.attached.remove(&tab.id()).is_some() {
            tab.debug_detach().await?;
        }
        Ok(())
    }

    /// Forget a tab that went away (closed, crashed); no detach call.
    pub fn forget(&self, tab: TabId) {
        self.attached.remove(&tab);
    }
}

/// Replay a press → interpolated moves → release sequence through
/// `Input.dispatchMouseEvent`. The browser marks these events trusted.
pub async fn replay_mouse_drag(
    tab: &dyn TabHandle,
    from: (i32, i32),
    to: (i32, i32),
    steps: u32,
) -> Result<(), HostError> {
    let (fx, fy) = (from.0 as f64, from.1 as f64);
    let (tx, ty) = (to.0 as f64, to.1 as f64);

    tab.debug_send(
        "Input.dispatchMouseEvent",
        json!({
            "type": "mousePressed",
            "x": fx,
            "y": fy,
            "button": "left",
            "clickCount": 1,
        }),
    )
    .await?;

    let steps = steps.max(1);
    for step in 1..=steps {
        let t = step as f64 / steps as f64;
        tab.debug_send(
            "Input.dispatchMouseEvent",
            json!({
                "type": "mouseMoved",
                "x": fx + (tx - fx) * t,
                "y": fy + (ty - fy) * t,
                "button": "left",
            }),
        )
        .await?;
    }

    tab.debug_send(
        "Input.dispatchMouseEvent",
        json!({
            "type": "mouseReleased",
            "x": tx,
            "y": ty,
            "button": "left",
            "clickCount": 1,
        }),
    )
    .await?;

    Ok(())
}
