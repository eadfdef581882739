//! The action execution layer.
//!
//! Dispatches planner actions to the right frame through the coordinator,
//! owns the drag protocol stack (quiz click-to-place, synthesized
//! pointer/HTML5, trusted debug-channel replay), and implements the
//! tab-level operations: navigation, screenshots, tabs and tab groups.
//!
//! Per-action failures come back as unsuccessful outcomes, never as
//! errors; the executor only errors on exhausted drag fallbacks.

pub mod debug;
pub mod tabs;

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use tabpilot_core_types::{
    Action, ActionRequest, AgentMode, FrameId, HostError, TabHandle,
};
use tabpilot_frame_coordinator::{CoordinatorError, FrameCoordinator};
use tabpilot_page_probe::ActionOutcome;

pub use debug::DebugRegistry;

#[derive(Debug, Error)]
pub enum ExecError {
    /// Every drag strategy failed.
    #[error("drag failed after all fallbacks: {0}")]
    DragFailed(String),

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Executor tuning.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound on waiting for a navigation to report complete.
    pub navigate_timeout: Duration,
    /// Settle delay after a completed navigation.
    pub navigate_settle: Duration,
    /// Pause between the two clicks of quiz click-to-place.
    pub click_place_pause: Duration,
    /// Interpolation steps for the trusted drag replay.
    pub trusted_drag_steps: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            navigate_timeout: Duration::from_secs(15),
            navigate_settle: Duration::from_millis(500),
            click_place_pause: Duration::from_millis(500),
            trusted_drag_steps: 15,
        }
    }
}

impl ExecutorConfig {
    /// Zero-delay preset for tests.
    pub fn instant() -> Self {
        Self {
            navigate_timeout: Duration::from_millis(200),
            navigate_settle: Duration::ZERO,
            click_place_pause: Duration::ZERO,
            trusted_drag_steps: 15,
        }
    }
}

pub struct ActionExecutor {
    coordinator: FrameCoordinator,
    debug: std::sync::Arc<DebugRegistry>,
    config: ExecutorConfig,
}

impl ActionExecutor {
    pub fn new(
        coordinator: FrameCoordinator,
        debug: std::sync::Arc<DebugRegistry>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            coordinator,
            debug,
            config,
        }
    }

    pub fn coordinator(&self) -> &FrameCoordinator {
        &self.coordinator
    }

    /// Execute one action. The result is always an outcome; `Err` is
    /// reserved for exhausted drag fallbacks.
    pub async fn execute(
        &self,
        tab: &dyn TabHandle,
        request: &ActionRequest,
        mode: AgentMode,
    ) -> Result<ActionOutcome, ExecError> {
        debug!(
            target: "action_executor",
            action = request.action.name(),
            frame = %request.frame(),
            "dispatch"
        );
        match &request.action {
            Action::Navigate { url } => Ok(self.navigate(tab, url).await),
            Action::Screenshot => Ok(self.screenshot(tab).await),
            Action::Drag {
                from_selector,
                to_selector,
            } => {
                self.drag(tab, request.frame_id, from_selector, to_selector, mode)
                    .await
            }
            // Perception break-points execute in the loop; reaching the
            // executor just acknowledges them.
            Action::Snapshot => Ok(ActionOutcome::ok("snapshot requested")),
            Action::Search { query } => {
                Ok(ActionOutcome::ok(format!("search requested: {query}")))
            }
            Action::TabNew { .. }
            | Action::TabClose { .. }
            | Action::TabSwitch { .. }
            | Action::TabList
            | Action::TabGroupCreate { .. }
            | Action::TabGroupAdd { .. }
            | Action::TabGroupRemove { .. } => {
                Ok(tabs::execute(tab, &request.action).await)
            }
            in_frame => Ok(self.in_frame(tab, request.frame(), in_frame).await),
        }
    }

    /// Route an in-frame action to its probe; failures degrade to an
    /// unsuccessful outcome so the batch continues.
    async fn in_frame(&self, tab: &dyn TabHandle, frame: FrameId, action: &Action) -> ActionOutcome {
        match self.coordinator.execute_action(tab, frame, action).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(
                    target: "action_executor",
                    action = action.name(),
                    %frame,
                    error = %err,
                    "in-frame action failed"
                );
                ActionOutcome::fail(err.to_string())
            }
        }
    }

    async fn navigate(&self, tab: &dyn TabHandle, url: &str) -> ActionOutcome {
        if let Err(err) = tab.update_url(url).await {
            return ActionOutcome::fail(format!("navigation to {url} failed: {err}"));
        }
        let loaded = tab
            .wait_loaded(self.config.navigate_timeout)
            .await
            .unwrap_or(false);
        tokio::time::sleep(self.config.navigate_settle).await;
        if loaded {
            ActionOutcome::ok(format!("navigated to {url}"))
        } else {
            ActionOutcome::ok(format!(
                "navigated to {url} (load still pending after {} s)",
                self.config.navigate_timeout.as_secs()
            ))
        }
    }

    /// Screenshot over the debug channel. Attach is idempotent; failure is
    /// non-fatal and the step proceeds without an image.
    async fn screenshot(&self, tab: &dyn TabHandle) -> ActionOutcome {
        if let Err(err) = self.debug.ensure_attached(tab).await {
            return ActionOutcome::fail(format!("debugger attach failed: {err}"));
        }
        match tab.capture_screenshot().await {
            Ok(base64) if !base64.is_empty() => ActionOutcome::ok_with(
                "captured screenshot",
                serde_json::json!({ "screenshot": base64 }),
            ),
            Ok(_) => ActionOutcome::fail("screenshot was empty"),
            Err(err) => ActionOutcome::fail(format!("screenshot failed: {err}")),
        }
    }

    /// The drag stack. Strategy order depends on mode:
    /// quiz → click-to-place, synthesized, trusted;
    /// normal → synthesized, trusted.
    async fn drag(
        &self,
        tab: &dyn TabHandle,
        frame_hint: Option<FrameId>,
        from: &str,
        to: &str,
        mode: AgentMode,
    ) -> Result<ActionOutcome, ExecError> {
        let frame = match frame_hint {
            Some(frame) => frame,
            None => self.locate_drag_frame(tab, from).await,
        };

        let mut failures: Vec<String> = Vec::new();

        if mode.is_quiz() {
            match self.click_to_place(tab, frame, from, to).await {
                Ok(outcome) => return Ok(outcome),
                Err(reason) => {
                    debug!(target: "action_executor", %reason, "click-to-place failed");
                    failures.push(format!("click-to-place: {reason}"));
                }
            }
        }

        let synthesized = Action::Drag {
            from_selector: from.to_string(),
            to_selector: to.to_string(),
        };
        match self.coordinator.execute_action(tab, frame, &synthesized).await {
            Ok(outcome) if outcome.success => return Ok(outcome),
            Ok(outcome) => failures.push(format!("synthesized: {}", outcome.message)),
            Err(err) => failures.push(format!("synthesized: {err}")),
        }

        match self.trusted_drag(tab, frame, from, to).await {
            Ok(outcome) => Ok(outcome),
            Err(reason) => {
                failures.push(format!("trusted: {reason}"));
                Err(ExecError::DragFailed(failures.join("; ")))
            }
        }
    }

    /// Accessibility-enabled assessment widgets accept select-then-place.
    async fn click_to_place(
        &self,
        tab: &dyn TabHandle,
        frame: FrameId,
        from: &str,
        to: &str,
    ) -> Result<ActionOutcome, String> {
        let click_from = Action::Click {
            selector: from.to_string(),
        };
        self.coordinator
            .execute_action(tab, frame, &click_from)
            .await
            .map_err(|err| err.to_string())?;

        tokio::time::sleep(self.config.click_place_pause).await;

        let click_to = Action::Click {
            selector: to.to_string(),
        };
        self.coordinator
            .execute_action(tab, frame, &click_to)
            .await
            .map_err(|err| err.to_string())?;

        info!(target: "action_executor", %frame, "placed via click-to-place");
        Ok(ActionOutcome::ok(format!(
            "placed {from} into {to} via click-to-place"
        )))
    }

    /// Trusted replay through the debug channel: events arrive with the
    /// browser's trusted flag, which modern drag frameworks require.
    async fn trusted_drag(
        &self,
        tab: &dyn TabHandle,
        frame: FrameId,
        from: &str,
        to: &str,
    ) -> Result<ActionOutcome, String> {
        let coords = self
            .coordinator
            .drag_coords(tab, frame, from, to)
            .await
            .map_err(|err| err.to_string())?;

        // Probe coordinates are frame-local; child frames need the iframe's
        // viewport offset applied.
        let (dx, dy) = if frame.is_top() {
            (0, 0)
        } else {
            self.coordinator
                .iframe_offset(tab)
                .await
                .unwrap_or((0, 0))
        };

        self.debug
            .ensure_attached(tab)
            .await
            .map_err(|err| err.to_string())?;
        debug::replay_mouse_drag(
            tab,
            (coords.from_x + dx, coords.from_y + dy),
            (coords.to_x + dx, coords.to_y + dy),
            self.config.trusted_drag_steps,
        )
        .await
        .map_err(|err| err.to_string())?;

        Ok(ActionOutcome::ok(format!(
            "dragged {:?} to {:?} via trusted input",
            coords.from_label, coords.to_label
        )))
    }

    /// When the planner omitted `frameId` and the source is not in the top
    /// frame, sweep the remaining content frames before failing.
    async fn locate_drag_frame(&self, tab: &dyn TabHandle, from: &str) -> FrameId {
        let probe_click = Action::Wait {
            selector: Some(from.to_string()),
            timeout: Some(0),
            milliseconds: None,
        };
        match self
            .coordinator
            .execute_action(tab, FrameId::TOP, &probe_click)
            .await
        {
            Ok(outcome) if outcome.success => return FrameId::TOP,
            _ => {}
        }

        let frames = match self.coordinator.content_frames(tab).await {
            Ok(frames) => frames,
            Err(_) => return FrameId::TOP,
        };
        for frame in frames.iter().filter(|f| !f.is_top()) {
            let probe = Action::Wait {
                selector: Some(from.to_string()),
                timeout: Some(0),
                milliseconds: None,
            };
            if let Ok(outcome) = self
                .coordinator
                .execute_action(tab, frame.frame_id, &probe)
                .await
            {
                if outcome.success {
                    info!(
                        target: "action_executor",
                        frame = %frame.frame_id,
                        "drag source found in child frame"
                    );
                    return frame.frame_id;
                }
            }
        }
        FrameId::TOP
    }
}
