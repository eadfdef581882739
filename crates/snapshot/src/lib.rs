//! Snapshot service: collect per-frame maps, merge them into one document,
//! and compute token-lean diffs between steps.

pub mod differ;
pub mod merge;

pub use differ::{compute_diff, DIFF_HEADER, PAGE_UNCHANGED};
pub use merge::{has_iframe_section, iframe_header, iframe_section, IFRAME_HEADER_PREFIX};

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use tabpilot_core_types::TabHandle;
use tabpilot_frame_coordinator::{CoordinatorError, FrameCoordinator};

#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The tab has no http(s) top frame to perceive.
    #[error("tab has no content top frame")]
    NoTopFrame,

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
}

/// Snapshot tuning.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Attempts when a quiz snapshot is missing its iframe section.
    pub iframe_retry_attempts: u32,
    /// Delay before each retry; iframes navigating when a snapshot starts
    /// typically settle within a couple of seconds.
    pub iframe_retry_delay: Duration,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            iframe_retry_attempts: 3,
            iframe_retry_delay: Duration::from_millis(1_800),
        }
    }
}

impl SnapshotConfig {
    /// Zero-delay preset for tests.
    pub fn instant() -> Self {
        Self {
            iframe_retry_attempts: 3,
            iframe_retry_delay: Duration::ZERO,
        }
    }
}

/// Collects and merges Visual Page Maps for one tab.
#[derive(Debug, Clone, Default)]
pub struct SnapshotService {
    coordinator: FrameCoordinator,
    config: SnapshotConfig,
}

impl SnapshotService {
    pub fn new(coordinator: FrameCoordinator, config: SnapshotConfig) -> Self {
        Self {
            coordinator,
            config,
        }
    }

    /// Merge every content frame's map into one document: the top frame's
    /// map first (header unmodified), then one iframe block per
    /// content-bearing child frame.
    ///
    /// Probes are (re-)injected first: an iframe may have replaced its
    /// document since the last capture. Child-frame failures degrade that
    /// frame to absent; only a top-frame failure is fatal.
    pub async fn collect_all_frames(&self, tab: &dyn TabHandle) -> Result<String, SnapshotError> {
        self.coordinator.inject_probes(tab).await?;
        let frames = self.coordinator.content_frames(tab).await?;
        let top = frames
            .iter()
            .find(|f| f.is_top())
            .ok_or(SnapshotError::NoTopFrame)?;

        let mut merged = self.coordinator.build_map(tab, top.frame_id).await?;

        for frame in frames.iter().filter(|f| !f.is_top()) {
            match self.coordinator.build_map(tab, frame.frame_id).await {
                Ok(map) => {
                    if let Some(block) = merge::iframe_section(frame.frame_id, &map) {
                        if !merged.ends_with('\n') {
                            merged.push('\n');
                        }
                        merged.push_str(&block);
                    }
                }
                Err(err) => {
                    warn!(
                        target: "snapshot",
                        frame = %frame.frame_id,
                        error = %err,
                        "dropping frame from snapshot"
                    );
                }
            }
        }

        Ok(merged)
    }

    /// Quiz-mode collection: retry until an iframe section appears or the
    /// attempts are exhausted, re-injecting probes between attempts. The
    /// last map is returned either way.
    pub async fn collect_with_iframe_retry(
        &self,
        tab: &dyn TabHandle,
    ) -> Result<String, SnapshotError> {
        let mut map = self.collect_all_frames(tab).await?;
        let mut attempt = 0;
        while !has_iframe_section(&map) && attempt < self.config.iframe_retry_attempts {
            attempt += 1;
            debug!(target: "snapshot", attempt, "iframe section missing, retrying");
            tokio::time::sleep(self.config.iframe_retry_delay).await;
            if let Err(err) = self.coordinator.inject_probes(tab).await {
                warn!(target: "snapshot", error = %err, "probe re-injection failed");
            }
            map = self.collect_all_frames(tab).await?;
        }
        Ok(map)
    }

    pub fn coordinator(&self) -> &FrameCoordinator {
        &self.coordinator
    }
}
