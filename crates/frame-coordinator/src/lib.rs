//! Frame coordination.
//!
//! Enumerates a tab's frames through the host's navigation-stable API,
//! injects the probe (iframes may have replaced their document since the
//! last step), and routes probe requests to a specific frame under a hard
//! per-frame timeout so a wedged frame never blocks the pipeline.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use tabpilot_core_types::{Action, FrameId, FrameInfo, HostError, TabHandle};
use tabpilot_page_probe::{ActionOutcome, DragCoords, ProbeError, ProbeReply, ProbeRequest};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The frame did not answer within the per-frame timeout.
    #[error("frame {frame} timed out after {timeout_ms} ms")]
    FrameTimeout { frame: FrameId, timeout_ms: u64 },

    /// The frame exists but carries no probe (restricted document, race
    /// with navigation).
    #[error("frame {frame} is unavailable")]
    FrameUnavailable { frame: FrameId },

    /// The probe answered with a typed error.
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// The reply did not parse as a probe message.
    #[error("malformed probe reply from frame {frame}: {reason}")]
    Protocol { frame: FrameId, reason: String },

    #[error(transparent)]
    Host(#[from] HostError),
}

impl CoordinatorError {
    /// True when the underlying failure was a selector miss, which action
    /// recovery paths treat differently from transport failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoordinatorError::Probe(err) if err.is_not_found())
    }
}

/// Coordinator tuning.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Hard cap on one frame request.
    pub frame_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            frame_timeout: Duration::from_secs(3),
        }
    }
}

/// Routes probe traffic for one tab at a time.
#[derive(Debug, Clone, Default)]
pub struct FrameCoordinator {
    config: CoordinatorConfig,
}

/// True for frames the driver perceives: real web content only.
pub fn is_content_frame(info: &FrameInfo) -> bool {
    url::Url::parse(&info.url)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

impl FrameCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self { config }
    }

    pub fn frame_timeout(&self) -> Duration {
        self.config.frame_timeout
    }

    /// All frames of the tab, top first.
    pub async fn enumerate(
        &self,
        tab: &dyn TabHandle,
    ) -> Result<Vec<FrameInfo>, CoordinatorError> {
        let mut frames = tab.enumerate_frames().await?;
        frames.sort_by_key(|f| f.frame_id.0);
        Ok(frames)
    }

    /// Content-bearing frames only (http/https documents).
    pub async fn content_frames(
        &self,
        tab: &dyn TabHandle,
    ) -> Result<Vec<FrameInfo>, CoordinatorError> {
        Ok(self
            .enumerate(tab)
            .await?
            .into_iter()
            .filter(is_content_frame)
            .collect())
    }

    /// (Re-)inject the probe into every frame. Safe to call repeatedly;
    /// frames that already carry a probe keep it.
    pub async fn inject_probes(&self, tab: &dyn TabHandle) -> Result<(), CoordinatorError> {
        tab.inject_probe_all_frames().await?;
        Ok(())
    }

    /// Send one probe request to one frame under the hard timeout.
    pub async fn request(
        &self,
        tab: &dyn TabHandle,
        frame: FrameId,
        request: ProbeRequest,
    ) -> Result<ProbeReply, CoordinatorError> {
        let message = serde_json::to_value(&request).map_err(|err| CoordinatorError::Protocol {
            frame,
            reason: err.to_string(),
        })?;

        let send = tab.send_to_frame(frame, message);
        let reply: Option<Value> =
            match tokio::time::timeout(self.config.frame_timeout, send).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(target: "frame_coordinator", %frame, "frame request timed out");
                    return Err(CoordinatorError::FrameTimeout {
                        frame,
                        timeout_ms: self.config.frame_timeout.as_millis() as u64,
                    });
                }
            };

        let Some(reply) = reply else {
            debug!(target: "frame_coordinator", %frame, "no probe answered");
            return Err(CoordinatorError::FrameUnavailable { frame });
        };

        let reply: ProbeReply =
            serde_json::from_value(reply).map_err(|err| CoordinatorError::Protocol {
                frame,
                reason: err.to_string(),
            })?;
        if let ProbeReply::Error { error } = reply {
            return Err(CoordinatorError::Probe(error));
        }
        Ok(reply)
    }

    /// Build the Visual Page Map of one frame.
    pub async fn build_map(
        &self,
        tab: &dyn TabHandle,
        frame: FrameId,
    ) -> Result<String, CoordinatorError> {
        match self.request(tab, frame, ProbeRequest::BuildVisualMap).await? {
            ProbeReply::Map { map } => Ok(map),
            other => Err(CoordinatorError::Protocol {
                frame,
                reason: format!("expected map reply, got {other:?}"),
            }),
        }
    }

    /// Execute one in-frame action.
    pub async fn execute_action(
        &self,
        tab: &dyn TabHandle,
        frame: FrameId,
        action: &Action,
    ) -> Result<ActionOutcome, CoordinatorError> {
        let request = ProbeRequest::ExecuteAction {
            action: action.clone(),
        };
        match self.request(tab, frame, request).await? {
            ProbeReply::Action { outcome } => Ok(outcome),
            other => Err(CoordinatorError::Protocol {
                frame,
                reason: format!("expected action reply, got {other:?}"),
            }),
        }
    }

    /// Resolve drag endpoints inside one frame.
    pub async fn drag_coords(
        &self,
        tab: &dyn TabHandle,
        frame: FrameId,
        from: &str,
        to: &str,
    ) -> Result<DragCoords, CoordinatorError> {
        let request = ProbeRequest::GetDragCoords {
            from: from.to_string(),
            to: to.to_string(),
        };
        match self.request(tab, frame, request).await? {
            ProbeReply::Coords { coords } => Ok(coords),
            other => Err(CoordinatorError::Protocol {
                frame,
                reason: format!("expected coords reply, got {other:?}"),
            }),
        }
    }

    /// Viewport offset of the tab's first iframe, read from the top frame.
    pub async fn iframe_offset(
        &self,
        tab: &dyn TabHandle,
    ) -> Result<(i32, i32), CoordinatorError> {
        match self
            .request(tab, FrameId::TOP, ProbeRequest::IframeOffset)
            .await?
        {
            ProbeReply::Offset { x, y } => Ok((x, y)),
            other => Err(CoordinatorError::Protocol {
                frame: FrameId::TOP,
                reason: format!("expected offset reply, got {other:?}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use tabpilot_core_types::{GroupId, TabGroupInfo, TabId, TabInfo};
    use tabpilot_page_probe::{Document, Node, Probe, Tempo, Viewport};

    /// Host stub: frame 0 carries a live probe, frame 1 is wedged, frame 2
    /// is a restricted document with no probe.
    struct StubTab {
        probe: Arc<Probe>,
    }

    impl StubTab {
        fn new() -> Self {
            let mut doc = Document::new("https://example.com", "Example", Viewport::default());
            doc.append(
                None,
                Node::new("button").with_id("go").with_text("Go").with_rect(5, 5, 40, 20),
            );
            let doc = Arc::new(Mutex::new(doc));
            let probe = Probe::install(&doc, Tempo::instant()).unwrap();
            Self { probe }
        }
    }

    #[async_trait]
    impl TabHandle for StubTab {
        fn id(&self) -> TabId {
            TabId(1)
        }

        async fn url(&self) -> Result<String, HostError> {
            Ok("https://example.com".into())
        }

        async fn title(&self) -> Result<String, HostError> {
            Ok("Example".into())
        }

        async fn inject_probe_all_frames(&self) -> Result<(), HostError> {
            Ok(())
        }

        async fn enumerate_frames(&self) -> Result<Vec<FrameInfo>, HostError> {
            Ok(vec![
                FrameInfo {
                    frame_id: FrameId::TOP,
                    parent_frame_id: None,
                    url: "https://example.com".into(),
                },
                FrameInfo {
                    frame_id: FrameId(1),
                    parent_frame_id: Some(FrameId::TOP),
                    url: "https://slow.example.com".into(),
                },
                FrameInfo {
                    frame_id: FrameId(2),
                    parent_frame_id: Some(FrameId::TOP),
                    url: "about:blank".into(),
                },
            ])
        }

        async fn send_to_frame(
            &self,
            frame: FrameId,
            message: Value,
        ) -> Result<Option<Value>, HostError> {
            match frame.0 {
                0 => Ok(Some(self.probe.handle_value(message).await)),
                1 => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(None)
                }
                _ => Ok(None),
            }
        }

        async fn update_url(&self, _url: &str) -> Result<(), HostError> {
            Err(HostError::unsupported("update_url"))
        }

        async fn wait_loaded(&self, _timeout: Duration) -> Result<bool, HostError> {
            Ok(true)
        }

        async fn activate(&self) -> Result<(), HostError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), HostError> {
            Ok(())
        }

        async fn activate_tab(&self, _tab: TabId) -> Result<(), HostError> {
            Err(HostError::unsupported("activate_tab"))
        }

        async fn close_tab(&self, _tab: TabId) -> Result<(), HostError> {
            Err(HostError::unsupported("close_tab"))
        }

        async fn open(&self, _url: Option<&str>) -> Result<Arc<dyn TabHandle>, HostError> {
            Err(HostError::unsupported("open"))
        }

        async fn list_tabs(&self) -> Result<Vec<TabInfo>, HostError> {
            Ok(Vec::new())
        }

        async fn list_tab_groups(&self) -> Result<Vec<TabGroupInfo>, HostError> {
            Ok(Vec::new())
        }

        async fn group_tabs(
            &self,
            _tab_ids: &[TabId],
            _color: Option<&str>,
            _title: Option<&str>,
        ) -> Result<GroupId, HostError> {
            Err(HostError::unsupported("group_tabs"))
        }

        async fn add_to_group(&self, _group: GroupId, _tab_ids: &[TabId]) -> Result<(), HostError> {
            Err(HostError::unsupported("add_to_group"))
        }

        async fn ungroup(&self, _group: GroupId) -> Result<(), HostError> {
            Err(HostError::unsupported("ungroup"))
        }

        async fn debug_attach(&self) -> Result<(), HostError> {
            Ok(())
        }

        async fn debug_detach(&self) -> Result<(), HostError> {
            Ok(())
        }

        async fn debug_send(&self, _method: &str, _params: Value) -> Result<Value, HostError> {
            Ok(Value::Null)
        }

        async fn capture_screenshot(&self) -> Result<String, HostError> {
            Err(HostError::unsupported("capture_screenshot"))
        }
    }

    fn fast_coordinator() -> FrameCoordinator {
        FrameCoordinator::new(CoordinatorConfig {
            frame_timeout: Duration::from_millis(50),
        })
    }

    #[tokio::test]
    async fn content_frames_drop_restricted_documents() {
        let tab = StubTab::new();
        let frames = fast_coordinator().content_frames(&tab).await.unwrap();
        let ids: Vec<u64> = frames.iter().map(|f| f.frame_id.0).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[tokio::test]
    async fn map_request_reaches_top_frame_probe() {
        let tab = StubTab::new();
        let map = fast_coordinator()
            .build_map(&tab, FrameId::TOP)
            .await
            .unwrap();
        assert!(map.contains("sel=\"#go\""));
    }

    #[tokio::test]
    async fn wedged_frame_times_out_without_blocking() {
        let tab = StubTab::new();
        let start = std::time::Instant::now();
        let err = fast_coordinator()
            .build_map(&tab, FrameId(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::FrameTimeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn probeless_frame_reports_unavailable() {
        let tab = StubTab::new();
        let err = fast_coordinator()
            .build_map(&tab, FrameId(2))
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::FrameUnavailable { .. }));
    }
}
