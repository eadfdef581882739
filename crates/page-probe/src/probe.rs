//! The per-frame probe and its request/reply protocol.
//!
//! A probe is a singleton per frame document; installing twice is a no-op,
//! matching the window-scope guard of the injected script. Hosts route
//! serialized [`ProbeRequest`] values to the frame and hand back the
//! serialized [`ProbeReply`].

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use tabpilot_core_types::Action;

use crate::actions::{self, ActionOutcome, Overlay};
use crate::dom::Document;
use crate::errors::ProbeError;
use crate::map;
use crate::selector;
use crate::tempo::Tempo;

/// Element-center client coordinates for a drag, with short labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DragCoords {
    pub from_x: i32,
    pub from_y: i32,
    pub from_label: String,
    pub to_x: i32,
    pub to_y: i32,
    pub to_label: String,
}

/// One request to a frame probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ProbeRequest {
    BuildVisualMap,
    ExecuteAction { action: Action },
    GetDragCoords { from: String, to: String },
    /// Client-rect origin of the frame's first iframe element, used to
    /// offset trusted-input coordinates into child-frame space.
    IframeOffset,
}

/// Reply from a frame probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ProbeReply {
    Map { map: String },
    Action { outcome: ActionOutcome },
    Coords { coords: DragCoords },
    Offset { x: i32, y: i32 },
    Error { error: ProbeError },
}

impl ProbeReply {
    pub fn error(&self) -> Option<&ProbeError> {
        match self {
            ProbeReply::Error { error } => Some(error),
            _ => None,
        }
    }
}

/// The in-frame probe.
pub struct Probe {
    doc: Arc<Mutex<Document>>,
    overlay: Mutex<Overlay>,
    tempo: Tempo,
}

impl Probe {
    /// Install a probe into the frame. Returns `None` when one is already
    /// installed; re-injection must be a safe no-op.
    pub fn install(doc: &Arc<Mutex<Document>>, tempo: Tempo) -> Option<Arc<Probe>> {
        {
            let mut guard = doc.lock();
            if guard.probe_installed() {
                return None;
            }
            guard.mark_probe_installed();
        }
        Some(Arc::new(Probe {
            doc: Arc::clone(doc),
            overlay: Mutex::new(Overlay::default()),
            tempo,
        }))
    }

    /// Handle one typed request.
    pub async fn handle(&self, request: ProbeRequest) -> ProbeReply {
        trace!(target: "page_probe", ?request, "handle");
        match request {
            ProbeRequest::BuildVisualMap => ProbeReply::Map {
                map: map::build_visual_map(&self.doc.lock()),
            },
            ProbeRequest::ExecuteAction { action } => {
                match actions::execute(&self.doc, &self.overlay, &self.tempo, &action).await {
                    Ok(outcome) => ProbeReply::Action { outcome },
                    Err(error) => ProbeReply::Error { error },
                }
            }
            ProbeRequest::GetDragCoords { from, to } => match self.drag_coords(&from, &to) {
                Ok(coords) => ProbeReply::Coords { coords },
                Err(error) => ProbeReply::Error { error },
            },
            ProbeRequest::IframeOffset => {
                let (x, y) = self.iframe_offset();
                ProbeReply::Offset { x, y }
            }
        }
    }

    /// Handle one serialized request, for hosts that move JSON.
    pub async fn handle_value(&self, message: Value) -> Value {
        let reply = match serde_json::from_value::<ProbeRequest>(message) {
            Ok(request) => self.handle(request).await,
            Err(err) => ProbeReply::Error {
                error: ProbeError::unsupported(format!("malformed probe request: {err}")),
            },
        };
        serde_json::to_value(reply).unwrap_or(Value::Null)
    }

    fn drag_coords(&self, from: &str, to: &str) -> Result<DragCoords, ProbeError> {
        let mut doc = self.doc.lock();
        let from_id = selector::require(&doc, from)?;
        let to_id = selector::require(&doc, to)?;
        doc.scroll_into_view(from_id);
        let (from_x, from_y) = doc.client_center(from_id);
        let (to_x, to_y) = doc.client_center(to_id);
        Ok(DragCoords {
            from_x,
            from_y,
            from_label: actions::short_label(&doc, from_id),
            to_x,
            to_y,
            to_label: actions::short_label(&doc, to_id),
        })
    }

    fn iframe_offset(&self) -> (i32, i32) {
        let doc = self.doc.lock();
        for id in doc.walk() {
            let node = doc.node(id);
            if node.tag == "IFRAME" {
                return (
                    node.rect.x - doc.viewport.scroll_x,
                    node.rect.y - doc.viewport.scroll_y,
                );
            }
        }
        (0, 0)
    }

    /// Flash count of the highlight overlay, for host diagnostics.
    pub fn overlay_flashes(&self) -> u32 {
        self.overlay.lock().flashes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Node, Viewport};

    fn frame_doc() -> Arc<Mutex<Document>> {
        let mut doc = Document::new("https://example.com", "Example", Viewport::default());
        doc.append(
            None,
            Node::new("button").with_id("next").with_text("Next").with_rect(10, 10, 60, 24),
        );
        Arc::new(Mutex::new(doc))
    }

    #[test]
    fn install_is_singleton_per_document() {
        let doc = frame_doc();
        let probe = Probe::install(&doc, Tempo::instant());
        assert!(probe.is_some());
        assert!(Probe::install(&doc, Tempo::instant()).is_none());
    }

    #[tokio::test]
    async fn protocol_round_trips_through_json() {
        let doc = frame_doc();
        let probe = Probe::install(&doc, Tempo::instant()).unwrap();

        let reply = probe
            .handle_value(serde_json::json!({"op": "build_visual_map"}))
            .await;
        let reply: ProbeReply = serde_json::from_value(reply).unwrap();
        match reply {
            ProbeReply::Map { map } => assert!(map.starts_with(crate::map::MAP_HEADER)),
            other => panic!("unexpected reply: {other:?}"),
        }

        let reply = probe
            .handle(ProbeRequest::ExecuteAction {
                action: Action::Click {
                    selector: "#next".into(),
                },
            })
            .await;
        match reply {
            ProbeReply::Action { outcome } => assert!(outcome.success),
            other => panic!("unexpected reply: {other:?}"),
        }
        assert_eq!(probe.overlay_flashes(), 1);
    }

    #[tokio::test]
    async fn not_found_travels_as_typed_error() {
        let doc = frame_doc();
        let probe = Probe::install(&doc, Tempo::instant()).unwrap();
        let reply = probe
            .handle(ProbeRequest::GetDragCoords {
                from: "#ghost".into(),
                to: "#next".into(),
            })
            .await;
        assert!(reply.error().is_some_and(ProbeError::is_not_found));
    }

    #[tokio::test]
    async fn iframe_offset_reports_child_origin() {
        let doc = frame_doc();
        doc.lock().append(
            None,
            Node::new("iframe").with_rect(100, 200, 400, 300),
        );
        let probe = Probe::install(&doc, Tempo::instant()).unwrap();
        match probe.handle(ProbeRequest::IframeOffset).await {
            ProbeReply::Offset { x, y } => {
                assert_eq!((x, y), (100, 200));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }
}
