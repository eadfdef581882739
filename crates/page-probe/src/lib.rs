//! The in-frame page probe.
//!
//! One probe lives in every content frame. It owns the frame's document
//! model and answers a small request/reply protocol: build the Visual Page
//! Map, execute a DOM action, resolve drag coordinates. The original runs
//! as an injected content script; this crate expresses the same operations
//! over an explicit document value so hosts without a script bridge (and
//! tests) can drive identical semantics.

pub mod actions;
pub mod dom;
pub mod errors;
pub mod map;
pub mod probe;
pub mod selector;
pub mod tempo;

pub use actions::ActionOutcome;
pub use dom::{Document, Node, NodeId, Rect, SyntheticEvent, Viewport};
pub use errors::ProbeError;
pub use map::{build_visual_map, collect_elements, MAP_HEADER};
pub use probe::{DragCoords, Probe, ProbeReply, ProbeRequest};
pub use tempo::Tempo;
