//! Fire-and-forget event bus between the driver and its embedding UI.
//!
//! Three channels ride the same bus: status updates, per-action log lines,
//! and execution-state transitions. Publishing never blocks the loop; a bus
//! with no subscribers simply drops events.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::trace;

use tabpilot_core_types::{DriverEvent, DriverStatus, LogKind};

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus closed: {0}")]
    Closed(String),
}

/// Publisher half of the driver bus.
///
/// Cheap to clone; every component that emits user-visible progress holds
/// one.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DriverEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }

    /// Publish, ignoring the no-subscriber case: the driver must make
    /// progress whether or not a UI is listening.
    pub fn publish(&self, event: DriverEvent) {
        trace!(target: "event_bus", ?event, "publish");
        let _ = self.sender.send(event);
    }

    pub fn status(&self, status: DriverStatus, text: impl Into<String>) {
        self.publish(DriverEvent::status(status, text));
    }

    pub fn log(&self, kind: LogKind, text: impl Into<String>) {
        self.publish(DriverEvent::log(kind, text));
    }

    pub fn running(&self, running: bool) {
        self.publish(DriverEvent::running(running));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.sender.subscribe()
    }
}

/// Materialise an mpsc receiver from a subscription so callers can await
/// events without handling broadcast lag semantics directly.
pub fn to_mpsc(bus: Arc<EventBus>, capacity: usize) -> mpsc::Receiver<DriverEvent> {
    let mut rx = bus.subscribe();
    let (tx, out_rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        while let Ok(ev) = rx.recv().await {
            if tx.send(ev).await.is_err() {
                break;
            }
        }
    });
    out_rx
}
