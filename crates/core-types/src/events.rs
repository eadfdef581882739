//! Events the driver publishes on the bus for the embedding UI.

use serde::{Deserialize, Serialize};

/// Terminal/driver status shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Ready,
    Busy,
    Error,
}

/// Severity of a per-action log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Info,
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: DriverStatus,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLog {
    pub log_type: LogKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStateChanged {
    pub running: bool,
}

/// Fire-and-forget driver event; the three channels of the bus contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum DriverEvent {
    StatusUpdate(StatusUpdate),
    ActionLog(ActionLog),
    ExecutionState(ExecutionStateChanged),
}

impl DriverEvent {
    pub fn status(status: DriverStatus, text: impl Into<String>) -> Self {
        DriverEvent::StatusUpdate(StatusUpdate {
            status,
            text: text.into(),
        })
    }

    pub fn log(log_type: LogKind, text: impl Into<String>) -> Self {
        DriverEvent::ActionLog(ActionLog {
            log_type,
            text: text.into(),
        })
    }

    pub fn running(running: bool) -> Self {
        DriverEvent::ExecutionState(ExecutionStateChanged { running })
    }
}
