//! Errors emitted by the page probe.

use thiserror::Error;

#[derive(Debug, Error, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeError {
    /// A selector-bearing action resolved to zero nodes.
    #[error("no element matches selector {selector:?}")]
    NotFound { selector: String },

    /// The selector string itself could not be parsed.
    #[error("invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// The action cannot run in this frame (e.g. an executor-level action
    /// routed to a probe by mistake).
    #[error("unsupported operation: {message}")]
    Unsupported { message: String },
}

impl ProbeError {
    pub fn not_found(selector: impl Into<String>) -> Self {
        Self::NotFound {
            selector: selector.into(),
        }
    }

    pub fn invalid_selector(selector: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProbeError::NotFound { .. })
    }
}
