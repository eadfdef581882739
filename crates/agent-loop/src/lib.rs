//! The step-wise agent loop.
//!
//! Interleaves perception (snapshot), deliberation (LLM call), and
//! actuation (executor) with bounded retries, mode switching, break-point
//! semantics, pacing, and cooperative cancellation.

pub mod config;
pub mod controller;
pub mod state;

pub use config::LoopConfig;
pub use controller::{AgentLoop, LoopError, LoopResult, LoopStatus};
pub use state::ExecutionState;
