//! tabpilot: a grounded browser-automation agent driver.
//!
//! A natural-language command goes in; a bounded loop of page perception,
//! LLM planning, and DOM actuation runs against a host-provided tab. The
//! core is embedded: hosts supply a [`TabHandle`] and [`Storage`], and
//! observe progress on the event bus.
//!
//! The crates underneath map one-to-one onto the subsystems: page probe,
//! frame coordinator, snapshot service, quiz oracle, LLM dispatcher,
//! action executor, and the agent loop. This crate wires them together
//! and ships an in-process host for tests and embedders without a
//! browser bridge.

pub mod config;
pub mod driver;
pub mod host;

pub use config::Settings;
pub use driver::{Driver, DriverBuilder, DriverTuning};

pub use tabpilot_agent_loop::{ExecutionState, LoopConfig, LoopError, LoopResult, LoopStatus};
pub use tabpilot_core_types::{
    Action, ActionRequest, AgentMode, DriverEvent, DriverStatus, FrameId, FrameInfo, GroupId,
    HostError, LogKind, ModelDecision, PageContext, Storage, TabHandle, TabId, TabInfo,
    VisualElement,
};
pub use tabpilot_event_bus::EventBus;
pub use tabpilot_llm_dispatcher::{
    ChatApi, ChatOptions, Dispatcher, HttpChatApi, LlmError, Provider, ProviderConfig,
    ScriptedChatApi,
};
