//! Provider-neutral LLM dispatch.
//!
//! Owns the chat wire protocol (OpenAI-chat-compatible, two providers),
//! the system prompts, the conversation window, robust JSON recovery, and
//! the two optional secondary analysts: vision (two-step handoff for
//! text-only planners) and search (ground-truth injection for quiz items).

pub mod dispatcher;
pub mod errors;
pub mod history;
pub mod json;
pub mod prompts;
pub mod provider;
pub mod wire;

pub use dispatcher::{Dispatcher, DispatcherBuilder, SEARCH_RESULTS_HEADER, VISION_ANALYSIS_HEADER};
pub use errors::LlmError;
pub use history::{ConversationWindow, HISTORY_CAP};
pub use json::parse_decision;
pub use provider::{
    ChatApi, ChatOptions, HttpChatApi, Provider, ProviderConfig, ScriptedCall, ScriptedChatApi,
};
pub use wire::{ChatMessage, ContentPart, MessageContent};
