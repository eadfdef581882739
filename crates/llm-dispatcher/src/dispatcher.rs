//! The dispatcher: one façade the agent loop talks to.
//!
//! Owns prompt selection, the conversation window, the vision and search
//! handoffs, and JSON recovery. Providers stay swappable behind
//! [`ChatApi`].

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use tabpilot_core_types::{AgentMode, ModelDecision, PageContext, Role};

use crate::errors::LlmError;
use crate::history::ConversationWindow;
use crate::json::parse_decision;
use crate::prompts::{system_prompt, VISION_ANALYST_PROMPT};
use crate::provider::{ChatApi, ChatOptions};
use crate::wire::ChatMessage;

/// Marker under which vision-analyst output is appended to the planner
/// message.
pub const VISION_ANALYSIS_HEADER: &str = "=== VISION ANALYSIS ===";
/// Marker under which buffered search output is injected by the loop.
pub const SEARCH_RESULTS_HEADER: &str = "=== SEARCH RESULTS ===";

const SEARCH_CONTEXT_CAP: usize = 1_500;

pub struct DispatcherBuilder {
    planner: Arc<dyn ChatApi>,
    vision: Option<Arc<dyn ChatApi>>,
    search: Option<Arc<dyn ChatApi>>,
    options: ChatOptions,
}

impl DispatcherBuilder {
    pub fn vision(mut self, api: Arc<dyn ChatApi>) -> Self {
        self.vision = Some(api);
        self
    }

    pub fn search(mut self, api: Arc<dyn ChatApi>) -> Self {
        self.search = Some(api);
        self
    }

    pub fn options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            planner: self.planner,
            vision: self.vision,
            search: self.search,
            options: self.options,
            history: Mutex::new(ConversationWindow::new()),
        }
    }
}

pub struct Dispatcher {
    planner: Arc<dyn ChatApi>,
    vision: Option<Arc<dyn ChatApi>>,
    search: Option<Arc<dyn ChatApi>>,
    options: ChatOptions,
    history: Mutex<ConversationWindow>,
}

impl Dispatcher {
    pub fn builder(planner: Arc<dyn ChatApi>) -> DispatcherBuilder {
        DispatcherBuilder {
            planner,
            vision: None,
            search: None,
            options: ChatOptions::default(),
        }
    }

    pub fn search_enabled(&self) -> bool {
        self.search.is_some()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    /// Drop the trailing exchange before a retry replaces it.
    pub fn drop_last_exchange(&self) {
        self.history.lock().drop_last_exchange();
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    /// One planner step: build the user message from the page context,
    /// attach or hand off vision, call the model, recover JSON.
    ///
    /// `command` is the user's original instruction (used for the minimal
    /// recovery retry); `user_message` is this step's instruction text.
    pub async fn send(
        &self,
        command: &str,
        user_message: &str,
        page: &PageContext,
        mode: AgentMode,
    ) -> Result<ModelDecision, LlmError> {
        let mut user_text = format!(
            "Command: {user_message}\nURL: {}\nTitle: {}\n\n{}",
            page.url, page.title, page.visual_map
        );

        let mut attach_image = false;
        if let Some(screenshot) = &page.screenshot {
            if self.planner.supports_vision() {
                attach_image = true;
            } else if self.vision.is_some() {
                match self.vision_analysis(screenshot, page).await {
                    Ok(analysis) => {
                        user_text.push_str("\n\n");
                        user_text.push_str(VISION_ANALYSIS_HEADER);
                        user_text.push('\n');
                        user_text.push_str(&analysis);
                    }
                    Err(err) => {
                        // The step proceeds on text alone.
                        warn!(target: "llm_dispatcher", error = %err, "vision handoff failed");
                    }
                }
            }
        }

        let request_message = if attach_image {
            ChatMessage::user_with_image(
                user_text.clone(),
                page.screenshot.as_deref().unwrap_or_default(),
            )
        } else {
            ChatMessage::user(user_text.clone())
        };

        let raw = match self.call_planner(mode, request_message).await {
            Ok(raw) => raw,
            Err(err) if err.is_json_validate_failed() => {
                // The provider choked validating against our history; start
                // clean with the shortest possible restatement.
                debug!(target: "llm_dispatcher", "json_validate_failed, clearing history and retrying");
                self.clear_history();
                user_text =
                    format!("Command: {command}\nRespond with ONLY the JSON action object.");
                self.call_planner(mode, ChatMessage::user(user_text.clone()))
                    .await?
            }
            Err(err) => return Err(err),
        };

        self.history.lock().record_exchange(user_text, raw.clone());
        Ok(parse_decision(&raw))
    }

    async fn call_planner(
        &self,
        mode: AgentMode,
        user: ChatMessage,
    ) -> Result<String, LlmError> {
        let mut messages = vec![ChatMessage::system(system_prompt(mode.is_quiz()))];
        for (role, content) in self.history.lock().iter_roles() {
            messages.push(match role {
                Role::User => ChatMessage::user(content),
                Role::Assistant => ChatMessage::assistant(content),
                Role::System => ChatMessage::system(content),
            });
        }
        messages.push(user);
        self.planner.chat(messages, &self.options).await
    }

    /// Two-step vision handoff: an image-capable model renders free-text
    /// observations for the text-only planner.
    pub async fn vision_analysis(
        &self,
        screenshot_base64: &str,
        page: &PageContext,
    ) -> Result<String, LlmError> {
        let vision = self
            .vision
            .as_ref()
            .ok_or_else(|| LlmError::MissingConfig("no vision model configured".into()))?;

        let ask = format!(
            "Page: {} ({})\nDescribe the question, option images, drag labels, and element positions you can see.",
            page.title, page.url
        );
        vision
            .chat(
                vec![
                    ChatMessage::system(VISION_ANALYST_PROMPT),
                    ChatMessage::user_with_image(ask, screenshot_base64),
                ],
                &ChatOptions::plain_text(),
            )
            .await
    }

    /// Search analyst: plain-text ground truth for the current question,
    /// injected by the loop into the next step's message.
    pub async fn run_search(
        &self,
        question: &str,
        iframe_context: &str,
    ) -> Result<String, LlmError> {
        let search = self
            .search
            .as_ref()
            .ok_or_else(|| LlmError::MissingConfig("no search model configured".into()))?;

        let context: String = iframe_context.chars().take(SEARCH_CONTEXT_CAP).collect();
        let ask = format!(
            "Find the correct answer to this quiz question. Reply in plain text with the answer and a one-line justification.\n\nQuestion: {question}\n\nPage context:\n{context}"
        );
        search
            .chat(vec![ChatMessage::user(ask)], &ChatOptions::plain_text())
            .await
    }
}
