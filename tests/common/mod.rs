//! Shared fixtures for the end-to-end driver tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use tabpilot::host::{MemoryBrowser, MemoryTab};
use tabpilot::{
    ChatApi, ChatOptions, Driver, DriverBuilder, DriverEvent, EventBus, LlmError, ScriptedChatApi,
};
use tabpilot_llm_dispatcher::ChatMessage;
use tabpilot_page_probe::{Document, Node, Viewport};

/// Top document: a course page hosting the assessment iframe.
pub fn quiz_top_doc() -> Document {
    let mut doc = Document::new(
        "https://school.example.com/quiz/unit3",
        "Unit 3 Quiz",
        Viewport::default(),
    );
    doc.append(
        None,
        Node::new("button")
            .with_id("menu")
            .with_text("Menu")
            .with_rect(10, 10, 60, 24),
    );
    doc.append(None, Node::new("iframe").with_rect(40, 80, 900, 600));
    doc
}

/// Iframe document: one multiple-choice item.
pub fn quiz_radio_doc() -> Document {
    let mut doc = Document::new(
        "https://assess.example.com/item/1",
        "Item 1",
        Viewport::default(),
    );
    doc.append(
        None,
        Node::new("div")
            .with_class("counter")
            .with_text("1 of 2 Items")
            .with_rect(10, 8, 200, 18),
    );
    doc.append(
        None,
        Node::new("div")
            .with_class("stem")
            .with_text("What is the capital of France?")
            .with_rect(10, 40, 500, 30),
    );
    doc.append(
        None,
        Node::new("input")
            .with_attr("type", "radio")
            .with_attr("name", "q1")
            .with_id("opt1")
            .with_class("mcq-input")
            .with_text("Paris")
            .with_rect(10, 90, 20, 20),
    );
    doc.append(
        None,
        Node::new("input")
            .with_attr("type", "radio")
            .with_attr("name", "q1")
            .with_id("opt2")
            .with_class("mcq-input")
            .with_text("London")
            .with_rect(10, 130, 20, 20),
    );
    doc.append(
        None,
        Node::new("button")
            .with_id("next")
            .with_text("Next")
            .with_rect(10, 200, 80, 30),
    );
    doc
}

/// Iframe document: one drag-and-drop item.
pub fn quiz_drag_doc() -> Document {
    let mut doc = Document::new(
        "https://assess.example.com/item/2",
        "Item 2",
        Viewport::default(),
    );
    doc.append(
        None,
        Node::new("div")
            .with_class("counter")
            .with_text("Quick Check — 1 of 3 Items")
            .with_rect(10, 8, 200, 18),
    );
    doc.append(
        None,
        Node::new("div")
            .with_class("stem")
            .with_text("Match each term to its definition")
            .with_rect(10, 40, 500, 30),
    );
    doc.append(
        None,
        Node::new("div")
            .with_id("tile-water")
            .with_text("Water")
            .with_attr("draggable", "true")
            .with_rect(10, 90, 80, 40),
    );
    doc.append(
        None,
        Node::new("div")
            .with_id("tile-fire")
            .with_text("Fire")
            .with_attr("draggable", "true")
            .with_rect(100, 90, 80, 40),
    );
    doc.append(
        None,
        Node::new("div")
            .with_id("zone1")
            .with_listener("drop")
            .with_attr("aria-label", "Response input area, 1 out of 3. Connected to Water")
            .with_rect(400, 90, 140, 60),
    );
    doc
}

/// Simple single-frame page for normal-mode commands.
pub fn plain_doc(url: &str, title: &str) -> Document {
    let mut doc = Document::new(url, title, Viewport::default());
    doc.append(
        None,
        Node::new("h1")
            .with_text("Welcome")
            .with_rect(10, 10, 300, 40),
    );
    doc.append(
        None,
        Node::new("a")
            .with_id("pricing")
            .with_text("Pricing")
            .with_attr("href", "/pricing")
            .with_rect(10, 80, 80, 20),
    );
    doc
}

pub fn plain_tab(browser: &Arc<MemoryBrowser>) -> Arc<MemoryTab> {
    browser.open_tab(
        "https://example.com",
        "Example Site",
        vec![(0, plain_doc("https://example.com", "Example Site"))],
    )
}

pub fn quiz_tab(browser: &Arc<MemoryBrowser>, iframe: Document) -> Arc<MemoryTab> {
    browser.open_tab(
        "https://school.example.com/quiz/unit3",
        "Unit 3 Quiz",
        vec![(0, quiz_top_doc()), (7, iframe)],
    )
}

/// Driver with an instant tuning profile over scripted chat backends.
pub fn scripted_driver(planner: Arc<ScriptedChatApi>) -> (Driver, Arc<EventBus>) {
    let bus = EventBus::new(512);
    let driver = DriverBuilder::from_apis(planner)
        .tuning(tabpilot::DriverTuning::instant())
        .bus(Arc::clone(&bus))
        .build();
    (driver, bus)
}

/// Collect everything currently buffered on the bus.
pub fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<DriverEvent>) -> Vec<DriverEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// A planner that answers after a delay; used to observe cancellation and
/// single-flight behavior mid-call.
pub struct SlowChatApi {
    delay: Duration,
    reply: String,
}

impl SlowChatApi {
    pub fn new(delay: Duration, reply: impl Into<String>) -> Self {
        Self {
            delay,
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl ChatApi for SlowChatApi {
    fn model(&self) -> &str {
        "slow-model"
    }

    fn supports_vision(&self) -> bool {
        false
    }

    async fn chat(
        &self,
        _messages: Vec<ChatMessage>,
        _options: &ChatOptions,
    ) -> Result<String, LlmError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.reply.clone())
    }
}
