//! Quiz-mode end-to-end flows: detection, break-point semantics, diffing,
//! and the drag stack.

mod common;

use std::sync::Arc;

use common::*;
use tabpilot::host::MemoryBrowser;
use tabpilot::{AgentMode, DriverBuilder, DriverTuning, EventBus, LoopStatus, ScriptedChatApi};

#[tokio::test]
async fn radio_item_is_answered_in_quiz_mode() {
    let browser = MemoryBrowser::new();
    let tab = quiz_tab(&browser, quiz_radio_doc());

    let planner = Arc::new(ScriptedChatApi::new("planner"));
    // Step 0: answer, advance, re-read; the trailing click must never run.
    planner.push_reply(
        r##"{"thinking":"Paris is correct","actions":[
            {"type":"click","selector":"#opt1","frameId":7},
            {"type":"click","selector":"#next","frameId":7},
            {"type":"snapshot"},
            {"type":"click","selector":"#opt2","frameId":7}
        ],"done":false,"summary":"answered item 1"}"##,
    );
    // Step 1: confirm completion.
    planner.push_reply(
        r#"{"thinking":"finished","actions":[{"type":"extract","selector":".counter","frameId":7}],"done":true,"summary":"Quiz complete"}"#,
    );
    let (driver, _bus) = scripted_driver(planner.clone());

    let result = driver
        .execute(tab.as_ref(), "finish the quiz")
        .await
        .unwrap();

    assert_eq!(result.status, LoopStatus::Completed);
    assert_eq!(result.mode, AgentMode::Quiz, "detector must switch modes");
    assert_eq!(result.summary.as_deref(), Some("Quiz complete"));

    // The quiz system prompt was active from the first call.
    let first_call = &planner.calls()[0];
    let system = first_call.messages[0].content.as_text();
    assert!(system.contains("quiz-solving"));

    // The answer landed; the post-snapshot click was suspended.
    let doc = tab.frame_doc(7).unwrap();
    let doc = doc.lock();
    let events = doc.events();
    let opt1_clicks = events.iter().filter(|e| e.kind == "click").count();
    assert_eq!(opt1_clicks, 2, "radio and Next only; post-break click skipped");
    drop(doc);

    // Step 1 perception is a diff against the stored full map.
    let second_text = planner.calls()[1].last_user_text();
    assert!(second_text.contains("=== PAGE UPDATE (diff) ==="));
    assert!(second_text.contains("Key controls:"));
    assert!(second_text.contains("[checked]"));
}

#[tokio::test]
async fn done_is_ignored_after_a_quiz_snapshot_break() {
    let browser = MemoryBrowser::new();
    let tab = quiz_tab(&browser, quiz_radio_doc());

    let planner = Arc::new(ScriptedChatApi::new("planner"));
    // done:true alongside a snapshot break must not end the run: the
    // planner has not seen the post-click state yet.
    planner.push_reply(
        r##"{"thinking":"answering","actions":[{"type":"click","selector":"#opt1","frameId":7},{"type":"snapshot"}],"done":true,"summary":"premature"}"##,
    );
    planner.push_reply(
        r#"{"thinking":"now verified","actions":[{"type":"extract","selector":".counter","frameId":7}],"done":true,"summary":"verified"}"#,
    );
    let (driver, _bus) = scripted_driver(planner.clone());

    let result = driver
        .execute(tab.as_ref(), "finish the quiz")
        .await
        .unwrap();
    assert_eq!(result.status, LoopStatus::Completed);
    assert_eq!(planner.call_count(), 2, "loop must take a second look");
    assert_eq!(result.summary.as_deref(), Some("verified"));
}

#[tokio::test]
async fn drag_item_uses_click_to_place_and_search_fires_once() {
    let browser = MemoryBrowser::new();
    let tab = quiz_tab(&browser, quiz_drag_doc());

    let planner = Arc::new(ScriptedChatApi::new("planner"));
    planner.push_reply(
        r##"{"thinking":"water goes first","actions":[
            {"type":"drag","fromSelector":"#tile-water","toSelector":"[aria-label='Response input area, 1 out of 3. Connected to Water']","frameId":7},
            {"type":"click","selector":"#tile-fire","frameId":7}
        ],"done":false}"##,
    );
    planner.push_reply(
        r#"{"thinking":"placement verified","actions":[{"type":"extract","selector":".counter","frameId":7}],"done":true,"summary":"matched"}"#,
    );
    let search = Arc::new(ScriptedChatApi::new("searcher"));
    search.push_reply("Water pairs with the first definition.");

    let bus = EventBus::new(256);
    let driver = DriverBuilder::from_apis(planner.clone())
        .search(search.clone())
        .tuning(DriverTuning::instant())
        .bus(Arc::clone(&bus))
        .build();

    let result = driver
        .execute(tab.as_ref(), "finish the matching question")
        .await
        .unwrap();
    assert_eq!(result.status, LoopStatus::Completed);

    // Drag went through click-to-place: two clicks, no synthesized drag.
    let events = tab.frame_events(7);
    let clicks = events.iter().filter(|e| e.kind == "click").count();
    assert_eq!(clicks, 2, "source and target click only");
    assert!(!events.iter().any(|e| e.kind == "dragstart"));
    // The drag break-point suspended the trailing click on #tile-fire.

    // One search for the stable question key, injected on the next step.
    assert_eq!(search.call_count(), 1);
    let search_ask = search.calls()[0].last_user_text();
    assert!(search_ask.contains("Match each term"));
    let second_text = planner.calls()[1].last_user_text();
    assert!(second_text.contains("=== SEARCH RESULTS ==="));
    assert!(second_text.contains("Water pairs with the first definition."));
}

#[tokio::test]
async fn unchanged_page_diff_collapses_between_steps() {
    let browser = MemoryBrowser::new();
    let tab = quiz_tab(&browser, quiz_radio_doc());

    let planner = Arc::new(ScriptedChatApi::new("planner"));
    // Step 0 only observes (snapshot); nothing on the page changes.
    planner.push_reply(r#"{"thinking":"look","actions":[{"type":"snapshot"}],"done":false}"#);
    planner.push_reply(
        r#"{"thinking":"stop","actions":[{"type":"extract","selector":".counter","frameId":7}],"done":true,"summary":"nothing to do"}"#,
    );
    let (driver, _bus) = scripted_driver(planner.clone());

    let result = driver
        .execute(tab.as_ref(), "finish the quiz")
        .await
        .unwrap();
    assert_eq!(result.status, LoopStatus::Completed);

    let second_text = planner.calls()[1].last_user_text();
    assert!(second_text.contains("[Page unchanged]"));
}
