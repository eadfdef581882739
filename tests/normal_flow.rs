//! Normal-mode end-to-end flows: navigate + screenshot, JSON recovery,
//! and the single-flight guarantee.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use tabpilot::host::MemoryBrowser;
use tabpilot::{
    DriverBuilder, DriverEvent, DriverStatus, DriverTuning, EventBus, LoopError, LoopStatus,
    ScriptedChatApi, TabHandle,
};

#[tokio::test]
async fn navigate_and_screenshot_completes_in_one_call() {
    let browser = MemoryBrowser::new();
    let tab = plain_tab(&browser);

    let planner = Arc::new(ScriptedChatApi::new("planner"));
    planner.push_reply(
        r#"{"thinking":"navigate, then capture","actions":[{"type":"navigate","url":"https://example.com/"},{"type":"screenshot"}],"done":true,"summary":"Screenshot captured"}"#,
    );
    let (driver, bus) = scripted_driver(planner.clone());
    let mut rx = bus.subscribe();

    let result = driver
        .execute(tab.as_ref(), "Go to example.com and take a screenshot")
        .await
        .unwrap();

    assert_eq!(result.status, LoopStatus::Completed);
    assert_eq!(result.summary.as_deref(), Some("Screenshot captured"));
    assert_eq!(planner.call_count(), 1);
    assert_eq!(tab.navigations(), vec!["https://example.com/"]);
    assert!(tab.debug_attached(), "screenshot must attach the debugger");

    let events = drain_events(&mut rx);
    let last_status = events
        .iter()
        .rev()
        .find_map(|e| match e {
            DriverEvent::StatusUpdate(update) => Some(update.clone()),
            _ => None,
        })
        .expect("terminal status");
    assert_eq!(last_status.status, DriverStatus::Ready);
    assert!(events.iter().any(
        |e| matches!(e, DriverEvent::ExecutionState(state) if !state.running)
    ));
}

#[tokio::test]
async fn fenced_json_reply_is_recovered() {
    let browser = MemoryBrowser::new();
    let tab = plain_tab(&browser);

    let planner = Arc::new(ScriptedChatApi::new("planner"));
    planner.push_reply(
        "```json\n{\"thinking\":\"x\",\"actions\":[{\"type\":\"click\",\"selector\":\"#pricing\"}],\"done\":true,\"summary\":\"clicked\"}\n```",
    );
    let (driver, _bus) = scripted_driver(planner);

    let result = driver
        .execute(tab.as_ref(), "open the pricing page")
        .await
        .unwrap();

    assert_eq!(result.status, LoopStatus::Completed);
    assert!(tab.frame_events(0).iter().any(|e| e.kind == "click"));
}

#[tokio::test]
async fn describe_only_decisions_are_retried_with_correction() {
    let browser = MemoryBrowser::new();
    let tab = plain_tab(&browser);

    let planner = Arc::new(ScriptedChatApi::new("planner"));
    planner.push_reply(r#"{"thinking":"narrating","actions":[{"type":"describe","text":"I see a page"}],"done":false}"#);
    planner.push_reply(r##"{"thinking":"acting","actions":[{"type":"click","selector":"#pricing"}],"done":true,"summary":"done"}"##);
    let (driver, _bus) = scripted_driver(planner.clone());

    let result = driver
        .execute(tab.as_ref(), "open the pricing page")
        .await
        .unwrap();

    assert_eq!(result.status, LoopStatus::Completed);
    assert_eq!(planner.call_count(), 2);
    let retry_text = planner.calls()[1].last_user_text();
    assert!(retry_text.contains("no usable actions"));
}

#[tokio::test]
async fn concurrent_command_is_rejected_busy() {
    let browser = MemoryBrowser::new();
    let tab = plain_tab(&browser);

    let slow = Arc::new(SlowChatApi::new(
        Duration::from_millis(400),
        r#"{"actions":[{"type":"tab_list"}],"done":true,"summary":"listed"}"#,
    ));
    let bus = EventBus::new(64);
    let driver = Arc::new(
        DriverBuilder::from_apis(slow)
            .tuning(DriverTuning::instant())
            .bus(Arc::clone(&bus))
            .build(),
    );

    let first = {
        let driver = Arc::clone(&driver);
        let tab = Arc::clone(&tab);
        tokio::spawn(async move { driver.execute(tab.as_ref(), "first").await })
    };

    // Let the first command claim the slot mid-LLM-call.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(driver.is_executing());
    let second = driver.execute(tab.as_ref(), "second").await;
    assert!(matches!(second, Err(LoopError::Busy)));

    let first = first.await.unwrap().unwrap();
    assert_eq!(first.status, LoopStatus::Completed);
    assert!(!driver.is_executing());
}

#[tokio::test]
async fn tab_listing_flows_through_the_loop() {
    let browser = MemoryBrowser::new();
    let tab = plain_tab(&browser);
    let _second = tab.open(Some("https://docs.example.com")).await.unwrap();

    let planner = Arc::new(ScriptedChatApi::new("planner"));
    planner.push_reply(
        r#"{"thinking":"list tabs","actions":[{"type":"tab_list"}],"done":true,"summary":"two tabs open"}"#,
    );
    let (driver, bus) = scripted_driver(planner);
    let mut rx = bus.subscribe();

    let result = driver
        .execute(tab.as_ref(), "list all open tabs")
        .await
        .unwrap();
    assert_eq!(result.status, LoopStatus::Completed);

    let events = drain_events(&mut rx);
    let listed = events.iter().any(|e| match e {
        DriverEvent::ActionLog(log) => log.text.contains("Open tabs (2)"),
        _ => false,
    });
    assert!(listed, "tab list text should surface in the action log");
}
