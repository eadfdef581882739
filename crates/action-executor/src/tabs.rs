//! Tab and tab-group operations.
//!
//! `tab_list` returns a human-readable block and a structured payload;
//! index-addressed operations are zero-based with ranged errors.

use serde_json::json;
use tracing::debug;

use tabpilot_core_types::{Action, GroupId, TabHandle, TabId, TabInfo};
use tabpilot_page_probe::ActionOutcome;

pub async fn execute(tab: &dyn TabHandle, action: &Action) -> ActionOutcome {
    match action {
        Action::TabList => list(tab).await,
        Action::TabNew { url } => open(tab, url.as_deref()).await,
        Action::TabClose { index } => close(tab, *index).await,
        Action::TabSwitch { index } => switch(tab, *index).await,
        Action::TabGroupCreate {
            tab_indices,
            color,
            title,
        } => group_create(tab, tab_indices.as_deref(), color.as_deref(), title.as_deref()).await,
        Action::TabGroupAdd {
            group_id,
            tab_indices,
        } => group_add(tab, GroupId(*group_id), tab_indices).await,
        Action::TabGroupRemove { group_id } => group_remove(tab, GroupId(*group_id)).await,
        other => ActionOutcome::fail(format!("{} is not a tab operation", other.name())),
    }
}

fn format_tab_line(index: usize, info: &TabInfo) -> String {
    let marker = if info.active { " [active]" } else { "" };
    let group = info
        .group
        .map(|g| format!(" (group {})", g.0))
        .unwrap_or_default();
    format!("{index}: {}{marker} - {}{group}", info.title, info.url)
}

async fn list(tab: &dyn TabHandle) -> ActionOutcome {
    let tabs = match tab.list_tabs().await {
        Ok(tabs) => tabs,
        Err(err) => return ActionOutcome::fail(format!("tab list failed: {err}")),
    };
    let groups = tab.list_tab_groups().await.unwrap_or_default();

    let mut text = format!("Open tabs ({}):\n", tabs.len());
    for (index, info) in tabs.iter().enumerate() {
        text.push_str(&format_tab_line(index, info));
        text.push('\n');
    }
    if !groups.is_empty() {
        text.push_str("Tab groups:\n");
        for group in &groups {
            text.push_str(&format!("group {}: {} ({})\n", group.id.0, group.title, group.color));
        }
    }

    ActionOutcome::ok_with(
        text,
        json!({
            "tabs": tabs,
            "groups": groups,
        }),
    )
}

async fn open(tab: &dyn TabHandle, url: Option<&str>) -> ActionOutcome {
    match tab.open(url).await {
        Ok(new_tab) => ActionOutcome::ok_with(
            match url {
                Some(url) => format!("opened tab at {url}"),
                None => "opened tab".to_string(),
            },
            json!({ "tabId": new_tab.id() }),
        ),
        Err(err) => ActionOutcome::fail(format!("tab open failed: {err}")),
    }
}

/// Resolve a zero-based index into the current tab list.
async fn resolve_index(tab: &dyn TabHandle, index: usize) -> Result<TabId, ActionOutcome> {
    let tabs = tab
        .list_tabs()
        .await
        .map_err(|err| ActionOutcome::fail(format!("tab list failed: {err}")))?;
    match tabs.get(index) {
        Some(info) => Ok(info.id),
        None => Err(ActionOutcome::fail(format!(
            "tab index {index} out of range (0..{})",
            tabs.len().saturating_sub(1)
        ))),
    }
}

async fn close(tab: &dyn TabHandle, index: Option<usize>) -> ActionOutcome {
    match index {
        None => match tab.close().await {
            Ok(()) => ActionOutcome::ok("closed current tab"),
            Err(err) => ActionOutcome::fail(format!("tab close failed: {err}")),
        },
        Some(index) => {
            let id = match resolve_index(tab, index).await {
                Ok(id) => id,
                Err(outcome) => return outcome,
            };
            match tab.close_tab(id).await {
                Ok(()) => ActionOutcome::ok(format!("closed tab {index}")),
                Err(err) => ActionOutcome::fail(format!("tab close failed: {err}")),
            }
        }
    }
}

async fn switch(tab: &dyn TabHandle, index: usize) -> ActionOutcome {
    let id = match resolve_index(tab, index).await {
        Ok(id) => id,
        Err(outcome) => return outcome,
    };
    debug!(target: "action_executor", index, tab = %id, "switching tab");
    match tab.activate_tab(id).await {
        Ok(()) => ActionOutcome::ok(format!("switched to tab {index}")),
        Err(err) => ActionOutcome::fail(format!("tab switch failed: {err}")),
    }
}

async fn resolve_indices(
    tab: &dyn TabHandle,
    indices: &[usize],
) -> Result<Vec<TabId>, ActionOutcome> {
    let mut ids = Vec::with_capacity(indices.len());
    for index in indices {
        ids.push(resolve_index(tab, *index).await?);
    }
    Ok(ids)
}

async fn group_create(
    tab: &dyn TabHandle,
    tab_indices: Option<&[usize]>,
    color: Option<&str>,
    title: Option<&str>,
) -> ActionOutcome {
    let ids = match tab_indices {
        Some(indices) => match resolve_indices(tab, indices).await {
            Ok(ids) => ids,
            Err(outcome) => return outcome,
        },
        None => vec![tab.id()],
    };
    match tab.group_tabs(&ids, color, title).await {
        Ok(group) => ActionOutcome::ok_with(
            format!(
                "created tab group {} with {} tab(s)",
                group.0,
                ids.len()
            ),
            json!({ "groupId": group }),
        ),
        Err(err) => ActionOutcome::fail(format!("tab group create failed: {err}")),
    }
}

async fn group_add(tab: &dyn TabHandle, group: GroupId, tab_indices: &[usize]) -> ActionOutcome {
    let ids = match resolve_indices(tab, tab_indices).await {
        Ok(ids) => ids,
        Err(outcome) => return outcome,
    };
    match tab.add_to_group(group, &ids).await {
        Ok(()) => ActionOutcome::ok(format!("added {} tab(s) to group {}", ids.len(), group.0)),
        Err(err) => ActionOutcome::fail(format!("tab group add failed: {err}")),
    }
}

async fn group_remove(tab: &dyn TabHandle, group: GroupId) -> ActionOutcome {
    match tab.ungroup(group).await {
        Ok(()) => ActionOutcome::ok(format!("removed tab group {}", group.0)),
        Err(err) => ActionOutcome::fail(format!("tab group remove failed: {err}")),
    }
}
