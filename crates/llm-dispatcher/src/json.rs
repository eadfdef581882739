//! JSON recovery for planner replies.
//!
//! Models wrap their JSON in prose and code fences more often than not.
//! Recovery order: the whole reply, the fenced block, a balanced-brace
//! substring carrying an `actions` array, then any balanced object. When
//! everything fails the caller gets a neutral decision so the loop can
//! re-ask instead of crashing.

use serde_json::Value;

use tabpilot_core_types::ModelDecision;

/// Extract the most plausible JSON object substring from a raw reply.
pub fn extract_json_object(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed.to_string());
    }

    let fence = "```";
    if let Some(start) = raw.find(fence) {
        let after_fence = &raw[start + fence.len()..];
        let after_lang = after_fence.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
        if let Some(end) = after_lang.find(fence) {
            let block = after_lang[..end].trim();
            if block.starts_with('{') {
                return Some(block.to_string());
            }
        }
    }

    balanced_objects(raw).into_iter().next()
}

/// Every balanced `{…}` substring of `raw`, outermost first.
fn balanced_objects(raw: &str) -> Vec<String> {
    let bytes: Vec<char> = raw.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == '{' {
            let mut depth = 0i32;
            let mut in_string = false;
            let mut escaped = false;
            for (j, ch) in bytes[i..].iter().enumerate() {
                if in_string {
                    if escaped {
                        escaped = false;
                    } else if *ch == '\\' {
                        escaped = true;
                    } else if *ch == '"' {
                        in_string = false;
                    }
                    continue;
                }
                match ch {
                    '"' => in_string = true,
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            out.push(bytes[i..=i + j].iter().collect());
                            break;
                        }
                    }
                    _ => {}
                }
            }
        }
        i += 1;
    }
    out
}

fn decision_from_value(value: Value) -> Option<ModelDecision> {
    serde_json::from_value(value).ok()
}

/// Parse a planner reply into a [`ModelDecision`].
///
/// Never fails: unusable replies become the neutral empty decision, which
/// the agent loop treats as "no progress, re-ask".
pub fn parse_decision(raw: &str) -> ModelDecision {
    // The straightforward path: the reply (or its fenced payload) is the
    // object, and it carries the actions array.
    if let Some(candidate) = extract_json_object(raw) {
        if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
            if value.get("actions").is_some_and(Value::is_array) {
                if let Some(decision) = decision_from_value(value) {
                    return decision;
                }
            }
        }
    }

    // Any balanced object that carries an actions array.
    for candidate in balanced_objects(raw) {
        if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
            if value.get("actions").is_some_and(Value::is_array) {
                if let Some(decision) = decision_from_value(value) {
                    return decision;
                }
            }
        }
    }

    // Any balanced object at all; missing fields default.
    for candidate in balanced_objects(raw) {
        if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
            if value.is_object() {
                if let Some(decision) = decision_from_value(value) {
                    return decision;
                }
            }
        }
    }

    ModelDecision::neutral()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_object() {
        let decision = parse_decision(
            r##"{"thinking":"x","actions":[{"type":"click","selector":"#a"}],"done":false}"##,
        );
        assert_eq!(decision.actions.len(), 1);
        assert!(!decision.done);
    }

    #[test]
    fn strips_code_fences() {
        let raw = "```json\n{\"thinking\":\"x\",\"actions\":[{\"type\":\"click\",\"selector\":\"#a\"}],\"done\":false}\n```";
        let decision = parse_decision(raw);
        assert_eq!(decision.actions.len(), 1);
        assert_eq!(decision.thinking, "x");
    }

    #[test]
    fn finds_actions_object_inside_prose() {
        let raw = "Sure! Here is my plan: {\"actions\":[{\"type\":\"snapshot\"}],\"done\":true} hope that helps";
        let decision = parse_decision(raw);
        assert_eq!(decision.actions.len(), 1);
        assert!(decision.done);
    }

    #[test]
    fn prefers_the_object_with_actions() {
        let raw = r#"{"note":"irrelevant"} and then {"actions":[{"type":"screenshot"}]}"#;
        let decision = parse_decision(raw);
        assert_eq!(decision.actions.len(), 1);
    }

    #[test]
    fn braces_inside_strings_do_not_break_matching() {
        let raw = r#"{"thinking":"use {curly} braces","actions":[{"type":"tab_list"}]}"#;
        let decision = parse_decision(raw);
        assert_eq!(decision.actions.len(), 1);
        assert_eq!(decision.thinking, "use {curly} braces");
    }

    #[test]
    fn unusable_reply_degrades_to_neutral() {
        let decision = parse_decision("I could not decide on any actions.");
        assert!(decision.actions.is_empty());
        assert!(!decision.done);
    }

    #[test]
    fn object_without_actions_still_parses_with_defaults() {
        let decision = parse_decision(r#"{"thinking":"hmm","done":true}"#);
        assert!(decision.actions.is_empty());
        assert!(decision.done);
    }
}
