//! Section-wise map diffing.
//!
//! Steps after the first in quiz mode feed the planner a delta instead of
//! the full map. The diff is conservative: a section whose element lines
//! changed is replayed in full; an unchanged section collapses to a
//! one-line summary, with a key-controls digest for the outer page so the
//! planner can still reference main-page buttons.

use crate::merge::{parse_iframe_header, IFRAME_HEADER_PREFIX};
use tabpilot_core_types::FrameId;
use tabpilot_page_probe::MAP_HEADER;

pub const DIFF_HEADER: &str = "=== PAGE UPDATE (diff) ===";
pub const PAGE_UNCHANGED: &str = "[Page unchanged]";
const SELECTORS_NOTE: &str = "(Unchanged sections summarized; previously reported selectors remain valid.)";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SectionKey {
    Outer,
    Iframe(FrameId),
}

#[derive(Debug, Clone)]
struct Section {
    key: SectionKey,
    /// Every line of the section except its `===` header.
    body: Vec<String>,
}

impl Section {
    fn element_lines(&self) -> Vec<&str> {
        self.body
            .iter()
            .map(String::as_str)
            .filter(|line| line.starts_with('['))
            .collect()
    }
}

fn split_sections(map: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current: Option<Section> = None;

    for line in map.lines() {
        if line == MAP_HEADER {
            if let Some(section) = current.take() {
                sections.push(section);
            }
            current = Some(Section {
                key: SectionKey::Outer,
                body: Vec::new(),
            });
            continue;
        }
        if let Some(frame) = parse_iframe_header(line) {
            if let Some(section) = current.take() {
                sections.push(section);
            }
            current = Some(Section {
                key: SectionKey::Iframe(frame),
                body: Vec::new(),
            });
            continue;
        }
        match current.as_mut() {
            Some(section) => section.body.push(line.to_string()),
            None => {
                // Headerless prefix; treat as outer content.
                current = Some(Section {
                    key: SectionKey::Outer,
                    body: vec![line.to_string()],
                });
            }
        }
    }
    if let Some(section) = current {
        sections.push(section);
    }
    sections
}

fn section_label(key: &SectionKey) -> String {
    match key {
        SectionKey::Outer => MAP_HEADER.to_string(),
        SectionKey::Iframe(frame) => format!("{IFRAME_HEADER_PREFIX}{}) ===", frame.0),
    }
}

/// Selector and label pulled back out of one rendered element line.
fn parse_control(line: &str) -> Option<(String, String)> {
    let sel_start = line.find("sel=\"")? + "sel=\"".len();
    let sel_end = line[sel_start..].find('"')? + sel_start;
    let selector = line[sel_start..sel_end].to_string();

    let rest = &line[sel_end + 1..];
    let label = quoted_value(rest)
        .or_else(|| attr_value(line, "aria-label="))
        .or_else(|| attr_value(line, "placeholder="))
        .unwrap_or_else(|| {
            line.trim_start_matches("[*")
                .split(|c| c == ']' || c == '[')
                .next()
                .unwrap_or("control")
                .to_string()
        });
    Some((label, selector))
}

fn quoted_value(text: &str) -> Option<String> {
    let start = text.find('"')?;
    let end = text[start + 1..].find('"')? + start + 1;
    let value = &text[start + 1..end];
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn attr_value(line: &str, attr: &str) -> Option<String> {
    let start = line.find(attr)? + attr.len();
    quoted_value(&line[start..])
}

/// `Key controls:` digest of the outer page's interactive elements.
fn key_controls(section: &Section) -> Option<String> {
    let controls: Vec<String> = section
        .body
        .iter()
        .filter(|line| line.starts_with("[*"))
        .filter_map(|line| parse_control(line))
        .map(|(label, selector)| format!("\"{label}\" sel=\"{selector}\""))
        .collect();
    if controls.is_empty() {
        None
    } else {
        Some(format!("Key controls: {}", controls.join(" | ")))
    }
}

/// Compute the token-lean update between two merged maps.
///
/// Returns [`PAGE_UNCHANGED`] when every section's element lines are
/// identical; otherwise a [`DIFF_HEADER`] document that replays changed
/// sections in full and summarizes the rest.
pub fn compute_diff(old_map: &str, new_map: &str) -> String {
    let old_sections = split_sections(old_map);
    let new_sections = split_sections(new_map);

    let unchanged = old_sections.len() == new_sections.len()
        && old_sections
            .iter()
            .zip(new_sections.iter())
            .all(|(a, b)| a.key == b.key && a.element_lines() == b.element_lines());
    if unchanged {
        return PAGE_UNCHANGED.to_string();
    }

    let mut out = String::new();
    out.push_str(DIFF_HEADER);
    out.push('\n');
    out.push_str(SELECTORS_NOTE);
    out.push('\n');

    for section in &new_sections {
        let old = old_sections.iter().find(|s| s.key == section.key);
        let same = old.is_some_and(|old| old.element_lines() == section.element_lines());

        if same {
            let count = section.element_lines().len();
            match &section.key {
                SectionKey::Outer => {
                    out.push_str(&format!("[Outer page: {count} elements unchanged]\n"));
                    if let Some(controls) = key_controls(section) {
                        out.push_str(&controls);
                        out.push('\n');
                    }
                }
                SectionKey::Iframe(_) => {
                    out.push_str(&section_label(&section.key));
                    out.push('\n');
                    out.push_str(&format!("[Iframe: {count} unchanged]\n"));
                }
            }
        } else {
            out.push_str(&section_label(&section.key));
            out.push('\n');
            for line in &section.body {
                out.push_str(line);
                out.push('\n');
            }
        }
    }

    out
}
