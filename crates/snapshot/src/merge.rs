//! Cross-frame map merging.

use tabpilot_core_types::FrameId;
use tabpilot_page_probe::MAP_HEADER;

pub const IFRAME_HEADER_PREFIX: &str = "=== IFRAME CONTENT (frameId=";

/// Section header for one child frame.
pub fn iframe_header(frame: FrameId) -> String {
    format!("{IFRAME_HEADER_PREFIX}{}) ===", frame.0)
}

/// True when a merged map carries at least one iframe block.
pub fn has_iframe_section(map: &str) -> bool {
    map.contains(IFRAME_HEADER_PREFIX)
}

/// Rewrite one frame's own map into an iframe block: the frame-local
/// `=== VISUAL PAGE MAP ===` header is replaced with the iframe header.
/// Frames with no element lines carry no content and yield `None`.
pub fn iframe_section(frame: FrameId, frame_map: &str) -> Option<String> {
    if !frame_map.lines().any(|line| line.starts_with('[')) {
        return None;
    }

    let mut out = iframe_header(frame);
    out.push('\n');
    for line in frame_map.lines() {
        if line == MAP_HEADER {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    Some(out)
}

/// Frame id parsed back out of an iframe header line, if it is one.
pub fn parse_iframe_header(line: &str) -> Option<FrameId> {
    let tail = line.strip_prefix(IFRAME_HEADER_PREFIX)?;
    let end = tail.find(')')?;
    tail[..end].parse().ok().map(FrameId)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iframe_section_replaces_header_and_keeps_body() {
        let frame_map = format!(
            "{MAP_HEADER}\nViewport: 800x600 | Scroll: (0,0) | Elements: 1\n[*BUTTON] @(1,2 3x4) sel=\"#b\" \"Go\"\n"
        );
        let block = iframe_section(FrameId(7), &frame_map).unwrap();
        assert!(block.starts_with("=== IFRAME CONTENT (frameId=7) ===\n"));
        assert!(!block.contains(MAP_HEADER));
        assert!(block.contains("sel=\"#b\""));
    }

    #[test]
    fn empty_frames_are_not_content_bearing() {
        let frame_map = format!("{MAP_HEADER}\nViewport: 800x600 | Scroll: (0,0) | Elements: 0\n");
        assert!(iframe_section(FrameId(3), &frame_map).is_none());
    }

    #[test]
    fn header_round_trips() {
        let header = iframe_header(FrameId(12));
        assert_eq!(parse_iframe_header(&header), Some(FrameId(12)));
        assert_eq!(parse_iframe_header("=== VISUAL PAGE MAP ==="), None);
    }
}
