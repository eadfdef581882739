//! Quiz oracle: decides when a page is an assessment, keys the current
//! question, and scores whether the step needs vision.
//!
//! Detection is a weighted-token score over the Visual Page Map plus the
//! URL and title, tuned against hosted assessment frameworks. The stable
//! question key deliberately ignores tile placement so intra-item state
//! changes never look like a new question.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use tabpilot_core_types::PageContext;
use tabpilot_snapshot::IFRAME_HEADER_PREFIX;

/// Map tokens and their weights. Presence counts once per token.
const MAP_TOKENS: &[(&str, u32)] = &[
    ("lrn_assess", 3),
    ("mcq-input", 3),
    ("Quick Check", 2),
    ("INPUT[radio]", 1),
    ("INPUT[checkbox]", 1),
    ("Item ", 1),
    ("question", 1),
    ("[unchecked]", 1),
];

/// URL/title keywords, each worth 2.
const PAGE_KEYWORDS: &[&str] = &["quiz", "assessment", "test", "exam", "survey"];

const KEYWORD_WEIGHT: u32 = 2;

static ITEM_COUNTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\s+of\s+\d+\s+Items").expect("item counter pattern"));

static DIMENSIONS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@\(-?\d+,-?\d+ (\d+)x(\d+)\)").expect("dimensions pattern"));

/// Texts that are assessment chrome, not question content.
const CHROME_PREFIXES: &[&str] = &[
    "Next",
    "Submit",
    "Currently contains",
    "Select to move",
];

const MAX_QUESTION_TEXTS: usize = 15;
const MIN_IMG_DIMENSION: i32 = 50;
const MAX_IMG_TEXT: usize = 10;

/// Oracle tuning.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OracleConfig {
    /// Detection score at which the loop switches to quiz mode.
    pub threshold: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self { threshold: 4 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QuizOracle {
    config: OracleConfig,
}

impl QuizOracle {
    pub fn new(config: OracleConfig) -> Self {
        Self { config }
    }

    /// Weighted detection score over map, URL, and title.
    pub fn score(&self, map: &str, url: &str, title: &str) -> u32 {
        let map_lower = map.to_lowercase();
        let mut score = 0;

        for (token, weight) in MAP_TOKENS {
            let hit = if token.chars().any(|c| c.is_uppercase()) {
                map.contains(token)
            } else {
                map_lower.contains(token)
            };
            if hit {
                score += weight;
            }
        }

        let url = url.to_lowercase();
        let title = title.to_lowercase();
        for keyword in PAGE_KEYWORDS {
            if url.contains(keyword) || title.contains(keyword) {
                score += KEYWORD_WEIGHT;
            }
        }

        score
    }

    /// True when the page context looks like an assessment.
    pub fn detect(&self, context: &PageContext) -> bool {
        let score = self.score(&context.visual_map, &context.url, &context.title);
        debug!(target: "quiz_oracle", score, threshold = self.config.threshold, "detection");
        score >= self.config.threshold
    }

    /// Identifier for the current question that survives intra-item state
    /// changes (tile placement, selections).
    ///
    /// Prefers the `N of M Items` counter; falls back to the head of the
    /// iframe section.
    pub fn stable_question_key(&self, map: &str) -> Option<String> {
        if let Some(found) = ITEM_COUNTER.find(map) {
            return Some(found.as_str().to_string());
        }
        let section = iframe_body(map)?;
        let head: String = section.chars().take(80).collect();
        if head.trim().is_empty() {
            None
        } else {
            Some(head)
        }
    }

    /// Labelled question content from the iframe section, chrome dropped.
    pub fn extract_question_text(&self, map: &str) -> Option<String> {
        let section = iframe_body(map)?;
        let mut texts: Vec<String> = Vec::new();

        for line in section.lines().filter(|l| l.starts_with('[')) {
            let Some(text) = element_text(line) else {
                continue;
            };
            if text.chars().count() < 2 || is_chrome(&text) {
                continue;
            }
            if texts.iter().any(|t| t == &text) {
                continue;
            }
            texts.push(text);
            if texts.len() >= MAX_QUESTION_TEXTS {
                break;
            }
        }

        if texts.is_empty() {
            None
        } else {
            Some(texts.join(" | "))
        }
    }

    /// True when the iframe carries a meaningful image with almost no
    /// accompanying text, so the planner needs the vision analyst.
    pub fn needs_vision(&self, context: &PageContext) -> bool {
        let Some(section) = iframe_body(&context.visual_map) else {
            return false;
        };

        for line in section.lines() {
            if !(line.starts_with("[IMG]") || line.starts_with("[*IMG]")) {
                continue;
            }
            let Some((w, h)) = line_dimensions(line) else {
                continue;
            };
            if w < MIN_IMG_DIMENSION || h < MIN_IMG_DIMENSION {
                continue;
            }
            let text_len = element_text(line).map(|t| t.chars().count()).unwrap_or(0);
            if text_len < MAX_IMG_TEXT {
                return true;
            }
        }
        false
    }
}

fn is_chrome(text: &str) -> bool {
    CHROME_PREFIXES.iter().any(|p| text.starts_with(p)) || ITEM_COUNTER.is_match(text)
}

/// The iframe section's body, for callers that feed it to the search
/// analyst as question context.
pub fn iframe_context(map: &str) -> Option<&str> {
    iframe_body(map)
}

/// Everything from the first iframe header to the next section header.
fn iframe_body(map: &str) -> Option<&str> {
    let start = map.find(IFRAME_HEADER_PREFIX)?;
    let after_header = map[start..].find('\n').map(|i| start + i + 1)?;
    let body = &map[after_header..];
    match body.find("\n=== ") {
        Some(end) => Some(&body[..end]),
        None => Some(body),
    }
}

/// The rendered text token of one element line: the first quoted string
/// after the selector.
fn element_text(line: &str) -> Option<String> {
    let sel_start = line.find("sel=\"")? + "sel=\"".len();
    let sel_end = line[sel_start..].find('"')? + sel_start;
    let rest = &line[sel_end + 1..];

    let trimmed = rest.trim_start();
    if !trimmed.starts_with('"') {
        return None;
    }
    let inner = &trimmed[1..];
    let end = inner.find('"')?;
    let text = inner[..end].trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn line_dimensions(line: &str) -> Option<(i32, i32)> {
    let caps = DIMENSIONS.captures(line)?;
    let w = caps.get(1)?.as_str().parse().ok()?;
    let h = caps.get(2)?.as_str().parse().ok()?;
    Some((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz_map() -> String {
        [
            "=== VISUAL PAGE MAP ===",
            "Viewport: 1280x720 | Scroll: (0,0) | Elements: 2",
            "[H1] @(10,10 300x30) sel=\"h1:nth-of-type(1)\" \"Course page\"",
            "[*BUTTON] @(10,500 90x30) sel=\"#toolbar\" \"Menu\"",
            "=== IFRAME CONTENT (frameId=7) ===",
            "Viewport: 900x600 | Scroll: (0,0) | Elements: 5",
            "[DIV] @(10,8 200x20) sel=\".counter\" \"3 of 10 Items\"",
            "[DIV] @(10,40 600x40) sel=\".stem\" \"What is the capital of France?\"",
            "[*INPUT[radio]] @(10,90 20x20) sel=\"#opt3\" \"Paris\" [unchecked] class=mcq-input",
            "[*BUTTON] @(10,200 80x30) sel=\"#next\" \"Next\"",
            "[DIV] @(10,240 120x18) sel=\".hint\" \"Select to move\"",
        ]
        .join("\n")
    }

    fn context(map: String, url: &str, title: &str) -> PageContext {
        PageContext::new(url, title, map)
    }

    #[test]
    fn assessment_page_crosses_threshold() {
        let oracle = QuizOracle::default();
        let ctx = context(
            quiz_map(),
            "https://school.example.com/quiz/42",
            "Unit 3 Quick Check",
        );
        assert!(oracle.detect(&ctx));
    }

    #[test]
    fn plain_page_stays_below_threshold() {
        let oracle = QuizOracle::default();
        let map = [
            "=== VISUAL PAGE MAP ===",
            "Viewport: 1280x720 | Scroll: (0,0) | Elements: 1",
            "[*A] @(10,10 80x20) sel=\"#home\" \"Home\" href=\"/\"",
        ]
        .join("\n");
        let ctx = context(map, "https://news.example.com", "Front page");
        assert!(!oracle.detect(&ctx));
    }

    #[test]
    fn scenario_radio_map_scores_via_mcq_and_unchecked() {
        let oracle = QuizOracle::default();
        // mcq-input (3) + [unchecked] (1) alone reach the threshold.
        let map = [
            "=== IFRAME CONTENT (frameId=7) ===",
            "[*INPUT[radio]] @(10,90 20x20) sel=\"#opt3\" \"Paris\" [unchecked] class=mcq-input",
        ]
        .join("\n");
        assert!(oracle.score(&map, "https://host.example.com", "Lesson") >= 4);
    }

    #[test]
    fn stable_key_prefers_item_counter() {
        let oracle = QuizOracle::default();
        let key = oracle.stable_question_key(&quiz_map()).unwrap();
        assert_eq!(key, "3 of 10 Items");
    }

    #[test]
    fn stable_key_survives_tile_shuffling() {
        let oracle = QuizOracle::default();
        let base = quiz_map();
        let shuffled = base.replace(
            "[*INPUT[radio]] @(10,90 20x20) sel=\"#opt3\" \"Paris\" [unchecked] class=mcq-input",
            "[*DIV] @(40,120 80x40) sel=\".tile2\" \"London\" [draggable]",
        );
        assert_eq!(
            oracle.stable_question_key(&base),
            oracle.stable_question_key(&shuffled)
        );
    }

    #[test]
    fn question_text_drops_chrome_and_counters() {
        let oracle = QuizOracle::default();
        let text = oracle.extract_question_text(&quiz_map()).unwrap();
        assert!(text.contains("What is the capital of France?"));
        assert!(text.contains("Paris"));
        assert!(!text.contains("Next"));
        assert!(!text.contains("Select to move"));
        assert!(!text.contains("3 of 10 Items"));
    }

    #[test]
    fn large_bare_image_needs_vision() {
        let oracle = QuizOracle::default();
        let mut map = quiz_map();
        map.push_str("\n[IMG] @(10,300 300x200) sel=\".figure\"");
        let ctx = context(map, "https://school.example.com", "Quiz");
        assert!(oracle.needs_vision(&ctx));
    }

    #[test]
    fn small_or_labelled_images_do_not_need_vision() {
        let oracle = QuizOracle::default();

        let mut small = quiz_map();
        small.push_str("\n[IMG] @(10,300 32x32) sel=\".icon\"");
        assert!(!oracle.needs_vision(&context(small, "https://x.example.com", "Quiz")));

        let mut labelled = quiz_map();
        labelled.push_str("\n[IMG] @(10,300 300x200) sel=\".figure\" \"A labelled diagram of the water cycle\"");
        assert!(!oracle.needs_vision(&context(labelled, "https://x.example.com", "Quiz")));
    }

    #[test]
    fn outer_page_images_are_ignored() {
        let oracle = QuizOracle::default();
        let map = [
            "=== VISUAL PAGE MAP ===",
            "Viewport: 1280x720 | Scroll: (0,0) | Elements: 1",
            "[IMG] @(10,10 400x300) sel=\".hero\"",
        ]
        .join("\n");
        assert!(!oracle.needs_vision(&context(map, "https://x.example.com", "Page")));
    }
}
