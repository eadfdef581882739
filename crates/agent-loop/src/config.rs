//! Loop pacing and budgets.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Pacing and budget knobs for the agent loop. Defaults are the production
/// values; [`LoopConfig::instant`] collapses every delay for tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Step budget in normal mode.
    pub max_steps_normal: u32,

    /// Step budget in quiz mode; assessments need more round-trips.
    pub max_steps_quiz: u32,

    /// Attempts to coax a usable decision out of the planner per step.
    pub decision_attempts: u32,

    /// Inter-step pause after a quiz batch that clicked something.
    #[serde(with = "duration_ms")]
    pub quiz_click_pause: Duration,

    /// Inter-step pause otherwise.
    #[serde(with = "duration_ms")]
    pub step_pause: Duration,

    /// Settle delay after a quiz-mode drag break-point.
    #[serde(with = "duration_ms")]
    pub drag_settle: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_steps_normal: 15,
            max_steps_quiz: 25,
            decision_attempts: 3,
            quiz_click_pause: Duration::from_millis(2_500),
            step_pause: Duration::from_millis(800),
            drag_settle: Duration::from_millis(800),
        }
    }
}

impl LoopConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero-delay preset for tests; budgets stay at production values.
    pub fn instant() -> Self {
        Self {
            quiz_click_pause: Duration::ZERO,
            step_pause: Duration::ZERO,
            drag_settle: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Builder: cap both step budgets.
    pub fn max_steps(mut self, steps: u32) -> Self {
        self.max_steps_normal = steps;
        self.max_steps_quiz = steps;
        self
    }

    pub fn budget(&self, quiz: bool) -> u32 {
        if quiz {
            self.max_steps_quiz
        } else {
            self.max_steps_normal
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
