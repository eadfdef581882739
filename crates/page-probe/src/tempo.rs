//! Pacing for synthesized input.
//!
//! Keystrokes carry a humanised 30–80 ms cadence; drags interpolate with
//! short inter-move delays. The schedule is a deterministic function of the
//! event index so replays observe identical timing. Tests run with
//! [`Tempo::instant`].

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct Tempo {
    /// Minimum inter-key delay.
    pub key_min_ms: u64,
    /// Additional jitter span on top of the minimum.
    pub key_jitter_ms: u64,
    /// Delay between interpolated drag moves.
    pub drag_step_ms: u64,
    /// Delay between the synthesized-drag phases.
    pub drag_phase_ms: u64,
}

impl Default for Tempo {
    fn default() -> Self {
        Self {
            key_min_ms: 30,
            key_jitter_ms: 50,
            drag_step_ms: 15,
            drag_phase_ms: 40,
        }
    }
}

impl Tempo {
    /// Zero-delay tempo for tests.
    pub fn instant() -> Self {
        Self {
            key_min_ms: 0,
            key_jitter_ms: 0,
            drag_step_ms: 0,
            drag_phase_ms: 0,
        }
    }

    /// Inter-key delay for the `index`-th keystroke.
    pub fn key_delay(&self, index: usize) -> Duration {
        if self.key_jitter_ms == 0 {
            return Duration::from_millis(self.key_min_ms);
        }
        let jitter = (index as u64).wrapping_mul(31).wrapping_add(17) % (self.key_jitter_ms + 1);
        Duration::from_millis(self.key_min_ms + jitter)
    }

    pub fn drag_step(&self) -> Duration {
        Duration::from_millis(self.drag_step_ms)
    }

    pub fn drag_phase(&self) -> Duration {
        Duration::from_millis(self.drag_phase_ms)
    }
}
