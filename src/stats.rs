use std::time::Duration;

use crate::tracker::SessionCounters;

/// Characters per standard word.
pub const CHARS_PER_WORD: f64 = 5.0;

/// Live throughput and accuracy, both rounded to whole numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveStats {
    pub wpm: u32,
    pub accuracy: u32,
}

impl LiveStats {
    /// What the display shows before the first keystroke.
    pub const IDLE: LiveStats = LiveStats {
        wpm: 0,
        accuracy: 100,
    };
}

impl Default for LiveStats {
    fn default() -> Self {
        Self::IDLE
    }
}

/// Recompute stats from scratch.
///
/// `elapsed` is floored at one millisecond so the first tick cannot divide
/// by zero.
pub fn compute(counters: &SessionCounters, elapsed: Duration) -> LiveStats {
    let char_count =
        counters.total_typed_words as f64 * CHARS_PER_WORD + counters.current_line_char_count as f64;
    let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
    let minutes = elapsed_ms.max(1.0) / 60_000.0;
    let wpm = ((char_count / CHARS_PER_WORD) / minutes).round();

    let strokes = counters.total_keystrokes.max(1) as f64;
    let correct = (counters.total_keystrokes.max(1).saturating_sub(counters.error_count)) as f64;
    let accuracy = ((correct / strokes) * 100.0).round().clamp(0.0, 100.0);

    LiveStats {
        wpm: wpm.max(0.0) as u32,
        accuracy: accuracy as u32,
    }
}
