use crate::chunker::word_count;

/// Cumulative counters for one session.
///
/// Only the tracker mutates these; the statistics engine reads them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounters {
    pub total_typed_words: usize,
    pub error_count: u32,
    pub total_keystrokes: u32,
    pub current_line_char_count: usize,
}

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum Outcome {
    Correct,
    Incorrect,
}

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum Keystroke {
    /// Input grew; the newest character was judged against the line.
    Forward(Outcome),
    /// Input shrank.
    Deleted,
    /// Same length as before (e.g. a replaced selection).
    Unchanged,
}

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub struct Change {
    pub keystroke: Keystroke,
    /// Input length reached the active line's length.
    pub completes_line: bool,
}

/// Display class of one character of the active line.
#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum CharClass {
    Correct,
    Incorrect,
    Cursor,
    Pending,
}

/// Compares live input against the active line one change at a time.
#[derive(Debug, Default, Clone)]
pub struct KeystrokeTracker {
    previous_len: usize,
}

impl KeystrokeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous_len(&self) -> usize {
        self.previous_len
    }

    /// Record a new input value. Lengths and indices count `char`s.
    pub fn apply(
        &mut self,
        counters: &mut SessionCounters,
        value: &str,
        active_line: &str,
    ) -> Change {
        let len = value.chars().count();

        let keystroke = if len > self.previous_len {
            let typed = value.chars().nth(len - 1);
            let expected = active_line.chars().nth(len - 1);
            let outcome = if typed.is_some() && typed == expected {
                Outcome::Correct
            } else {
                counters.error_count += 1;
                Outcome::Incorrect
            };
            counters.total_keystrokes += 1;
            Keystroke::Forward(outcome)
        } else if len < self.previous_len {
            Keystroke::Deleted
        } else {
            Keystroke::Unchanged
        };

        counters.current_line_char_count = len;
        self.previous_len = len;

        let line_len = active_line.chars().count();
        Change {
            keystroke,
            completes_line: line_len > 0 && len >= line_len,
        }
    }

    /// Fold a finished line into the counters and start the next one empty.
    pub fn complete_line(&mut self, counters: &mut SessionCounters, line_text: &str) {
        counters.total_typed_words += word_count(line_text);
        counters.current_line_char_count = 0;
        self.previous_len = 0;
    }
}

/// Classify each character of `active` against `input` for display.
pub fn classify(active: &str, input: &str) -> Vec<(char, CharClass)> {
    let mut typed = input.chars();
    let typed_len = input.chars().count();

    active
        .chars()
        .enumerate()
        .map(|(idx, expected)| {
            let class = match typed.next() {
                Some(c) if c == expected => CharClass::Correct,
                Some(_) => CharClass::Incorrect,
                None if idx == typed_len => CharClass::Cursor,
                None => CharClass::Pending,
            };
            (expected, class)
        })
        .collect()
}
