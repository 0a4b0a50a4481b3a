use std::collections::VecDeque;

use crate::chunker::Chunker;

/// Why a text fetch was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPurpose {
    /// First fill after `start`; seeds the visible window.
    Initial,
    /// Top-up of the pending queue after it fell below the low-water mark.
    Refill,
}

/// Queue of chunked lines not yet shown, refilled before it runs dry.
///
/// At most one fetch is outstanding at a time; further triggers while one is
/// in flight are coalesced into it.
#[derive(Debug, Clone)]
pub struct TextBuffer {
    queue: VecDeque<String>,
    low_water: usize,
    in_flight: Option<FetchPurpose>,
    last_block: Option<String>,
}

impl TextBuffer {
    pub fn new(low_water: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            low_water,
            in_flight: None,
            last_block: None,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn in_flight(&self) -> Option<FetchPurpose> {
        self.in_flight
    }

    /// Last block received, passed to the supplier to avoid a repeat.
    pub fn prev_hint(&self) -> Option<&str> {
        self.last_block.as_deref()
    }

    /// Drop queued lines and forget any outstanding fetch.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.in_flight = None;
    }

    pub fn begin_initial_fill(&mut self) {
        self.in_flight = Some(FetchPurpose::Initial);
    }

    /// Claim the refill slot if the queue is low and nothing is outstanding.
    pub fn begin_refill_if_low(&mut self) -> bool {
        if self.queue.len() >= self.low_water || self.in_flight.is_some() {
            return false;
        }
        self.in_flight = Some(FetchPurpose::Refill);
        true
    }

    /// Chunk fetched blocks (request order) onto the back of the queue.
    /// Returns the number of lines added.
    pub fn accept(&mut self, purpose: FetchPurpose, blocks: &[String], words_per_line: usize) -> usize {
        if self.in_flight == Some(purpose) {
            self.in_flight = None;
        }

        if let Some(last) = blocks.iter().rev().find(|b| !b.trim().is_empty()) {
            self.last_block = Some(last.clone());
        }

        let combined = blocks.join(" ");
        let before = self.queue.len();
        self.queue.extend(Chunker::new(&combined, words_per_line).lines());
        self.queue.len() - before
    }

    pub fn pop_front(&mut self) -> Option<String> {
        self.queue.pop_front()
    }
}
