use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use crate::buffer::{FetchPurpose, TextBuffer};
use crate::error::SubmitError;
use crate::language::Language;
use crate::results::{SessionResult, SubmissionPayload};
use crate::stats::{self, LiveStats};
use crate::timer::{SessionTimer, Tick};
use crate::tracker::{classify, CharClass, KeystrokeTracker, SessionCounters};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub language: Language,
    pub duration: Duration,
    pub words_per_line: usize,
    pub visible_lines: usize,
    pub low_water_mark: usize,
    pub fan_out: usize,
    pub user_id: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            language: Language::default(),
            duration: Duration::from_secs(60),
            words_per_line: 6,
            visible_lines: 3,
            low_water_mark: 10,
            fan_out: 3,
            user_id: None,
        }
    }
}

/// Identifies one run of the test; completions from older runs are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub id: LineId,
    pub text: String,
    pub completed: bool,
}

/// Work the controller needs done outside its own state.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    FetchText {
        epoch: Epoch,
        purpose: FetchPurpose,
        lang: Language,
        fan_out: usize,
        prev: Option<String>,
    },
    SubmitResult {
        epoch: Epoch,
        payload: SubmissionPayload,
    },
}

/// Raw events from the input surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Typed(char),
    Backspace,
    Paste(String),
    Drop,
    ContextMenu,
}

/// Owns all state of a typing test and reacts to input, ticks and
/// collaborator completions.
#[derive(Debug)]
pub struct SessionController {
    config: SessionConfig,
    epoch: Epoch,
    session_id: Uuid,
    window: VecDeque<Line>,
    buffer: TextBuffer,
    tracker: KeystrokeTracker,
    counters: SessionCounters,
    timer: SessionTimer,
    stats: LiveStats,
    input: String,
    last_completed: Option<Line>,
    result: Option<SessionResult>,
    submitted: bool,
    next_line_id: u64,
    effects: Vec<Effect>,
}

impl SessionController {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            buffer: TextBuffer::new(config.low_water_mark),
            timer: SessionTimer::new(config.duration),
            config,
            epoch: Epoch::default(),
            session_id: Uuid::new_v4(),
            window: VecDeque::new(),
            tracker: KeystrokeTracker::new(),
            counters: SessionCounters::default(),
            stats: LiveStats::IDLE,
            input: String::new(),
            last_completed: None,
            result: None,
            submitted: false,
            next_line_id: 0,
            effects: Vec::new(),
        }
    }

    /// Reset everything and request the initial text for `lang`.
    pub fn start(&mut self, lang: Language) {
        self.epoch = Epoch(self.epoch.0 + 1);
        self.session_id = Uuid::new_v4();
        self.config.language = lang;

        self.window.clear();
        self.buffer.clear();
        self.tracker = KeystrokeTracker::new();
        self.counters = SessionCounters::default();
        self.timer.stop();
        self.stats = LiveStats::IDLE;
        self.input.clear();
        self.last_completed = None;
        self.result = None;
        self.submitted = false;

        tracing::info!(epoch = self.epoch.0, session_id = %self.session_id, %lang, "session started");

        self.buffer.begin_initial_fill();
        self.effects.push(Effect::FetchText {
            epoch: self.epoch,
            purpose: FetchPurpose::Initial,
            lang,
            fan_out: self.config.fan_out,
            prev: self.buffer.prev_hint().map(str::to_string),
        });
    }

    pub fn restart(&mut self) {
        self.start(self.config.language);
    }

    /// Switch language; refused while a countdown is running.
    pub fn set_language(&mut self, lang: Language) -> bool {
        if self.timer.is_running() {
            return false;
        }
        self.start(lang);
        true
    }

    pub fn handle_input(&mut self, event: InputEvent, now: Instant) {
        match event {
            InputEvent::Typed(c) => {
                let mut value = self.input.clone();
                value.push(c);
                self.submit_input(&value, now);
            }
            InputEvent::Backspace => {
                let mut value = self.input.clone();
                if value.pop().is_some() {
                    self.submit_input(&value, now);
                }
            }
            InputEvent::Paste(_) | InputEvent::Drop | InputEvent::ContextMenu => {
                tracing::debug!(?event, "rejected non-typed input");
            }
        }
    }

    /// Feed the full current value of the input field. A value that grew by
    /// more than one character was not typed and is ignored.
    pub fn submit_input(&mut self, value: &str, now: Instant) {
        if self.timer.is_expired() {
            tracing::debug!("input after expiry ignored");
            return;
        }

        let Some(active) = self.window.front() else {
            // a keystroke with nothing to type re-arms a fetch that came back empty
            self.refill_if_low();
            return;
        };

        if value.chars().count() > self.input.chars().count() + 1 {
            tracing::debug!("multi-character input rejected");
            return;
        }

        if !value.is_empty() && self.timer.start(now) {
            tracing::debug!(epoch = self.epoch.0, "timer started");
        }

        let change = self.tracker.apply(&mut self.counters, value, &active.text);
        self.input = value.to_string();

        if change.completes_line {
            self.complete_active_line();
        }

        self.recompute(now);
    }

    pub fn on_tick(&mut self, now: Instant) {
        match self.timer.tick(now) {
            Tick::Running { .. } => self.recompute(now),
            Tick::Expired => self.on_expire(now),
            Tick::Idle | Tick::AlreadyExpired => {}
        }
    }

    pub fn on_text_arrived(&mut self, epoch: Epoch, purpose: FetchPurpose, blocks: Vec<String>) {
        if epoch != self.epoch {
            tracing::debug!(stale = epoch.0, current = self.epoch.0, "dropping stale text");
            return;
        }

        let added = self
            .buffer
            .accept(purpose, &blocks, self.config.words_per_line);
        tracing::debug!(?purpose, added, queued = self.buffer.len(), "text arrived");

        self.fill_window();
        // an empty answer waits for the next keystroke or completed line
        if added > 0 {
            self.refill_if_low();
        }
    }

    pub fn on_submit_finished(&mut self, epoch: Epoch, outcome: Result<(), SubmitError>) {
        if epoch != self.epoch {
            tracing::debug!(stale = epoch.0, current = self.epoch.0, "dropping stale submit outcome");
            return;
        }

        match outcome {
            Ok(()) => tracing::info!(session_id = %self.session_id, "result submitted"),
            Err(err) => {
                tracing::warn!(session_id = %self.session_id, error = %err, "result submission failed");
                if err.allows_retry() {
                    self.submitted = false;
                }
            }
        }
    }

    /// Re-emit the submission for a finished session whose upload never
    /// reached the collaborator.
    pub fn retry_submission(&mut self) {
        if self.result.is_some() {
            self.submit_once();
        }
    }

    /// Drain side effects produced since the last call.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    fn on_expire(&mut self, now: Instant) {
        self.recompute(now);

        if self.result.is_none() {
            let result = SessionResult {
                language: self.config.language,
                wpm: self.stats.wpm,
                accuracy: self.stats.accuracy,
                total_keystrokes: self.counters.total_keystrokes,
                error_count: self.counters.error_count,
                timestamp: Utc::now(),
                session_id: self.session_id,
            };
            tracing::info!(
                session_id = %self.session_id,
                wpm = result.wpm,
                accuracy = result.accuracy,
                "session complete"
            );
            self.result = Some(result);
        }

        self.submit_once();
    }

    fn submit_once(&mut self) {
        if self.submitted {
            return;
        }
        let Some(user_id) = self.config.user_id.as_deref() else {
            tracing::info!("not signed in, result not submitted");
            return;
        };
        let Some(result) = self.result.as_ref() else {
            return;
        };

        self.submitted = true;
        self.effects.push(Effect::SubmitResult {
            epoch: self.epoch,
            payload: result.payload(user_id),
        });
    }

    fn complete_active_line(&mut self) {
        let Some(mut line) = self.window.pop_front() else {
            return;
        };
        line.completed = true;
        self.tracker.complete_line(&mut self.counters, &line.text);
        self.input.clear();
        self.last_completed = Some(line);

        self.fill_window();
        self.refill_if_low();
    }

    fn fill_window(&mut self) {
        while self.window.len() < self.config.visible_lines {
            let Some(text) = self.buffer.pop_front() else {
                break;
            };
            let id = LineId(self.next_line_id);
            self.next_line_id += 1;
            self.window.push_back(Line {
                id,
                text,
                completed: false,
            });
        }
    }

    fn refill_if_low(&mut self) {
        if self.buffer.begin_refill_if_low() {
            self.effects.push(Effect::FetchText {
                epoch: self.epoch,
                purpose: FetchPurpose::Refill,
                lang: self.config.language,
                fan_out: self.config.fan_out,
                prev: self.buffer.prev_hint().map(str::to_string),
            });
        }
    }

    fn recompute(&mut self, now: Instant) {
        if self.timer.is_expired() && self.result.is_some() {
            return;
        }
        if self.timer.is_running() || self.timer.is_expired() {
            self.stats = stats::compute(&self.counters, self.timer.elapsed(now));
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn language(&self) -> Language {
        self.config.language
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn visible_lines(&self) -> impl Iterator<Item = &Line> {
        self.window.iter()
    }

    pub fn active_line(&self) -> Option<&Line> {
        self.window.front()
    }

    pub fn last_completed(&self) -> Option<&Line> {
        self.last_completed.as_ref()
    }

    /// Per-character classes of the active line against the live input.
    pub fn active_classes(&self) -> Vec<(char, CharClass)> {
        self.window
            .front()
            .map(|line| classify(&line.text, &self.input))
            .unwrap_or_default()
    }

    pub fn queued_lines(&self) -> usize {
        self.buffer.len()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn counters(&self) -> SessionCounters {
        self.counters
    }

    pub fn stats(&self) -> LiveStats {
        self.stats
    }

    pub fn has_started(&self) -> bool {
        !matches!(self.timer.state(), crate::timer::TimerState::Idle)
    }

    pub fn elapsed_secs(&self, now: Instant) -> u64 {
        self.timer.elapsed(now).as_secs()
    }

    pub fn remaining_secs(&self, now: Instant) -> u64 {
        self.timer.remaining_secs(now)
    }

    pub fn is_complete(&self) -> bool {
        self.timer.is_expired()
    }

    pub fn result(&self) -> Option<&SessionResult> {
        self.result.as_ref()
    }

    /// A text fetch for this session is outstanding.
    pub fn is_fetching(&self) -> bool {
        self.buffer.in_flight().is_some()
    }

    pub fn is_signed_in(&self) -> bool {
        self.config.user_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn config(user: Option<&str>) -> SessionConfig {
        SessionConfig {
            duration: Duration::from_secs(10),
            words_per_line: 1,
            visible_lines: 3,
            low_water_mark: 2,
            user_id: user.map(str::to_string),
            ..SessionConfig::default()
        }
    }

    fn started(user: Option<&str>, text: &str) -> SessionController {
        let mut session = SessionController::new(config(user));
        session.start(Language::En);
        let epoch = session.epoch();
        session.take_effects();
        session.on_text_arrived(epoch, FetchPurpose::Initial, vec![text.to_string()]);
        session
    }

    fn type_str(session: &mut SessionController, text: &str, now: Instant) {
        for c in text.chars() {
            session.handle_input(InputEvent::Typed(c), now);
        }
    }

    #[test]
    fn start_requests_initial_fill() {
        let mut session = SessionController::new(config(None));
        session.start(Language::Es);
        let effects = session.take_effects();
        assert_matches!(
            effects.as_slice(),
            [Effect::FetchText { purpose: FetchPurpose::Initial, lang: Language::Es, fan_out: 3, .. }]
        );
        assert!(session.take_effects().is_empty());
    }

    #[test]
    fn initial_text_fills_window_then_queue() {
        let session = started(None, "cat dog emu fox gnu hen");
        let texts: Vec<&str> = session.visible_lines().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["cat ", "dog ", "emu "]);
        assert_eq!(session.queued_lines(), 3);
    }

    #[test]
    fn completing_a_line_promotes_the_next() {
        let mut session = started(None, "cat dog emu fox gnu hen");
        let now = Instant::now();
        type_str(&mut session, "cat ", now);

        let counters = session.counters();
        assert_eq!(counters.total_keystrokes, 4);
        assert_eq!(counters.error_count, 0);
        assert_eq!(counters.total_typed_words, 1);
        assert_eq!(session.input(), "");

        let texts: Vec<&str> = session.visible_lines().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["dog ", "emu ", "fox "]);
        assert_eq!(session.queued_lines(), 2);
        assert!(session.last_completed().unwrap().completed);
        assert!(session.visible_lines().all(|l| !l.completed));
    }

    #[test]
    fn typo_lowers_accuracy() {
        let mut session = started(None, "cat dog emu");
        let now = Instant::now();
        type_str(&mut session, "cot ", now);
        assert_eq!(session.counters().error_count, 1);
        assert_eq!(session.stats().accuracy, 75);
    }

    #[test]
    fn first_keystroke_starts_the_clock() {
        let mut session = started(None, "cat dog");
        let t0 = Instant::now();
        assert!(!session.has_started());
        session.submit_input("", t0);
        assert!(!session.has_started());
        session.submit_input("c", t0);
        assert!(session.has_started());
        assert_eq!(session.remaining_secs(t0 + Duration::from_secs(3)), 7);
    }

    #[test]
    fn empty_window_ignores_input() {
        let mut session = SessionController::new(config(None));
        session.start(Language::En);
        session.take_effects();
        let now = Instant::now();
        session.submit_input("abc", now);
        assert_eq!(session.counters(), SessionCounters::default());
        assert_eq!(session.input(), "");
        assert!(session.active_classes().is_empty());
        assert!(!session.has_started());
    }

    fn answer_fetches_with_empty_blocks(session: &mut SessionController) -> usize {
        let mut fetches = 0;
        for _ in 0..20 {
            let effects = session.take_effects();
            if effects.is_empty() {
                break;
            }
            for effect in effects {
                if let Effect::FetchText { epoch, purpose, fan_out, .. } = effect {
                    fetches += 1;
                    session.on_text_arrived(epoch, purpose, vec![String::new(); fan_out]);
                }
            }
        }
        fetches
    }

    #[test]
    fn empty_text_does_not_refetch_on_its_own() {
        let mut session = SessionController::new(config(None));
        session.start(Language::En);

        assert_eq!(answer_fetches_with_empty_blocks(&mut session), 1);
        assert!(!session.is_fetching());
        assert!(session.active_line().is_none());

        // a keystroke asks once more
        session.handle_input(InputEvent::Typed('a'), Instant::now());
        assert_eq!(answer_fetches_with_empty_blocks(&mut session), 1);
        assert!(!session.has_started());
    }

    #[test]
    fn empty_refill_waits_for_the_next_line() {
        let mut session = started(None, "a b c d");
        let now = Instant::now();
        assert_eq!(answer_fetches_with_empty_blocks(&mut session), 1);

        type_str(&mut session, "a ", now);
        assert_eq!(answer_fetches_with_empty_blocks(&mut session), 1);
        type_str(&mut session, "b", now);
        assert!(session.take_effects().is_empty());
    }

    #[test]
    fn multi_character_jump_is_not_typing() {
        let mut session = started(None, "cat dog");
        let now = Instant::now();
        session.submit_input("cat ", now);
        assert_eq!(session.counters(), SessionCounters::default());
        assert_eq!(session.input(), "");
        assert!(!session.has_started());

        type_str(&mut session, "ca", now);
        session.submit_input("cat do", now);
        assert_eq!(session.input(), "ca");
        assert_eq!(session.counters().total_keystrokes, 2);
    }

    #[test]
    fn paste_drop_and_context_menu_are_no_ops() {
        let mut session = started(None, "cat dog");
        let now = Instant::now();
        session.handle_input(InputEvent::Paste("cat ".into()), now);
        session.handle_input(InputEvent::Drop, now);
        session.handle_input(InputEvent::ContextMenu, now);
        assert_eq!(session.input(), "");
        assert!(!session.has_started());
    }

    #[test]
    fn refill_is_requested_once_when_low() {
        let mut session = started(None, "a b c d");
        // window 3, queue 1 < low water 2
        let refills = session
            .take_effects()
            .into_iter()
            .filter(|e| matches!(e, Effect::FetchText { purpose: FetchPurpose::Refill, .. }))
            .count();
        assert_eq!(refills, 1);

        let now = Instant::now();
        type_str(&mut session, "a ", now);
        type_str(&mut session, "b ", now);
        assert!(session.take_effects().is_empty());
    }

    #[test]
    fn stale_text_is_dropped() {
        let mut session = SessionController::new(config(None));
        session.start(Language::En);
        let old = session.epoch();
        session.restart();
        session.on_text_arrived(old, FetchPurpose::Initial, vec!["stale words".into()]);
        assert_eq!(session.visible_lines().count(), 0);
    }

    #[test]
    fn expiry_submits_exactly_once() {
        let mut session = started(Some("user-1"), "cat dog emu");
        let t0 = Instant::now();
        type_str(&mut session, "cat ", t0);
        session.take_effects();

        session.on_tick(t0 + Duration::from_secs(10));
        let effects = session.take_effects();
        assert_eq!(effects.len(), 1);
        assert_matches!(&effects[0], Effect::SubmitResult { payload, .. } => {
            assert_eq!(payload.user_id, "user-1");
            assert_eq!(payload.keystrokes, 4);
            assert_eq!(payload.errors, 0);
            assert_eq!(payload.session_id, session.session_id());
        });

        session.on_tick(t0 + Duration::from_secs(11));
        session.on_tick(t0 + Duration::from_secs(12));
        assert!(session.take_effects().is_empty());
        assert!(session.is_complete());
    }

    #[test]
    fn anonymous_sessions_complete_without_submitting() {
        let mut session = started(None, "cat dog");
        let t0 = Instant::now();
        type_str(&mut session, "ca", t0);
        session.take_effects();
        session.on_tick(t0 + Duration::from_secs(10));
        assert!(session.is_complete());
        assert!(session.result().is_some());
        assert!(session.take_effects().is_empty());
    }

    #[test]
    fn input_after_expiry_is_rejected_and_stats_freeze() {
        let mut session = started(None, "cat dog");
        let t0 = Instant::now();
        type_str(&mut session, "ca", t0 + Duration::from_secs(1));
        session.on_tick(t0 + Duration::from_secs(11));
        let frozen = session.stats();
        let counters = session.counters();

        type_str(&mut session, "t ", t0 + Duration::from_secs(12));
        session.on_tick(t0 + Duration::from_secs(13));
        assert_eq!(session.counters(), counters);
        assert_eq!(session.stats(), frozen);
    }

    #[test]
    fn transport_failure_allows_manual_retry() {
        let mut session = started(Some("u"), "cat");
        let t0 = Instant::now();
        type_str(&mut session, "c", t0);
        session.on_tick(t0 + Duration::from_secs(10));
        session.take_effects();
        let epoch = session.epoch();

        session.retry_submission();
        assert!(session.take_effects().is_empty());

        session.on_submit_finished(epoch, Err(SubmitError::Rejected { status: 400 }));
        session.retry_submission();
        assert!(session.take_effects().is_empty());

        session.on_submit_finished(epoch, Err(SubmitError::Transport("refused".into())));
        session.retry_submission();
        assert_eq!(session.take_effects().len(), 1);
    }

    #[test]
    fn restart_resets_counters_and_clock() {
        let mut session = started(None, "cat dog");
        let t0 = Instant::now();
        type_str(&mut session, "cx", t0);
        session.restart();
        assert_eq!(session.counters(), SessionCounters::default());
        assert_eq!(session.stats(), LiveStats::IDLE);
        assert!(!session.has_started());
        assert_eq!(session.remaining_secs(t0), 10);
    }

    #[test]
    fn language_is_locked_while_running() {
        let mut session = started(None, "cat dog");
        session.submit_input("c", Instant::now());
        assert!(!session.set_language(Language::Fr));
        session.restart();
        assert!(session.set_language(Language::Fr));
        assert_eq!(session.language(), Language::Fr);
    }

    #[test]
    fn backspace_tracks_length_without_keystrokes() {
        let mut session = started(None, "cat dog");
        let now = Instant::now();
        type_str(&mut session, "cx", now);
        session.handle_input(InputEvent::Backspace, now);
        assert_eq!(session.input(), "c");
        assert_eq!(session.counters().total_keystrokes, 2);
        assert_eq!(session.counters().current_line_char_count, 1);
    }
}
