use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running { started_at: Instant },
    Expired { started_at: Instant },
}

/// Result of advancing the timer by one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Idle,
    Running { remaining_secs: u64 },
    /// The countdown just hit zero. Returned once per run.
    Expired,
    AlreadyExpired,
}

/// Fixed-duration countdown that starts on the first keystroke.
#[derive(Debug, Clone)]
pub struct SessionTimer {
    total: Duration,
    state: TimerState,
}

impl SessionTimer {
    pub fn new(total: Duration) -> Self {
        Self {
            total,
            state: TimerState::Idle,
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, TimerState::Running { .. })
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.state, TimerState::Expired { .. })
    }

    /// Idle -> running. Returns false (and changes nothing) in any other state.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.state != TimerState::Idle {
            return false;
        }
        self.state = TimerState::Running { started_at: now };
        true
    }

    /// Back to idle; any pending tick reads the new state and does nothing.
    pub fn stop(&mut self) {
        self.state = TimerState::Idle;
    }

    pub fn tick(&mut self, now: Instant) -> Tick {
        match self.state {
            TimerState::Idle => Tick::Idle,
            TimerState::Expired { .. } => Tick::AlreadyExpired,
            TimerState::Running { started_at } => {
                let remaining_secs = self.remaining_from(started_at, now);
                if remaining_secs == 0 {
                    self.state = TimerState::Expired { started_at };
                    Tick::Expired
                } else {
                    Tick::Running { remaining_secs }
                }
            }
        }
    }

    /// Time since start, capped at the session length once expired.
    pub fn elapsed(&self, now: Instant) -> Duration {
        match self.state {
            TimerState::Idle => Duration::ZERO,
            TimerState::Running { started_at } => now.saturating_duration_since(started_at),
            TimerState::Expired { started_at } => {
                now.saturating_duration_since(started_at).min(self.total)
            }
        }
    }

    pub fn remaining_secs(&self, now: Instant) -> u64 {
        match self.state {
            TimerState::Idle => self.total.as_secs(),
            TimerState::Running { started_at } => self.remaining_from(started_at, now),
            TimerState::Expired { .. } => 0,
        }
    }

    fn remaining_from(&self, started_at: Instant, now: Instant) -> u64 {
        let elapsed_secs = now.saturating_duration_since(started_at).as_secs();
        self.total.as_secs().saturating_sub(elapsed_secs)
    }
}
