use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent};

use crate::buffer::FetchPurpose;
use crate::error::SubmitError;
use crate::results::ResultSink;
use crate::session::{Effect, Epoch};
use crate::supply::{fetch_fan_out, TextSupply};

/// Everything the event loop reacts to: terminal input, ticks and
/// completions of background work.
#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Paste(String),
    Resize,
    Tick,
    TextArrived {
        epoch: Epoch,
        purpose: FetchPurpose,
        blocks: Vec<String>,
    },
    SubmitFinished {
        epoch: Epoch,
        outcome: Result<(), SubmitError>,
    },
}

/// Source of app events (keyboard, resize, collaborator completions)
pub trait AppEventSource: Send + 'static {
    /// Wait at most `timeout` for the next event.
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError>;
}

/// Terminal input read on a dedicated thread, merged with events posted
/// through [`CrosstermEventSource::sender`].
pub struct CrosstermEventSource {
    tx: Sender<AppEvent>,
    rx: Receiver<AppEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        let reader_tx = tx.clone();

        thread::spawn(move || loop {
            let evt = match event::read() {
                Ok(CtEvent::Key(key)) => AppEvent::Key(key),
                Ok(CtEvent::Paste(text)) => AppEvent::Paste(text),
                Ok(CtEvent::Resize(_, _)) => AppEvent::Resize,
                Ok(_) => continue,
                Err(err) => {
                    tracing::error!(error = %err, "terminal event reader stopped");
                    break;
                }
            };
            if reader_tx.send(evt).is_err() {
                break;
            }
        });

        Self { tx, rx }
    }

    /// Handle for background work to post completions into the loop.
    pub fn sender(&self) -> Sender<AppEvent> {
        self.tx.clone()
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AppEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Tick period of the event loop.
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Channel-backed event source for tests and headless drivers
pub struct TestEventSource {
    rx: Receiver<AppEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<AppEvent>) -> Self {
        Self { rx }
    }
}

impl AppEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Pulls one event per call, yielding `Tick` when the period passes quietly.
pub struct Runner<E: AppEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: AppEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    pub fn step(&self) -> AppEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => AppEvent::Tick,
        }
    }
}

/// Runs controller effects off the event loop thread and posts their
/// completions back as events.
pub struct EffectExecutor {
    supply: Arc<dyn TextSupply>,
    sink: Option<Arc<dyn ResultSink>>,
    tx: Sender<AppEvent>,
}

impl EffectExecutor {
    pub fn new(
        supply: Arc<dyn TextSupply>,
        sink: Option<Arc<dyn ResultSink>>,
        tx: Sender<AppEvent>,
    ) -> Self {
        Self { supply, sink, tx }
    }

    pub fn execute(&self, effect: Effect) {
        match effect {
            Effect::FetchText {
                epoch,
                purpose,
                lang,
                fan_out,
                prev,
            } => {
                let supply = Arc::clone(&self.supply);
                let tx = self.tx.clone();
                thread::spawn(move || {
                    let blocks = fetch_fan_out(supply.as_ref(), lang, fan_out, prev.as_deref());
                    let _ = tx.send(AppEvent::TextArrived {
                        epoch,
                        purpose,
                        blocks,
                    });
                });
            }
            Effect::SubmitResult { epoch, payload } => {
                let Some(sink) = self.sink.as_ref().map(Arc::clone) else {
                    tracing::debug!(session_id = %payload.session_id, "no result sink configured");
                    return;
                };
                let tx = self.tx.clone();
                thread::spawn(move || {
                    let outcome = sink.submit(&payload);
                    let _ = tx.send(AppEvent::SubmitFinished { epoch, outcome });
                });
            }
        }
    }

    pub fn execute_all(&self, effects: Vec<Effect>) {
        for effect in effects {
            self.execute(effect);
        }
    }
}
