// Library surface for the binary, headless/integration tests and reuse.
pub mod app_dirs;
pub mod buffer;
pub mod chunker;
pub mod config;
pub mod error;
pub mod language;
pub mod results;
pub mod runtime;
pub mod session;
pub mod stats;
pub mod supply;
pub mod timer;
pub mod tracker;
pub mod ui;

pub use language::Language;
pub use session::{Effect, InputEvent, SessionConfig, SessionController};

/// Interval of the statistics/countdown tick.
pub const TICK_RATE_MS: u64 = 100;
