use std::{
    error::Error,
    fs::OpenOptions,
    io::{self, stdin},
    sync::Arc,
    time::Instant,
};

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{
        DisableBracketedPaste, EnableBracketedPaste, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use tapline::{
    app_dirs::AppDirs,
    config::{Config, ConfigStore, FileConfigStore},
    results::{HttpResultSink, ResultSink, ResultStore, SubmissionPayload},
    runtime::{AppEvent, CrosstermEventSource, EffectExecutor, FixedTicker, Runner},
    supply::{CorpusSupply, HttpSupply, TextSupply},
    ui::TypingView,
    InputEvent, Language, SessionController,
};

const HISTORY_LIMIT: usize = 10;

/// timed typing trainer with streamed practice text
#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct Cli {
    /// language of the practice text
    #[clap(short = 'l', long, value_enum)]
    language: Option<Language>,

    /// number of seconds to run the test
    #[clap(short = 's', long)]
    number_of_secs: Option<u64>,

    /// number of words on each displayed line
    #[clap(short = 'w', long)]
    words_per_line: Option<usize>,

    /// base url of a remote text endpoint (default: bundled texts)
    #[clap(long)]
    text_endpoint: Option<String>,

    /// base url of a remote result endpoint (default: local store)
    #[clap(long)]
    results_endpoint: Option<String>,

    /// user id results are recorded under; results are not saved without one
    #[clap(short = 'u', long)]
    user: Option<String>,

    /// do not keep results in the local store
    #[clap(long)]
    no_store: bool,

    /// persist the effective settings to the config file
    #[clap(long)]
    save_config: bool,
}

impl Cli {
    fn apply(&self, mut config: Config) -> Config {
        if let Some(language) = self.language {
            config.language = language;
        }
        if let Some(secs) = self.number_of_secs {
            config.duration_secs = secs;
        }
        if let Some(words) = self.words_per_line {
            config.words_per_line = words;
        }
        if self.text_endpoint.is_some() {
            config.text_endpoint = self.text_endpoint.clone();
        }
        if self.results_endpoint.is_some() {
            config.results_endpoint = self.results_endpoint.clone();
        }
        if self.user.is_some() {
            config.user_id = self.user.clone();
        }
        if self.no_store {
            config.store_results = false;
        }
        config
    }
}

struct App {
    session: SessionController,
    executor: EffectExecutor,
    store: Option<Arc<ResultStore>>,
    history: Vec<SubmissionPayload>,
}

impl App {
    fn flush_effects(&mut self) {
        let effects = self.session.take_effects();
        self.executor.execute_all(effects);
    }

    fn refresh_history(&mut self) {
        let (Some(store), Some(user)) = (&self.store, self.session.config().user_id.as_deref())
        else {
            return;
        };
        match store.recent(user, HISTORY_LIMIT) {
            Ok(history) => self.history = history,
            Err(err) => tracing::warn!(error = %err, "could not read result history"),
        }
    }

    fn on_key(&mut self, key: KeyEvent, now: Instant) -> bool {
        if key.kind != KeyEventKind::Press {
            return true;
        }
        match key.code {
            KeyCode::Esc => return false,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return false,
            KeyCode::Tab => self.session.restart(),
            KeyCode::F(2) => {
                let next = self.session.language().next();
                self.session.set_language(next);
            }
            KeyCode::F(5) => self.session.retry_submission(),
            KeyCode::Backspace => self.session.handle_input(InputEvent::Backspace, now),
            KeyCode::Char(c)
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                self.session.handle_input(InputEvent::Typed(c), now)
            }
            _ => {}
        }
        true
    }
}

fn init_tracing() -> Result<WorkerGuard, Box<dyn Error>> {
    let log_dir = AppDirs::log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("tapline.log"))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tapline=info"));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_target(true)
        .with_ansi(false)
        .try_init()
        .map_err(|e| e as Box<dyn Error>)?;

    Ok(guard)
}

fn build_supply(config: &Config) -> Result<Arc<dyn TextSupply>, Box<dyn Error>> {
    let supply: Arc<dyn TextSupply> = match &config.text_endpoint {
        Some(url) => Arc::new(HttpSupply::new(url.as_str())?),
        None => Arc::new(CorpusSupply::bundled()),
    };
    Ok(supply)
}

fn open_store(config: &Config) -> Option<Arc<ResultStore>> {
    if !config.store_results {
        return None;
    }
    let path = AppDirs::db_path()?;
    match ResultStore::open(&path) {
        Ok(store) => Some(Arc::new(store)),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "result store unavailable");
            None
        }
    }
}

fn build_sink(
    config: &Config,
    store: &Option<Arc<ResultStore>>,
) -> Result<Option<Arc<dyn ResultSink>>, Box<dyn Error>> {
    if let Some(url) = &config.results_endpoint {
        let sink: Arc<dyn ResultSink> = Arc::new(HttpResultSink::new(url.as_str())?);
        return Ok(Some(sink));
    }
    Ok(store.clone().map(|s| s as Arc<dyn ResultSink>))
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let _guard = init_tracing()?;

    let config_store = FileConfigStore::new();
    let config = cli.apply(config_store.load());
    if cli.save_config {
        config_store.save(&config)?;
        tracing::info!(path = %config_store.path().display(), "config saved");
    }

    let supply = build_supply(&config)?;
    let store = open_store(&config);
    let sink = build_sink(&config, &store)?;

    let events = CrosstermEventSource::new();
    let executor = EffectExecutor::new(supply, sink, events.sender());
    let runner = Runner::new(events, FixedTicker::new(config.tick_interval()));

    let mut app = App {
        session: SessionController::new(config.session_config()),
        executor,
        store,
        history: Vec::new(),
    };
    app.refresh_history();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    // pastes must arrive as one Paste event, not as a burst of keys
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let outcome = start_tui(&mut terminal, &mut app, &runner, &config);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableBracketedPaste,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    outcome
}

fn start_tui<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &Runner<CrosstermEventSource, FixedTicker>,
    config: &Config,
) -> Result<(), Box<dyn Error>> {
    let tick_interval = config.tick_interval();
    let mut last_tick = Instant::now();

    app.session.start(config.language);
    app.flush_effects();

    loop {
        let now = Instant::now();
        terminal.draw(|f| {
            let view = TypingView::new(&app.session, now).with_history(&app.history);
            f.render_widget(view, f.area());
        })?;

        let event = runner.step();
        let now = Instant::now();
        match event {
            AppEvent::Tick | AppEvent::Resize => {}
            AppEvent::Key(key) => {
                if !app.on_key(key, now) {
                    break;
                }
            }
            AppEvent::Paste(text) => app.session.handle_input(InputEvent::Paste(text), now),
            AppEvent::TextArrived {
                epoch,
                purpose,
                blocks,
            } => app.session.on_text_arrived(epoch, purpose, blocks),
            AppEvent::SubmitFinished { epoch, outcome } => {
                app.session.on_submit_finished(epoch, outcome);
                app.refresh_history();
            }
        }

        // steady keystrokes must not starve the countdown
        if now.duration_since(last_tick) >= tick_interval {
            app.session.on_tick(now);
            last_tick = now;
        }

        app.flush_effects();
    }

    Ok(())
}
