mod ui;

use capacity::{
    app_dirs::AppDirs,
    config::{Config, ConfigStore, FileConfigStore},
    flight::{FailCause, FlightEvent},
    input::{Control, GamepadSource, InputFusion, NoGamepad},
    runtime::{CapacityEvent, CrosstermEventSource, FixedTicker, Runner},
    session::{Phase, Session, MAX_TICK_DT_MS},
    stats::{persist_summary, PersistOutcome, SessionSummary},
    store::SessionStore,
};
use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{
        DisableMouseCapture, EnableMouseCapture, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers, KeyboardEnhancementFlags, MouseButton, MouseEvent, MouseEventKind,
        PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{
        disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    fs::{self, OpenOptions},
    io::{self, stdin},
    path::PathBuf,
    sync::Mutex,
    time::Instant,
};
use tracing_subscriber::filter::EnvFilter;

/// How long the failure flash stays up after a flight fail.
const ALERT_FLASH_MS: f64 = 400.0;
/// Sessions shown in the summary history chart.
const HISTORY_LEN: usize = 20;

/// dual-task trainer: steer through gates while matching dice and rods
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A terminal dual-task capacity trainer. Steer a plane through scrolling gates while watching a matching task: press fire whenever two dice faces, or two rod figures, are identical."
)]
pub struct Cli {
    /// session length in seconds
    #[clap(short = 'd', long)]
    duration_secs: Option<u64>,

    /// milliseconds each matching stimulus stays up
    #[clap(short = 'i', long)]
    task_interval_ms: Option<u64>,

    /// milliseconds between obstacle spawns
    #[clap(long)]
    spawn_interval_ms: Option<u64>,

    /// obstacle scroll speed in field heights per second
    #[clap(long)]
    scroll_speed: Option<f64>,

    /// plane lateral speed in field widths per second
    #[clap(long)]
    lateral_speed: Option<f64>,

    /// gate gap as a fraction of the field width
    #[clap(short = 'g', long)]
    gap_width: Option<f64>,

    /// seed for reproducible sessions
    #[clap(long)]
    seed: Option<u64>,

    /// name under which results are recorded (defaults to $USER)
    #[clap(long, conflicts_with = "guest")]
    player: Option<String>,

    /// play without recording any results
    #[clap(long)]
    guest: bool,

    /// write the effective settings back to the config file
    #[clap(long)]
    save_config: bool,

    /// export the session history as CSV to PATH and exit
    #[clap(long, value_name = "PATH")]
    export_history: Option<PathBuf>,
}

impl Cli {
    /// Layer command-line overrides on top of the stored configuration.
    fn apply(&self, mut config: Config) -> Config {
        if let Some(secs) = self.duration_secs {
            config.session_duration_ms = secs.saturating_mul(1_000);
        }
        if let Some(ms) = self.task_interval_ms {
            config.task_change_interval_ms = ms;
        }
        if let Some(ms) = self.spawn_interval_ms {
            config.obstacle_spawn_interval_ms = ms;
        }
        if let Some(speed) = self.scroll_speed {
            config.obstacle_scroll_speed = speed;
        }
        if let Some(speed) = self.lateral_speed {
            config.lateral_speed = speed;
        }
        if let Some(gap) = self.gap_width {
            config.gap_width_fraction = gap;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.player.is_some() {
            config.player = self.player.clone();
        }
        config.sanitized()
    }

    fn identity(&self, config: &Config) -> Option<String> {
        if self.guest {
            None
        } else {
            config.player.clone().filter(|p| !p.is_empty())
        }
    }
}

/// Transient failure flash shown over the flight field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Alert {
    pub cause: FailCause,
    pub remaining_ms: f64,
}

impl Alert {
    pub fn label(&self) -> &'static str {
        match self.cause {
            FailCause::Collision => "collision",
            FailCause::MissedGate => "missed gate",
        }
    }
}

pub struct App {
    pub session: Session,
    pub input: InputFusion,
    gamepad: Box<dyn GamepadSource>,
    pub identity: Option<String>,
    store: Option<SessionStore>,
    pub alert: Option<Alert>,
    pub last_persist: Option<PersistOutcome>,
    pub best_score: Option<u32>,
    /// Recent scores for the current identity, oldest first.
    pub history: Vec<u32>,
    pub should_quit: bool,
}

impl App {
    pub fn new(config: Config, identity: Option<String>, store: Option<SessionStore>) -> Self {
        let mut app = Self {
            session: Session::new(config),
            input: InputFusion::new(false),
            gamepad: Box::new(NoGamepad),
            identity,
            store,
            alert: None,
            last_persist: None,
            best_score: None,
            history: Vec::new(),
            should_quit: false,
        };
        app.refresh_history();
        app
    }

    /// Terminals with the kitty keyboard protocol report key releases.
    pub fn with_release_events(mut self, release_events: bool) -> Self {
        self.input = InputFusion::new(release_events);
        self
    }

    pub fn on_key(&mut self, key: KeyEvent) {
        let control = control_for(key.code);

        if key.kind == KeyEventKind::Release {
            if let Some(control) = control {
                self.input.release(control);
            }
            return;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }

        if let Some(control) = control {
            self.input.press(control);
            return;
        }
        if key.kind == KeyEventKind::Repeat {
            return;
        }

        match key.code {
            KeyCode::Esc => {
                if self.session.phase() == Phase::Menu {
                    self.should_quit = true;
                } else {
                    self.session.exit_to_menu();
                    self.input.clear();
                    self.alert = None;
                }
            }
            KeyCode::Enter => {
                if self.session.phase() == Phase::Menu {
                    self.input.clear();
                    self.alert = None;
                    self.session.start();
                }
            }
            KeyCode::Char('p') | KeyCode::Char('P') => {
                if self.session.toggle_pause() && self.session.is_paused() {
                    self.input.clear();
                }
            }
            KeyCode::Char('r') | KeyCode::Char('R') => {
                if self.session.restart() {
                    self.alert = None;
                }
            }
            _ => {}
        }
    }

    pub fn on_mouse(&mut self, mouse: MouseEvent) {
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => self.input.pointer_down(),
            MouseEventKind::Up(MouseButton::Left) => self.input.pointer_up(),
            _ => {}
        }
    }

    /// Advance everything by one frame of `dt_ms` real time.
    pub fn on_tick(&mut self, dt_ms: f64) {
        self.input.poll_gamepad(self.gamepad.as_mut());
        let frame = self.input.sample(dt_ms);

        let running = self.session.phase() == Phase::Running && !self.session.is_paused();
        let report = match self.session.tick(dt_ms, &frame) {
            Ok(report) => report,
            // Already logged by the session; the screen shows it.
            Err(_) => return,
        };

        if running {
            if let Some(alert) = self.alert.as_mut() {
                alert.remaining_ms -= dt_ms.min(MAX_TICK_DT_MS);
            }
            self.alert = self.alert.filter(|a| a.remaining_ms > 0.0);
        }

        let fail = report.flight_events.iter().find_map(|e| match e {
            FlightEvent::Fail { cause, .. } => Some(*cause),
            FlightEvent::Resolved { .. } => None,
        });
        if let Some(cause) = fail {
            self.alert = Some(Alert {
                cause,
                remaining_ms: ALERT_FLASH_MS,
            });
        }

        if let Some(summary) = report.summary {
            self.alert = None;
            self.record(&summary);
        }
    }

    fn record(&mut self, summary: &SessionSummary) {
        let outcome = match &self.store {
            Some(store) => persist_summary(store, self.identity.as_deref(), summary),
            None if self.identity.is_none() => PersistOutcome::SkippedAnonymous,
            None => {
                tracing::warn!("session store unavailable, summary not persisted");
                PersistOutcome::Failed
            }
        };
        self.last_persist = Some(outcome);
        self.refresh_history();
    }

    fn refresh_history(&mut self) {
        let (Some(store), Some(player)) = (&self.store, self.identity.as_deref()) else {
            return;
        };
        match store.best_score(player) {
            Ok(best) => self.best_score = best,
            Err(e) => tracing::warn!("could not read personal best: {e}"),
        }
        match store.recent(Some(player), HISTORY_LEN) {
            Ok(sessions) => {
                self.history = sessions.iter().rev().map(|s| s.record.score).collect();
            }
            Err(e) => tracing::warn!("could not read session history: {e}"),
        }
    }
}

fn control_for(code: KeyCode) -> Option<Control> {
    match code {
        KeyCode::Left | KeyCode::Char('a') | KeyCode::Char('A') => Some(Control::Left),
        KeyCode::Right | KeyCode::Char('d') | KeyCode::Char('D') => Some(Control::Right),
        KeyCode::Char(' ') => Some(Control::Fire),
        _ => None,
    }
}

/// Log to a file in the state directory so output never lands on the TUI.
fn init_logging() {
    let Some(path) = AppDirs::log_path() else {
        return;
    };
    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };

    if let Err(e) = install_subscriber(file) {
        eprintln!("capacity: file logging disabled: {e}");
    }
}

fn install_subscriber(file: fs::File) -> Result<(), Box<dyn Error + Send + Sync>> {
    let filter =
        EnvFilter::try_from_env("CAPACITY_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging();

    if let Some(path) = &cli.export_history {
        let store = SessionStore::new()?;
        let rows = store.export_csv(path)?;
        println!("exported {rows} sessions to {}", path.display());
        return Ok(());
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let config_store = FileConfigStore::new();
    let config = cli.apply(config_store.load());
    if cli.save_config {
        if let Err(e) = config_store.save(&config) {
            tracing::warn!(path = %config_store.path().display(), "could not save config: {e}");
        }
    }

    let identity = cli.identity(&config);
    let store = if identity.is_some() {
        match SessionStore::new() {
            Ok(store) => Some(store),
            Err(e) => {
                tracing::warn!("session history unavailable: {e}");
                None
            }
        }
    } else {
        None
    };
    tracing::info!(player = ?identity, "capacity starting");

    let release_events = matches!(supports_keyboard_enhancement(), Ok(true));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    if release_events {
        execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        )?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(config, identity, store).with_release_events(release_events);
    let result = start_tui(&mut terminal, &mut app);

    if release_events {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)?;
    }
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    result
}

fn start_tui<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(CrosstermEventSource::new(), FixedTicker::frame());
    let mut last_tick = Instant::now();

    terminal.draw(|f| f.render_widget(&*app, f.area()))?;

    while !app.should_quit {
        match runner.step() {
            CapacityEvent::Tick => {
                let now = Instant::now();
                let dt_ms = now.duration_since(last_tick).as_secs_f64() * 1000.0;
                last_tick = now;

                app.on_tick(dt_ms);
                terminal.draw(|f| f.render_widget(&*app, f.area()))?;
            }
            CapacityEvent::Resize => {
                terminal.draw(|f| f.render_widget(&*app, f.area()))?;
            }
            CapacityEvent::Key(key) => app.on_key(key),
            CapacityEvent::Mouse(mouse) => app.on_mouse(mouse),
        }
    }

    tracing::info!("capacity exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use capacity::matching::TaskVariant;
    use crossterm::event::KeyEventState;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn release(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        }
    }

    fn mouse(kind: MouseEventKind) -> MouseEvent {
        MouseEvent {
            kind,
            column: 10,
            row: 5,
            modifiers: KeyModifiers::NONE,
        }
    }

    fn test_config() -> Config {
        Config {
            session_duration_ms: 2_000,
            task_change_interval_ms: 500,
            seed: Some(5),
            player: Some("pilot".to_string()),
            ..Config::default()
        }
    }

    fn test_app() -> App {
        App::new(
            test_config(),
            Some("pilot".to_string()),
            SessionStore::open_in_memory().ok(),
        )
    }

    fn skip_reference(app: &mut App) {
        app.on_key(key(KeyCode::Enter));
        while app.session.phase() == Phase::Reference {
            app.on_tick(100.0);
        }
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::parse_from(["capacity"]);
        assert_eq!(cli.duration_secs, None);
        assert_eq!(cli.seed, None);
        assert!(!cli.guest);
        assert!(cli.export_history.is_none());
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "capacity",
            "-d",
            "30",
            "-i",
            "1500",
            "--spawn-interval-ms",
            "900",
            "--scroll-speed",
            "0.5",
            "-g",
            "0.25",
            "--seed",
            "42",
        ]);
        let config = cli.apply(Config::default());
        assert_eq!(config.session_duration_ms, 30_000);
        assert_eq!(config.task_change_interval_ms, 1_500);
        assert_eq!(config.obstacle_spawn_interval_ms, 900);
        assert_eq!(config.obstacle_scroll_speed, 0.5);
        assert_eq!(config.gap_width_fraction, 0.25);
        assert_eq!(config.seed, Some(42));
    }

    #[test]
    fn test_cli_values_are_clamped() {
        let cli = Cli::parse_from(["capacity", "-i", "1"]);
        let config = cli.apply(Config::default());
        assert_eq!(
            config.task_change_interval_ms,
            capacity::config::TASK_CHANGE_INTERVAL_MS_RANGE.0
        );
    }

    #[test]
    fn test_cli_guest_has_no_identity() {
        let cli = Cli::parse_from(["capacity", "--guest"]);
        let config = cli.apply(test_config());
        assert_eq!(cli.identity(&config), None);

        let cli = Cli::parse_from(["capacity", "--player", "ace"]);
        let config = cli.apply(test_config());
        assert_eq!(cli.identity(&config).as_deref(), Some("ace"));
    }

    #[test]
    fn test_cli_guest_conflicts_with_player() {
        let res = Cli::try_parse_from(["capacity", "--guest", "--player", "ace"]);
        assert!(res.is_err());
    }

    #[test]
    fn test_cli_export_history_path() {
        let cli = Cli::parse_from(["capacity", "--export-history", "out.csv"]);
        assert_eq!(cli.export_history, Some(PathBuf::from("out.csv")));
    }

    #[test]
    fn test_enter_starts_and_esc_returns_to_menu() {
        let mut app = test_app();
        app.on_key(key(KeyCode::Enter));
        assert_eq!(app.session.phase(), Phase::Reference);

        app.on_key(key(KeyCode::Esc));
        assert_eq!(app.session.phase(), Phase::Menu);
        assert!(!app.should_quit);

        app.on_key(key(KeyCode::Esc));
        assert!(app.should_quit);
    }

    #[test]
    fn test_ctrl_c_quits_from_anywhere() {
        let mut app = test_app();
        skip_reference(&mut app);
        app.on_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit);
    }

    #[test]
    fn test_pause_key_toggles() {
        let mut app = test_app();
        skip_reference(&mut app);
        app.on_key(key(KeyCode::Char('p')));
        assert!(app.session.is_paused());
        app.on_key(key(KeyCode::Char('p')));
        assert!(!app.session.is_paused());
    }

    #[test]
    fn test_steering_keys_move_the_plane() {
        let mut app = test_app();
        skip_reference(&mut app);
        let start = app.session.snapshot().plane.lateral_fraction;

        app.on_key(key(KeyCode::Right));
        for _ in 0..5 {
            app.on_tick(50.0);
        }
        app.on_key(release(KeyCode::Right));
        let moved = app.session.snapshot().plane.lateral_fraction;
        assert!(moved > start);

        app.on_key(key(KeyCode::Char('a')));
        for _ in 0..5 {
            app.on_tick(50.0);
        }
        assert!(app.session.snapshot().plane.lateral_fraction < moved);
    }

    #[test]
    fn test_mouse_click_fires() {
        let mut app = test_app();
        skip_reference(&mut app);
        app.on_tick(10.0);

        app.on_mouse(mouse(MouseEventKind::Down(MouseButton::Left)));
        app.on_tick(10.0);
        app.on_mouse(mouse(MouseEventKind::Up(MouseButton::Left)));
        app.on_tick(10.0);

        let snap = app.session.snapshot();
        assert_eq!(snap.dice_stats.hits + snap.dice_stats.fails, 1);
    }

    #[test]
    fn test_flight_fail_raises_alert() {
        let mut app = App::new(
            Config {
                session_duration_ms: 10_000,
                obstacle_spawn_interval_ms: 200,
                ..test_config()
            },
            None,
            None,
        );
        skip_reference(&mut app);

        // Hugging the left margin never fits strictly between the posts.
        let mut saw_alert = false;
        for _ in 0..200 {
            app.on_key(key(KeyCode::Left));
            app.on_tick(25.0);
            if app.alert.is_some() {
                saw_alert = true;
                break;
            }
        }
        assert!(saw_alert);
        assert!(app.session.snapshot().flight_fails > 0);
    }

    #[test]
    fn test_alert_expires_after_flash() {
        let mut app = test_app();
        skip_reference(&mut app);
        app.alert = Some(Alert {
            cause: FailCause::Collision,
            remaining_ms: ALERT_FLASH_MS,
        });
        app.on_tick(ALERT_FLASH_MS / 2.0);
        assert!(app.alert.is_some());
        app.on_tick(ALERT_FLASH_MS);
        assert!(app.alert.is_none());
    }

    #[test]
    fn test_alert_is_frozen_while_paused() {
        let mut app = test_app();
        skip_reference(&mut app);
        app.alert = Some(Alert {
            cause: FailCause::MissedGate,
            remaining_ms: ALERT_FLASH_MS,
        });
        app.on_key(key(KeyCode::Char('p')));
        for _ in 0..10 {
            app.on_tick(100.0);
        }
        assert_eq!(app.alert.map(|a| a.remaining_ms), Some(ALERT_FLASH_MS));
    }

    #[test]
    fn test_finished_session_is_recorded() {
        let mut app = test_app();
        skip_reference(&mut app);
        while app.session.phase() == Phase::Running {
            app.on_tick(100.0);
        }
        assert_eq!(app.session.active_task(), TaskVariant::Rod);
        assert_eq!(app.last_persist, Some(PersistOutcome::Stored));
        assert_eq!(app.history.len(), 1);
        assert!(app.best_score.is_some());

        app.on_key(key(KeyCode::Char('r')));
        assert_eq!(app.session.phase(), Phase::Menu);
    }

    #[test]
    fn test_guest_session_is_not_recorded() {
        let mut app = App::new(test_config(), None, SessionStore::open_in_memory().ok());
        skip_reference(&mut app);
        while app.session.phase() == Phase::Running {
            app.on_tick(100.0);
        }
        assert_eq!(app.last_persist, Some(PersistOutcome::SkippedAnonymous));
        assert!(app.history.is_empty());
    }

    #[test]
    fn test_cancelled_session_is_not_recorded() {
        let mut app = test_app();
        skip_reference(&mut app);
        for _ in 0..5 {
            app.on_tick(100.0);
        }
        app.on_key(key(KeyCode::Esc));
        assert_eq!(app.last_persist, None);
        assert!(app.history.is_empty());
    }

    #[test]
    fn second_subscriber_install_is_reported() {
        let file = tempfile::tempfile().unwrap();
        let again = file.try_clone().unwrap();
        // The first install may win or lose; a second one must always fail loudly.
        let _ = install_subscriber(file);
        assert!(install_subscriber(again).is_err());
    }
}
