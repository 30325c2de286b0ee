//! Session phase machine driving both engines from one tick.

use chrono::{DateTime, Local};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::Config;
use crate::error::SessionError;
use crate::flight::{FlightEngine, FlightEvent, Obstacle, PlaneState};
use crate::input::InputFrame;
use crate::matching::{
    DiceGenerator, MatchEngine, MatchEvent, RodFigure, RodGenerator, TaskStats, TaskVariant,
};
use crate::stats::{SessionSummary, StatsAggregator};

/// Non-interactive window that shows the dice reference before play starts.
pub const REFERENCE_WINDOW_MS: f64 = 2_000.0;
/// Longest real frame delta applied in one tick; anything longer is a hitch.
pub const MAX_TICK_DT_MS: f64 = 250.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum Phase {
    Menu,
    Reference,
    Running,
    Finished,
}

/// Wall-clock source used for summary timestamps.
pub trait Clock {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

impl<C: Clock> Clock for std::rc::Rc<C> {
    fn now(&self) -> DateTime<Local> {
        (**self).now()
    }
}

/// What the matching panel should show.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StimulusView {
    None,
    DiceReference(u8),
    Dice {
        reference: u8,
        current: u8,
        resolved: bool,
    },
    Rod {
        top: RodFigure,
        bottom: RodFigure,
        resolved: bool,
    },
}

/// Read-only view handed to the renderer once per tick.
#[derive(Clone, Debug)]
pub struct SessionSnapshot<'a> {
    pub phase: Phase,
    pub paused: bool,
    pub active_task: TaskVariant,
    pub remaining_ms: f64,
    pub duration_ms: f64,
    pub reference_remaining_ms: f64,
    pub plane: PlaneState,
    pub obstacles: &'a [Obstacle],
    pub stimulus: StimulusView,
    pub trial_progress: f64,
    pub flight_fails: u32,
    pub total_obstacles: u32,
    pub dice_stats: TaskStats,
    pub rod_stats: TaskStats,
}

/// Everything that happened during one tick.
#[derive(Debug, Default)]
pub struct TickReport {
    pub flight_events: Vec<FlightEvent>,
    pub match_events: Vec<MatchEvent>,
    pub entered: Option<Phase>,
    pub switched_to: Option<TaskVariant>,
    pub summary: Option<SessionSummary>,
}

impl TickReport {
    pub fn flight_fail(&self) -> bool {
        self.flight_events
            .iter()
            .any(|e| matches!(e, FlightEvent::Fail { .. }))
    }
}

#[derive(Debug)]
struct Engines {
    flight: FlightEngine,
    dice: MatchEngine<DiceGenerator>,
    rod: MatchEngine<RodGenerator>,
}

impl Engines {
    fn build(config: &Config, rng: &mut StdRng) -> Self {
        let interval = config.task_change_interval_ms;
        Self {
            flight: FlightEngine::new(config, StdRng::seed_from_u64(rng.gen())),
            dice: MatchEngine::new(
                DiceGenerator::default(),
                interval,
                StdRng::seed_from_u64(rng.gen()),
            ),
            rod: MatchEngine::new(RodGenerator, interval, StdRng::seed_from_u64(rng.gen())),
        }
    }
}

#[derive(Debug)]
pub struct Session<C: Clock = SystemClock> {
    config: Config,
    clock: C,
    phase: Phase,
    active_task: TaskVariant,
    remaining_ms: f64,
    reference_remaining_ms: f64,
    paused: bool,
    resume_pending: bool,
    switched: bool,
    started_at: Option<DateTime<Local>>,
    engines: Engines,
    aggregator: StatsAggregator,
    rng: StdRng,
    halted: Option<SessionError>,
    last_summary: Option<SessionSummary>,
}

impl Session<SystemClock> {
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> Session<C> {
    pub fn with_clock(config: Config, clock: C) -> Self {
        let config = config.sanitized();
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let engines = Engines::build(&config, &mut rng);
        Self {
            remaining_ms: config.session_duration_ms as f64,
            config,
            clock,
            phase: Phase::Menu,
            active_task: TaskVariant::Dice,
            reference_remaining_ms: REFERENCE_WINDOW_MS,
            paused: false,
            resume_pending: false,
            switched: false,
            started_at: None,
            engines,
            aggregator: StatsAggregator::new(),
            rng,
            halted: None,
            last_summary: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn active_task(&self) -> TaskVariant {
        self.active_task
    }

    pub fn remaining_ms(&self) -> f64 {
        self.remaining_ms
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn halted(&self) -> Option<&SessionError> {
        self.halted.as_ref()
    }

    pub fn last_summary(&self) -> Option<&SessionSummary> {
        self.last_summary.as_ref()
    }

    pub fn aggregator(&self) -> &StatsAggregator {
        &self.aggregator
    }

    pub fn flight(&self) -> &FlightEngine {
        &self.engines.flight
    }

    /// Replace the configuration. Only accepted in the menu.
    pub fn reconfigure(&mut self, config: Config) -> bool {
        if self.phase != Phase::Menu {
            return false;
        }
        self.config = config.sanitized();
        self.remaining_ms = self.config.session_duration_ms as f64;
        self.engines = Engines::build(&self.config, &mut self.rng);
        true
    }

    /// Menu -> Reference.
    pub fn start(&mut self) -> bool {
        if self.phase != Phase::Menu {
            return false;
        }
        self.aggregator.reset();
        self.engines = Engines::build(&self.config, &mut self.rng);
        self.engines.dice.activate();
        self.aggregator.reset_variant(TaskVariant::Dice);

        self.active_task = TaskVariant::Dice;
        self.remaining_ms = self.config.session_duration_ms as f64;
        self.reference_remaining_ms = REFERENCE_WINDOW_MS;
        self.paused = false;
        self.resume_pending = false;
        self.switched = false;
        self.halted = None;
        self.started_at = Some(self.clock.now());
        self.phase = Phase::Reference;

        tracing::info!(
            duration_ms = self.config.session_duration_ms,
            reference = ?self.engines.dice.generator().reference(),
            "session started"
        );
        true
    }

    /// Finished -> Menu. Never automatic.
    pub fn restart(&mut self) -> bool {
        if self.phase != Phase::Finished {
            return false;
        }
        self.reset_to_menu();
        true
    }

    /// Abandon whatever is in flight and return to the menu without a summary.
    pub fn exit_to_menu(&mut self) {
        if matches!(self.phase, Phase::Reference | Phase::Running) {
            tracing::info!(remaining_ms = self.remaining_ms, "session cancelled");
        }
        self.reset_to_menu();
    }

    fn reset_to_menu(&mut self) {
        self.engines = Engines::build(&self.config, &mut self.rng);
        self.aggregator.reset();
        self.phase = Phase::Menu;
        self.active_task = TaskVariant::Dice;
        self.remaining_ms = self.config.session_duration_ms as f64;
        self.reference_remaining_ms = REFERENCE_WINDOW_MS;
        self.paused = false;
        self.resume_pending = false;
        self.switched = false;
        self.started_at = None;
        self.halted = None;
    }

    pub fn pause(&mut self) -> bool {
        if self.phase != Phase::Running || self.paused {
            return false;
        }
        self.paused = true;
        tracing::debug!(remaining_ms = self.remaining_ms, "paused");
        true
    }

    pub fn resume(&mut self) -> bool {
        if !self.paused {
            return false;
        }
        self.paused = false;
        self.resume_pending = true;
        tracing::debug!(remaining_ms = self.remaining_ms, "resumed");
        true
    }

    pub fn toggle_pause(&mut self) -> bool {
        if self.paused {
            self.resume()
        } else {
            self.pause()
        }
    }

    /// Advance by `dt_ms` of real time with this tick's fused input.
    pub fn tick(&mut self, dt_ms: f64, input: &InputFrame) -> Result<TickReport, SessionError> {
        if let Some(err) = &self.halted {
            return Err(err.clone());
        }
        if !dt_ms.is_finite() {
            return Err(self.halt(SessionError::NonFiniteDelta));
        }
        if dt_ms < 0.0 {
            return Err(self.halt(SessionError::NegativeDelta { dt_ms }));
        }

        let mut report = TickReport::default();
        match self.phase {
            Phase::Menu | Phase::Finished => {}
            Phase::Reference => {
                self.reference_remaining_ms -= dt_ms.min(MAX_TICK_DT_MS);
                if self.reference_remaining_ms <= 0.0 {
                    self.reference_remaining_ms = 0.0;
                    self.phase = Phase::Running;
                    report.entered = Some(Phase::Running);
                    tracing::info!("reference window closed, running");
                }
            }
            Phase::Running => {
                if let Err(err) = self.tick_running(dt_ms, input, &mut report) {
                    return Err(self.halt(err));
                }
            }
        }
        Ok(report)
    }

    fn tick_running(
        &mut self,
        dt_ms: f64,
        input: &InputFrame,
        report: &mut TickReport,
    ) -> Result<(), SessionError> {
        if self.paused {
            return Ok(());
        }
        let dt_ms = if self.resume_pending {
            self.resume_pending = false;
            0.0
        } else {
            dt_ms.min(MAX_TICK_DT_MS)
        };

        self.remaining_ms = (self.remaining_ms - dt_ms).max(0.0);

        if !self.switched && self.remaining_ms <= self.config.half_duration_ms() {
            self.switch_to_rod();
            report.switched_to = Some(TaskVariant::Rod);
        }

        for event in self.engines.flight.tick(dt_ms, input.axis)? {
            self.aggregator.observe_flight(&event);
            report.flight_events.push(event);
        }

        let match_events = match self.active_task {
            TaskVariant::Dice => self.engines.dice.tick(dt_ms, input.fire_pressed),
            TaskVariant::Rod => self.engines.rod.tick(dt_ms, input.fire_pressed),
        };
        for event in match_events {
            self.aggregator.observe_match(&event);
            report.match_events.push(event);
        }

        if self.remaining_ms <= 0.0 {
            report.summary = Some(self.finish()?);
            report.entered = Some(Phase::Finished);
        }
        Ok(())
    }

    fn switch_to_rod(&mut self) {
        self.engines.dice.deactivate();
        self.engines.rod.activate();
        self.aggregator.reset_variant(TaskVariant::Rod);
        self.active_task = TaskVariant::Rod;
        self.switched = true;
        tracing::debug!(remaining_ms = self.remaining_ms, "switched to rod task");
    }

    fn finish(&mut self) -> Result<SessionSummary, SessionError> {
        self.phase = Phase::Finished;

        for (variant, engine_stats) in [
            (TaskVariant::Dice, self.engines.dice.stats()),
            (TaskVariant::Rod, self.engines.rod.stats()),
        ] {
            if self.aggregator.task_stats(variant) != engine_stats {
                return Err(SessionError::StatsDiverged { variant });
            }
        }

        let finished_at = self.clock.now();
        let started_at = self.started_at.unwrap_or(finished_at);
        let summary = self.aggregator.finish(started_at, finished_at)?;
        tracing::info!(
            score = summary.total_score,
            flight_fails = summary.flight_fails,
            obstacles = summary.total_obstacles_encountered,
            duration_s = summary.duration_seconds,
            "session finished"
        );
        self.last_summary = Some(summary.clone());
        Ok(summary)
    }

    fn halt(&mut self, err: SessionError) -> SessionError {
        tracing::error!(phase = %self.phase, "session halted: {err}");
        self.halted = Some(err.clone());
        err
    }

    pub fn snapshot(&self) -> SessionSnapshot<'_> {
        SessionSnapshot {
            phase: self.phase,
            paused: self.paused,
            active_task: self.active_task,
            remaining_ms: self.remaining_ms,
            duration_ms: self.config.session_duration_ms as f64,
            reference_remaining_ms: self.reference_remaining_ms,
            plane: self.engines.flight.plane(),
            obstacles: self.engines.flight.obstacles(),
            stimulus: self.stimulus(),
            trial_progress: match self.active_task {
                TaskVariant::Dice => self.engines.dice.trial_progress(),
                TaskVariant::Rod => self.engines.rod.trial_progress(),
            },
            flight_fails: self.aggregator.flight_fails(),
            total_obstacles: self.aggregator.total_obstacles(),
            dice_stats: self.aggregator.task_stats(TaskVariant::Dice),
            rod_stats: self.aggregator.task_stats(TaskVariant::Rod),
        }
    }

    fn stimulus(&self) -> StimulusView {
        match (self.phase, self.active_task) {
            (Phase::Menu, _) => StimulusView::None,
            (Phase::Reference, _) => self
                .engines
                .dice
                .generator()
                .reference()
                .map_or(StimulusView::None, StimulusView::DiceReference),
            (_, TaskVariant::Dice) => {
                self.engines
                    .dice
                    .trial()
                    .map_or(StimulusView::None, |t| StimulusView::Dice {
                        reference: t.reference_value,
                        current: t.current_value,
                        resolved: t.resolved,
                    })
            }
            (_, TaskVariant::Rod) => {
                self.engines
                    .rod
                    .trial()
                    .map_or(StimulusView::None, |t| StimulusView::Rod {
                        top: t.reference_value,
                        bottom: t.current_value,
                        resolved: t.resolved,
                    })
            }
        }
    }
}
