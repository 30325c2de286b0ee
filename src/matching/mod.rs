//! Discrete perceptual matching task.
//!
//! [`MatchEngine`] owns the trial cadence, scoring and counters; a
//! [`TrialGenerator`] only decides what the next stimulus pair looks like.

pub mod dice;
pub mod rod;

use std::fmt::Debug;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

pub use dice::DiceGenerator;
pub use rod::{RodFigure, RodGenerator};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
pub enum TaskVariant {
    Dice,
    Rod,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub hits: u32,
    pub targets: u32,
    pub fails: u32,
}

/// One comparison. `resolved` flips once, on the first fire or on expiry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchTrial<T> {
    pub reference_value: T,
    pub current_value: T,
    pub is_target: bool,
    pub resolved: bool,
}

impl<T: PartialEq> MatchTrial<T> {
    pub fn new(reference_value: T, current_value: T) -> Self {
        let is_target = reference_value == current_value;
        Self {
            reference_value,
            current_value,
            is_target,
            resolved: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchEventKind {
    /// A trial with equal values was generated, whether or not anyone fires.
    Target,
    Hit,
    Fail,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchEvent {
    pub variant: TaskVariant,
    pub kind: MatchEventKind,
}

pub trait TrialGenerator {
    type Value: Clone + PartialEq + Debug;
    const VARIANT: TaskVariant;

    /// Reset per-activation state, e.g. pick a new reference value.
    fn activate(&mut self, rng: &mut StdRng);

    fn next_trial(&mut self, rng: &mut StdRng) -> MatchTrial<Self::Value>;
}

#[derive(Debug)]
pub struct MatchEngine<G: TrialGenerator> {
    generator: G,
    interval_ms: f64,
    until_next_ms: f64,
    trial: Option<MatchTrial<G::Value>>,
    stats: TaskStats,
    active: bool,
    rng: StdRng,
}

impl<G: TrialGenerator> MatchEngine<G> {
    pub fn new(generator: G, interval_ms: u64, rng: StdRng) -> Self {
        Self {
            generator,
            interval_ms: interval_ms as f64,
            until_next_ms: 0.0,
            trial: None,
            stats: TaskStats::default(),
            active: false,
            rng,
        }
    }

    pub fn variant(&self) -> TaskVariant {
        G::VARIANT
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn stats(&self) -> TaskStats {
        self.stats
    }

    pub fn trial(&self) -> Option<&MatchTrial<G::Value>> {
        self.trial.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Fraction of the current trial's window already elapsed, in [0, 1].
    pub fn trial_progress(&self) -> f64 {
        if self.trial.is_none() || self.interval_ms <= 0.0 {
            return 0.0;
        }
        (1.0 - self.until_next_ms / self.interval_ms).clamp(0.0, 1.0)
    }

    /// Start this variant: zero the counters and arm an immediate first trial.
    pub fn activate(&mut self) {
        self.generator.activate(&mut self.rng);
        self.stats = TaskStats::default();
        self.trial = None;
        self.until_next_ms = 0.0;
        self.active = true;
    }

    pub fn deactivate(&mut self) {
        if let Some(trial) = self.trial.as_mut() {
            trial.resolved = true;
        }
        self.active = false;
    }

    /// Advance the cadence and score a fire edge against the live trial.
    pub fn tick(&mut self, dt_ms: f64, fire_pressed: bool) -> Vec<MatchEvent> {
        let mut events = Vec::new();
        if !self.active {
            return events;
        }

        self.until_next_ms -= dt_ms.max(0.0);
        if self.trial.is_none() || self.until_next_ms <= 0.0 {
            if let Some(expired) = self.trial.as_mut() {
                expired.resolved = true;
            }
            let trial = self.generator.next_trial(&mut self.rng);
            if trial.is_target {
                self.stats.targets += 1;
                events.push(self.event(MatchEventKind::Target));
            }
            self.trial = Some(trial);
            self.until_next_ms += self.interval_ms;
            if self.until_next_ms <= 0.0 {
                self.until_next_ms = self.interval_ms;
            }
        }

        if fire_pressed {
            if let Some(kind) = self.score_fire() {
                events.push(self.event(kind));
            }
        }
        events
    }

    /// Score the first fire on a live trial; later fires are ignored.
    fn score_fire(&mut self) -> Option<MatchEventKind> {
        let trial = self.trial.as_mut().filter(|t| !t.resolved)?;
        trial.resolved = true;
        if trial.current_value == trial.reference_value {
            self.stats.hits += 1;
            Some(MatchEventKind::Hit)
        } else {
            self.stats.fails += 1;
            Some(MatchEventKind::Fail)
        }
    }

    fn event(&self, kind: MatchEventKind) -> MatchEvent {
        MatchEvent {
            variant: G::VARIANT,
            kind,
        }
    }
}
