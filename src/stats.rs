use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::{PersistError, SessionError};
use crate::flight::FlightEvent;
use crate::matching::{MatchEvent, MatchEventKind, TaskStats, TaskVariant};

pub const GAME_TYPE: &str = "CAPACITY";

/// Final outcome of one completed session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub total_score: u32,
    pub duration_seconds: f64,
    pub flight_fails: u32,
    pub total_obstacles_encountered: u32,
    pub dice_stats: TaskStats,
    pub rod_stats: TaskStats,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub flight_fails: u32,
    pub total_obstacles: u32,
    pub dice_stats: TaskStats,
    pub rod_stats: TaskStats,
}

/// The shape handed to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub game_type: String,
    pub score: u32,
    pub duration_seconds: u64,
    pub metadata: RecordMetadata,
}

impl From<&SessionSummary> for SessionRecord {
    fn from(s: &SessionSummary) -> Self {
        Self {
            game_type: GAME_TYPE.to_string(),
            score: s.total_score,
            duration_seconds: s.duration_seconds.max(0.0).round() as u64,
            metadata: RecordMetadata {
                flight_fails: s.flight_fails,
                total_obstacles: s.total_obstacles_encountered,
                dice_stats: s.dice_stats,
                rod_stats: s.rod_stats,
            },
        }
    }
}

/// Accumulates counters from both engines over one session.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    flight_fails: u32,
    total_obstacles: u32,
    dice: TaskStats,
    rod: TaskStats,
    emitted: bool,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Zero one variant's counters when it is (re)activated.
    pub fn reset_variant(&mut self, variant: TaskVariant) {
        *self.stats_mut(variant) = TaskStats::default();
    }

    pub fn observe_flight(&mut self, event: &FlightEvent) {
        match event {
            FlightEvent::Fail { .. } => self.flight_fails += 1,
            FlightEvent::Resolved { .. } => self.total_obstacles += 1,
        }
    }

    pub fn observe_match(&mut self, event: &MatchEvent) {
        let stats = self.stats_mut(event.variant);
        match event.kind {
            MatchEventKind::Target => stats.targets += 1,
            MatchEventKind::Hit => stats.hits += 1,
            MatchEventKind::Fail => stats.fails += 1,
        }
    }

    pub fn flight_fails(&self) -> u32 {
        self.flight_fails
    }

    pub fn total_obstacles(&self) -> u32 {
        self.total_obstacles
    }

    pub fn task_stats(&self, variant: TaskVariant) -> TaskStats {
        match variant {
            TaskVariant::Dice => self.dice,
            TaskVariant::Rod => self.rod,
        }
    }

    pub fn score(&self) -> u32 {
        self.dice.hits + self.rod.hits
    }

    fn stats_mut(&mut self, variant: TaskVariant) -> &mut TaskStats {
        match variant {
            TaskVariant::Dice => &mut self.dice,
            TaskVariant::Rod => &mut self.rod,
        }
    }

    /// Produce the summary. Succeeds once per session.
    pub fn finish(
        &mut self,
        started_at: DateTime<Local>,
        finished_at: DateTime<Local>,
    ) -> Result<SessionSummary, SessionError> {
        if self.emitted {
            return Err(SessionError::SummaryAlreadyEmitted);
        }
        self.emitted = true;

        let duration_seconds =
            (finished_at - started_at).num_milliseconds().max(0) as f64 / 1000.0;
        Ok(SessionSummary {
            total_score: self.score(),
            duration_seconds,
            flight_fails: self.flight_fails,
            total_obstacles_encountered: self.total_obstacles,
            dice_stats: self.dice,
            rod_stats: self.rod,
            started_at,
            finished_at,
        })
    }
}

/// The external persistence collaborator.
pub trait SummarySink {
    fn persist(&self, identity: &str, record: &SessionRecord) -> Result<(), PersistError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Stored,
    SkippedAnonymous,
    Failed,
}

/// Hand a summary to the sink. Never fails: anonymous sessions are skipped
/// and sink errors are logged.
pub fn persist_summary(
    sink: &dyn SummarySink,
    identity: Option<&str>,
    summary: &SessionSummary,
) -> PersistOutcome {
    let Some(identity) = identity.filter(|id| !id.is_empty()) else {
        tracing::debug!("no identity, session summary not persisted");
        return PersistOutcome::SkippedAnonymous;
    };

    let record = SessionRecord::from(summary);
    match sink.persist(identity, &record) {
        Ok(()) => {
            tracing::info!(player = identity, score = record.score, "session summary stored");
            PersistOutcome::Stored
        }
        Err(e) => {
            tracing::warn!(player = identity, "failed to store session summary: {e}");
            PersistOutcome::Failed
        }
    }
}
