use std::fmt;

use crate::matching::TaskVariant;

/// Conditions that make further simulation meaningless because the
/// counters it would report can no longer be trusted.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionError {
    NegativeDelta { dt_ms: f64 },
    NonFiniteDelta,
    ObstacleResolvedTwice { obstacle_id: u64 },
    StatsDiverged { variant: TaskVariant },
    SummaryAlreadyEmitted,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NegativeDelta { dt_ms } => write!(f, "negative tick delta: {dt_ms} ms"),
            Self::NonFiniteDelta => write!(f, "non-finite tick delta"),
            Self::ObstacleResolvedTwice { obstacle_id } => {
                write!(f, "obstacle {obstacle_id} resolved twice")
            }
            Self::StatsDiverged { variant } => {
                write!(f, "{variant} statistics diverged from engine counters")
            }
            Self::SummaryAlreadyEmitted => write!(f, "session summary emitted twice"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Failures of the persistence collaborator. Never fatal to a session.
#[derive(Debug)]
pub enum PersistError {
    Database(rusqlite::Error),
    Encode(serde_json::Error),
    Csv(csv::Error),
    Io(std::io::Error),
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database(e) => write!(f, "database error: {e}"),
            Self::Encode(e) => write!(f, "metadata encoding error: {e}"),
            Self::Csv(e) => write!(f, "csv export error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for PersistError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Database(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Csv(e) => Some(e),
            Self::Io(e) => Some(e),
        }
    }
}

impl From<rusqlite::Error> for PersistError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e)
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(e: serde_json::Error) -> Self {
        Self::Encode(e)
    }
}

impl From<csv::Error> for PersistError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}

impl From<std::io::Error> for PersistError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
