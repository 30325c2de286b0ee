use chrono::{DateTime, Local};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;
use crate::error::PersistError;
use crate::stats::{RecordMetadata, SessionRecord, SummarySink};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        player TEXT NOT NULL,
        game_type TEXT NOT NULL,
        score INTEGER NOT NULL,
        duration_seconds INTEGER NOT NULL,
        metadata TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_sessions_player ON sessions(player);
    CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions(created_at);
"#;

/// A persisted session row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub id: i64,
    pub player: String,
    pub created_at: DateTime<Local>,
    pub record: SessionRecord,
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    date: String,
    player: &'a str,
    score: u32,
    duration_seconds: u64,
    flight_fails: u32,
    total_obstacles: u32,
    dice_hits: u32,
    dice_targets: u32,
    dice_fails: u32,
    rod_hits: u32,
    rod_targets: u32,
    rod_fails: u32,
}

impl<'a> From<&'a StoredSession> for CsvRow<'a> {
    fn from(s: &'a StoredSession) -> Self {
        let m = &s.record.metadata;
        Self {
            date: s.created_at.to_rfc3339(),
            player: &s.player,
            score: s.record.score,
            duration_seconds: s.record.duration_seconds,
            flight_fails: m.flight_fails,
            total_obstacles: m.total_obstacles,
            dice_hits: m.dice_stats.hits,
            dice_targets: m.dice_stats.targets,
            dice_fails: m.dice_stats.fails,
            rod_hits: m.rod_stats.hits,
            rod_targets: m.rod_stats.targets,
            rod_fails: m.rod_stats.fails,
        }
    }
}

/// SQLite-backed session history.
#[derive(Debug)]
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    /// Open the store at the default state location.
    pub fn new() -> Result<Self, PersistError> {
        let path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("capacity_sessions.db"));
        Self::open(path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, PersistError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, PersistError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn record(&self, player: &str, record: &SessionRecord) -> Result<i64, PersistError> {
        let metadata = serde_json::to_string(&record.metadata)?;
        self.conn.execute(
            r#"
            INSERT INTO sessions
            (player, game_type, score, duration_seconds, metadata, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                player,
                record.game_type,
                record.score,
                record.duration_seconds as i64,
                metadata,
                Local::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent sessions first. `player` of `None` lists everyone.
    pub fn recent(&self, player: Option<&str>, limit: usize) -> Result<Vec<StoredSession>, PersistError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, player, game_type, score, duration_seconds, metadata, created_at
            FROM sessions
            WHERE (?1 IS NULL OR player = ?1)
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![player, limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (id, player, game_type, score, duration, metadata, created_at) = row?;
            let metadata: RecordMetadata = serde_json::from_str(&metadata)?;
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map_err(|_| {
                    rusqlite::Error::InvalidColumnType(
                        6,
                        "created_at".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })?
                .with_timezone(&Local);
            sessions.push(StoredSession {
                id,
                player,
                created_at,
                record: SessionRecord {
                    game_type,
                    score,
                    duration_seconds: duration.max(0) as u64,
                    metadata,
                },
            });
        }
        Ok(sessions)
    }

    pub fn best_score(&self, player: &str) -> Result<Option<u32>, PersistError> {
        let best: Option<u32> = self.conn.query_row(
            "SELECT MAX(score) FROM sessions WHERE player = ?1",
            [player],
            |row| row.get(0),
        )?;
        Ok(best)
    }

    pub fn session_count(&self) -> Result<u64, PersistError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Write the whole history, oldest first, as CSV.
    pub fn export_csv<P: AsRef<Path>>(&self, path: P) -> Result<usize, PersistError> {
        let mut sessions = self.recent(None, usize::MAX)?;
        sessions.reverse();

        let mut writer = csv::Writer::from_path(path)?;
        for session in &sessions {
            writer.serialize(CsvRow::from(session))?;
        }
        writer.flush()?;
        Ok(sessions.len())
    }
}

impl SummarySink for SessionStore {
    fn persist(&self, identity: &str, record: &SessionRecord) -> Result<(), PersistError> {
        self.record(identity, record).map(|_| ())
    }
}
