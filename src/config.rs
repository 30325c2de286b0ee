use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::flight::{PLANE_RADIUS, POST_RADIUS};

pub const LATERAL_SPEED_RANGE: (f64, f64) = (0.05, 5.0);
pub const SCROLL_SPEED_RANGE: (f64, f64) = (0.05, 3.0);
pub const SPAWN_INTERVAL_MS_RANGE: (u64, u64) = (200, 10_000);
pub const TASK_CHANGE_INTERVAL_MS_RANGE: (u64, u64) = (500, 10_000);
pub const SESSION_DURATION_MS_RANGE: (u64, u64) = (1_000, 60 * 60 * 1_000);
pub const EDGE_MARGIN_RANGE: (f64, f64) = (0.0, 0.3);
pub const MAX_PATH_SHIFT_RANGE: (f64, f64) = (0.0, 0.5);
/// Narrowest gate that still leaves room beside the plane's hitbox.
pub const MIN_GAP_WIDTH: f64 = 2.0 * (PLANE_RADIUS + POST_RADIUS) + 0.05;

/// Tunables for one exercise session. Speeds are play-field fractions per second.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub lateral_speed: f64,
    pub obstacle_scroll_speed: f64,
    pub obstacle_spawn_interval_ms: u64,
    pub gap_width_fraction: f64,
    pub task_change_interval_ms: u64,
    pub session_duration_ms: u64,
    pub max_path_shift: f64,
    pub edge_margin: f64,
    pub seed: Option<u64>,
    pub player: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lateral_speed: 0.6,
            obstacle_scroll_speed: 0.3,
            obstacle_spawn_interval_ms: 1_500,
            gap_width_fraction: 0.3,
            task_change_interval_ms: 2_000,
            session_duration_ms: 120_000,
            max_path_shift: 0.15,
            edge_margin: 0.05,
            seed: None,
            player: std::env::var("USER").ok().filter(|u| !u.is_empty()),
        }
    }
}

impl Config {
    /// Clamp every numeric field into its accepted range. Out-of-range values
    /// are logged and replaced, never rejected.
    pub fn sanitized(mut self) -> Self {
        self.lateral_speed = clamp_f64("lateral_speed", self.lateral_speed, LATERAL_SPEED_RANGE);
        self.obstacle_scroll_speed = clamp_f64(
            "obstacle_scroll_speed",
            self.obstacle_scroll_speed,
            SCROLL_SPEED_RANGE,
        );
        self.obstacle_spawn_interval_ms = clamp_u64(
            "obstacle_spawn_interval_ms",
            self.obstacle_spawn_interval_ms,
            SPAWN_INTERVAL_MS_RANGE,
        );
        self.task_change_interval_ms = clamp_u64(
            "task_change_interval_ms",
            self.task_change_interval_ms,
            TASK_CHANGE_INTERVAL_MS_RANGE,
        );
        self.session_duration_ms = clamp_u64(
            "session_duration_ms",
            self.session_duration_ms,
            SESSION_DURATION_MS_RANGE,
        );
        self.edge_margin = clamp_f64("edge_margin", self.edge_margin, EDGE_MARGIN_RANGE);
        self.max_path_shift = clamp_f64("max_path_shift", self.max_path_shift, MAX_PATH_SHIFT_RANGE);
        // The gate must fit between both margins.
        let max_gap = 1.0 - 2.0 * self.edge_margin;
        self.gap_width_fraction = clamp_f64(
            "gap_width_fraction",
            self.gap_width_fraction,
            (MIN_GAP_WIDTH.min(max_gap), max_gap),
        );
        self
    }

    pub fn half_duration_ms(&self) -> f64 {
        self.session_duration_ms as f64 / 2.0
    }
}

fn clamp_f64(name: &str, value: f64, (min, max): (f64, f64)) -> f64 {
    if !value.is_finite() {
        tracing::warn!(field = name, "non-finite setting, using {min}");
        return min;
    }
    let clamped = value.clamp(min, max);
    if clamped != value {
        tracing::warn!(field = name, "setting {value} outside [{min}, {max}], clamped to {clamped}");
    }
    clamped
}

fn clamp_u64(name: &str, value: u64, (min, max): (u64, u64)) -> u64 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        tracing::warn!(field = name, "setting {value} outside [{min}, {max}], clamped to {clamped}");
    }
    clamped
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "capacity") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("capacity_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => return cfg.sanitized(),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), "ignoring unreadable config: {e}")
                }
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).map_err(std::io::Error::other)?;
        fs::write(&self.path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config {
            lateral_speed: 0.9,
            obstacle_scroll_speed: 0.5,
            obstacle_spawn_interval_ms: 900,
            gap_width_fraction: 0.25,
            task_change_interval_ms: 1_500,
            session_duration_ms: 60_000,
            max_path_shift: 0.2,
            edge_margin: 0.1,
            seed: Some(42),
            player: Some("pilot".into()),
        };
        store.save(&cfg).unwrap();
        assert_eq!(cfg, store.load());
    }

    #[test]
    fn missing_file_yields_default() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("absent.json"));
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "session_duration_ms": 30000 }"#).unwrap();
        let loaded = FileConfigStore::with_path(&path).load();
        assert_eq!(loaded.session_duration_ms, 30_000);
        assert_eq!(loaded.task_change_interval_ms, 2_000);
    }

    #[test]
    fn sanitized_clamps_out_of_range_values() {
        let cfg = Config {
            lateral_speed: -1.0,
            obstacle_scroll_speed: 100.0,
            obstacle_spawn_interval_ms: 1,
            task_change_interval_ms: 1_000_000,
            session_duration_ms: 0,
            edge_margin: 0.9,
            max_path_shift: f64::NAN,
            gap_width_fraction: 0.95,
            ..Config::default()
        }
        .sanitized();

        assert_eq!(cfg.lateral_speed, LATERAL_SPEED_RANGE.0);
        assert_eq!(cfg.obstacle_scroll_speed, SCROLL_SPEED_RANGE.1);
        assert_eq!(cfg.obstacle_spawn_interval_ms, SPAWN_INTERVAL_MS_RANGE.0);
        assert_eq!(cfg.task_change_interval_ms, TASK_CHANGE_INTERVAL_MS_RANGE.1);
        assert_eq!(cfg.session_duration_ms, SESSION_DURATION_MS_RANGE.0);
        assert_eq!(cfg.edge_margin, EDGE_MARGIN_RANGE.1);
        assert_eq!(cfg.max_path_shift, MAX_PATH_SHIFT_RANGE.0);
        assert!((cfg.gap_width_fraction - 0.4).abs() < 1e-12);
    }

    #[test]
    fn narrowest_gap_clears_the_hitbox() {
        assert!(MIN_GAP_WIDTH > 2.0 * (PLANE_RADIUS + POST_RADIUS));
        let cfg = Config {
            gap_width_fraction: 0.1,
            ..Config::default()
        }
        .sanitized();
        assert_eq!(cfg.gap_width_fraction, MIN_GAP_WIDTH);
    }

    #[test]
    fn sanitized_keeps_valid_values() {
        let cfg = Config::default();
        assert_eq!(cfg.clone().sanitized(), cfg);
    }
}
