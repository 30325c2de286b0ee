//! Obstacle-avoidance flight task.
//!
//! The play field is the unit square: x is the lateral fraction, y grows
//! downward. The plane sits on the fixed line `y = PLANE_Y` and only moves
//! laterally; obstacles spawn above the field and scroll down through it.

use rand::rngs::StdRng;
use rand::Rng;

use crate::config::Config;
use crate::error::SessionError;

pub const PLANE_Y: f64 = 0.8;
pub const PLANE_RADIUS: f64 = 0.03;
pub const POST_RADIUS: f64 = 0.02;
pub const SPAWN_Y: f64 = -0.05;
pub const DESPAWN_Y: f64 = 1.05;
const GAP_TOLERANCE: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneState {
    pub lateral_fraction: f64,
}

/// Two gate posts the plane must fly between.
#[derive(Clone, Debug, PartialEq)]
pub struct Obstacle {
    pub id: u64,
    pub vertical_position: f64,
    pub left_gate_fraction: f64,
    pub right_gate_fraction: f64,
    pub passed: bool,
    pub hit: bool,
    pub counted: bool,
}

impl Obstacle {
    pub fn gap_width(&self) -> f64 {
        self.right_gate_fraction - self.left_gate_fraction
    }

    pub fn is_resolved(&self) -> bool {
        self.passed || self.hit
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailCause {
    Collision,
    MissedGate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateOutcome {
    Passed,
    Failed(FailCause),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlightEvent {
    Fail { obstacle_id: u64, cause: FailCause },
    /// Emitted exactly once per obstacle, on its first pass or fail.
    Resolved { obstacle_id: u64, outcome: GateOutcome },
}

/// Running totals, kept by the engine itself for cross-checking.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlightTally {
    pub spawned: u64,
    pub passes: u64,
    pub fails: u64,
    pub resolved: u64,
}

#[derive(Clone, Copy, Debug)]
struct FlightParams {
    lateral_speed: f64,
    scroll_speed: f64,
    spawn_interval_ms: f64,
    gap_width: f64,
    max_path_shift: f64,
    edge_margin: f64,
}

impl From<&Config> for FlightParams {
    fn from(cfg: &Config) -> Self {
        Self {
            lateral_speed: cfg.lateral_speed,
            scroll_speed: cfg.obstacle_scroll_speed,
            spawn_interval_ms: cfg.obstacle_spawn_interval_ms as f64,
            gap_width: cfg.gap_width_fraction,
            max_path_shift: cfg.max_path_shift,
            edge_margin: cfg.edge_margin,
        }
    }
}

#[derive(Debug)]
pub struct FlightEngine {
    params: FlightParams,
    plane: PlaneState,
    obstacles: Vec<Obstacle>,
    path_center: f64,
    since_spawn_ms: f64,
    next_id: u64,
    tally: FlightTally,
    rng: StdRng,
}

impl FlightEngine {
    pub fn new(config: &Config, rng: StdRng) -> Self {
        Self {
            params: FlightParams::from(config),
            plane: PlaneState {
                lateral_fraction: 0.5,
            },
            obstacles: Vec::new(),
            path_center: 0.5,
            since_spawn_ms: 0.0,
            next_id: 0,
            tally: FlightTally::default(),
            rng,
        }
    }

    pub fn plane(&self) -> PlaneState {
        self.plane
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn tally(&self) -> FlightTally {
        self.tally
    }

    pub fn path_center(&self) -> f64 {
        self.path_center
    }

    fn plane_bounds(&self) -> (f64, f64) {
        (self.params.edge_margin, 1.0 - self.params.edge_margin)
    }

    /// Move the plane directly, clamped to the margins. For scripted starts.
    pub fn place_plane(&mut self, lateral_fraction: f64) {
        let (min, max) = self.plane_bounds();
        self.plane.lateral_fraction = lateral_fraction.clamp(min, max);
    }

    /// Insert a hand-built obstacle. Returns its id.
    pub fn place_obstacle(&mut self, left: f64, right: f64, vertical_position: f64) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.tally.spawned += 1;
        self.obstacles.push(Obstacle {
            id,
            vertical_position,
            left_gate_fraction: left,
            right_gate_fraction: right,
            passed: false,
            hit: false,
            counted: false,
        });
        id
    }

    /// Advance plane and obstacles by `dt_ms` with the given lateral axis in [-1, 1].
    pub fn tick(&mut self, dt_ms: f64, axis: f64) -> Result<Vec<FlightEvent>, SessionError> {
        if !dt_ms.is_finite() {
            return Err(SessionError::NonFiniteDelta);
        }
        if dt_ms < 0.0 {
            return Err(SessionError::NegativeDelta { dt_ms });
        }
        let dt_s = dt_ms / 1000.0;
        let mut events = Vec::new();

        let axis = if axis.is_finite() { axis.clamp(-1.0, 1.0) } else { 0.0 };
        self.place_plane(self.plane.lateral_fraction + axis * self.params.lateral_speed * dt_s);

        self.since_spawn_ms += dt_ms;
        if self.since_spawn_ms >= self.params.spawn_interval_ms {
            // One spawn per tick; leftover time never exceeds one interval.
            self.since_spawn_ms =
                (self.since_spawn_ms - self.params.spawn_interval_ms).min(self.params.spawn_interval_ms);
            self.spawn();
        }

        let plane_x = self.plane.lateral_fraction;
        let hit_dist_sq = (PLANE_RADIUS + POST_RADIUS).powi(2);
        let scroll = self.params.scroll_speed * dt_s;

        for obstacle in &mut self.obstacles {
            let prev_y = obstacle.vertical_position;
            obstacle.vertical_position += scroll;
            if obstacle.is_resolved() {
                continue;
            }

            // Closest approach over the whole step, so fast posts cannot tunnel.
            let (from, to) = if prev_y <= obstacle.vertical_position {
                (prev_y, obstacle.vertical_position)
            } else {
                (obstacle.vertical_position, prev_y)
            };
            let dy_sq = (PLANE_Y.clamp(from, to) - PLANE_Y).powi(2);
            let touches = |post: f64| (post - plane_x).powi(2) + dy_sq <= hit_dist_sq;
            let outcome = if touches(obstacle.left_gate_fraction)
                || touches(obstacle.right_gate_fraction)
            {
                Some(GateOutcome::Failed(FailCause::Collision))
            } else if prev_y < PLANE_Y && obstacle.vertical_position >= PLANE_Y {
                if obstacle.left_gate_fraction < plane_x && plane_x < obstacle.right_gate_fraction {
                    Some(GateOutcome::Passed)
                } else {
                    Some(GateOutcome::Failed(FailCause::MissedGate))
                }
            } else {
                None
            };

            if let Some(outcome) = outcome {
                resolve(obstacle, outcome, &mut self.tally, &mut events)?;
            }
        }

        self.obstacles.retain(|o| o.vertical_position <= DESPAWN_Y);
        Ok(events)
    }

    fn spawn(&mut self) {
        let gap = self.params.gap_width;
        let half = gap / 2.0;
        let lo = self.params.edge_margin + half;
        let hi = 1.0 - self.params.edge_margin - half;

        let shift = if self.params.max_path_shift > 0.0 {
            self.rng
                .gen_range(-self.params.max_path_shift..=self.params.max_path_shift)
        } else {
            0.0
        };
        self.path_center = if lo < hi {
            (self.path_center + shift).clamp(lo, hi)
        } else {
            0.5
        };

        let left = (self.path_center - half).max(0.0);
        let right = left + gap;
        debug_assert!((right - left - gap).abs() <= GAP_TOLERANCE);

        let id = self.place_obstacle(left, right, SPAWN_Y);
        tracing::trace!(obstacle_id = id, left, right, "spawned obstacle");
    }
}

fn resolve(
    obstacle: &mut Obstacle,
    outcome: GateOutcome,
    tally: &mut FlightTally,
    events: &mut Vec<FlightEvent>,
) -> Result<(), SessionError> {
    if obstacle.counted {
        return Err(SessionError::ObstacleResolvedTwice {
            obstacle_id: obstacle.id,
        });
    }
    obstacle.counted = true;
    tally.resolved += 1;

    match outcome {
        GateOutcome::Passed => {
            obstacle.passed = true;
            tally.passes += 1;
        }
        GateOutcome::Failed(cause) => {
            obstacle.hit = true;
            tally.fails += 1;
            events.push(FlightEvent::Fail {
                obstacle_id: obstacle.id,
                cause,
            });
        }
    }
    events.push(FlightEvent::Resolved {
        obstacle_id: obstacle.id,
        outcome,
    });
    Ok(())
}
