use std::str::FromStr;
use std::time::Duration;

use crate::flock::constants::{avoidance, sim, spawn, speed, weights};
use crate::flock::directions::CandidateDirections;
use crate::flock::systems::update_loop::AvoidanceFailurePolicy;

/// Invalid flock or simulation configuration, detected before the first frame
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be positive and finite, got {value}")]
    NonPositive { field: &'static str, value: f32 },
    #[error("speed range is empty: min {min} > max {max}")]
    SpeedRange { min: f32, max: f32 },
    #[error("weight {name} must be finite and non-negative, got {value}")]
    InvalidWeight { name: &'static str, value: f32 },
    #[error("candidate direction list is empty")]
    EmptyDirections,
    #[error("candidate direction {index} has zero length")]
    DegenerateDirection { index: usize },
    #[error("{field} must be at least 1")]
    ZeroCount { field: &'static str },
}

/// Weights applied to each steering term
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringWeights {
    pub target: f32,
    pub align: f32,
    pub cohesion: f32,
    pub separation: f32,
    pub avoid_collision: f32,
}

impl Default for SteeringWeights {
    fn default() -> Self {
        Self {
            target: weights::TARGET,
            align: weights::ALIGN,
            cohesion: weights::COHESION,
            separation: weights::SEPARATION,
            avoid_collision: weights::AVOID_COLLISION,
        }
    }
}

impl SteeringWeights {
    fn validate(&self) -> Result<(), ConfigError> {
        let all = [
            ("target", self.target),
            ("align", self.align),
            ("cohesion", self.cohesion),
            ("separation", self.separation),
            ("avoid_collision", self.avoid_collision),
        ];
        for (name, value) in all {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight { name, value });
            }
        }
        Ok(())
    }
}

/// Shared flock parameters. Immutable for the lifetime of a flock.
#[derive(Debug, Clone, PartialEq)]
pub struct FlockSettings {
    pub min_speed: f32,
    pub max_speed: f32,
    pub max_steer_force: f32,
    /// Radius of the swept sphere
    pub bounds_radius: f32,
    /// Max distance of each avoidance sweep
    pub avoidance_query_range: f32,
    /// Obstacle layers the sweeps test against
    pub obstacle_mask: u32,
    /// Minimum commands per engine job, passed along with every batch
    pub batch_size: usize,
    /// Late batches fail the frame's avoidance pass. Checked once the
    /// engine returns; a hung engine call is not cut off.
    pub query_timeout: Option<Duration>,
    pub weights: SteeringWeights,
    pub directions: CandidateDirections,
}

impl Default for FlockSettings {
    fn default() -> Self {
        Self {
            min_speed: speed::MIN,
            max_speed: speed::MAX,
            max_steer_force: speed::MAX_STEER_FORCE,
            bounds_radius: avoidance::BOUNDS_RADIUS,
            avoidance_query_range: avoidance::QUERY_RANGE,
            obstacle_mask: avoidance::OBSTACLE_MASK_ALL,
            batch_size: avoidance::BATCH_SIZE,
            query_timeout: None,
            weights: SteeringWeights::default(),
            directions: CandidateDirections::default(),
        }
    }
}

impl FlockSettings {
    /// Load settings from `FLOCK_*` environment variables or use defaults
    pub fn load_or_default() -> Self {
        let mut settings = Self::default();

        env_override("FLOCK_MIN_SPEED", &mut settings.min_speed);
        env_override("FLOCK_MAX_SPEED", &mut settings.max_speed);
        env_override("FLOCK_MAX_STEER_FORCE", &mut settings.max_steer_force);
        env_override("FLOCK_BOUNDS_RADIUS", &mut settings.bounds_radius);
        env_override("FLOCK_AVOIDANCE_RANGE", &mut settings.avoidance_query_range);
        env_override("FLOCK_OBSTACLE_MASK", &mut settings.obstacle_mask);
        env_override("FLOCK_BATCH_SIZE", &mut settings.batch_size);

        env_override("FLOCK_TARGET_WEIGHT", &mut settings.weights.target);
        env_override("FLOCK_ALIGN_WEIGHT", &mut settings.weights.align);
        env_override("FLOCK_COHESION_WEIGHT", &mut settings.weights.cohesion);
        env_override("FLOCK_SEPARATION_WEIGHT", &mut settings.weights.separation);
        env_override("FLOCK_AVOID_WEIGHT", &mut settings.weights.avoid_collision);

        let mut timeout_ms: u64 = 0;
        env_override("FLOCK_QUERY_TIMEOUT_MS", &mut timeout_ms);
        if timeout_ms > 0 {
            settings.query_timeout = Some(Duration::from_millis(timeout_ms));
        }

        let mut direction_count = avoidance::CANDIDATE_DIRECTIONS;
        env_override("FLOCK_CANDIDATE_DIRECTIONS", &mut direction_count);
        match CandidateDirections::golden_spiral(direction_count) {
            Ok(dirs) => settings.directions = dirs,
            Err(e) => tracing::warn!("FLOCK_CANDIDATE_DIRECTIONS rejected ({}), using default", e),
        }

        tracing::info!(
            min_speed = settings.min_speed,
            max_speed = settings.max_speed,
            bounds_radius = settings.bounds_radius,
            avoidance_range = settings.avoidance_query_range,
            batch_size = settings.batch_size,
            directions = settings.directions.len(),
            "Flock settings loaded"
        );

        settings
    }

    /// Start speed for freshly spawned agents
    #[inline]
    pub fn start_speed(&self) -> f32 {
        (self.min_speed + self.max_speed) / 2.0
    }

    /// Validate settings before the simulation starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("min_speed", self.min_speed)?;
        require_positive("max_speed", self.max_speed)?;
        if self.min_speed > self.max_speed {
            return Err(ConfigError::SpeedRange {
                min: self.min_speed,
                max: self.max_speed,
            });
        }
        require_positive("max_steer_force", self.max_steer_force)?;
        require_positive("bounds_radius", self.bounds_radius)?;
        require_positive("avoidance_query_range", self.avoidance_query_range)?;
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroCount { field: "batch_size" });
        }
        if self.directions.is_empty() {
            return Err(ConfigError::EmptyDirections);
        }
        self.weights.validate()
    }
}

/// Headless simulation parameters for the demo driver
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub agent_count: usize,
    pub frames: u32,
    pub dt: f32,
    pub seed: u64,
    pub spawn_radius: f32,
    pub world_radius: f32,
    pub obstacle_count: usize,
    pub obstacle_radius: f32,
    pub failure_policy: AvoidanceFailurePolicy,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            agent_count: spawn::COUNT,
            frames: sim::FRAMES,
            dt: sim::DT,
            seed: 0x5EED,
            spawn_radius: spawn::RADIUS,
            world_radius: sim::WORLD_RADIUS,
            obstacle_count: sim::OBSTACLE_COUNT,
            obstacle_radius: sim::OBSTACLE_RADIUS,
            failure_policy: AvoidanceFailurePolicy::default(),
        }
    }
}

impl SimConfig {
    /// Load config from `SIM_*` environment variables or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        env_override("SIM_AGENTS", &mut config.agent_count);
        env_override("SIM_FRAMES", &mut config.frames);
        env_override("SIM_DT", &mut config.dt);
        env_override("SIM_SEED", &mut config.seed);
        env_override("SIM_SPAWN_RADIUS", &mut config.spawn_radius);
        env_override("SIM_WORLD_RADIUS", &mut config.world_radius);
        env_override("SIM_OBSTACLES", &mut config.obstacle_count);
        env_override("SIM_OBSTACLE_RADIUS", &mut config.obstacle_radius);
        env_override("SIM_FAILURE_POLICY", &mut config.failure_policy);

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent_count == 0 {
            return Err(ConfigError::ZeroCount { field: "agent_count" });
        }
        if self.frames == 0 {
            return Err(ConfigError::ZeroCount { field: "frames" });
        }
        require_positive("dt", self.dt)?;
        require_positive("spawn_radius", self.spawn_radius)?;
        require_positive("world_radius", self.world_radius)?;
        require_positive("obstacle_radius", self.obstacle_radius)?;
        Ok(())
    }
}

fn require_positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

/// Overwrite `slot` with a parsed environment value, keeping the current
/// value (with a warning) when the variable does not parse.
fn env_override<T: FromStr>(key: &str, slot: &mut T) {
    if let Ok(raw) = std::env::var(key) {
        match raw.parse::<T>() {
            Ok(parsed) => *slot = parsed,
            Err(_) => tracing::warn!("Invalid {} '{}', using default", key, raw),
        }
    }
}
