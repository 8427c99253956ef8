/// Speed limits (world units per second)
pub mod speed {
    /// Lower speed bound; must stay > 0 so velocity never collapses to zero
    pub const MIN: f32 = 2.0;
    /// Upper speed bound
    pub const MAX: f32 = 5.0;
    /// Maximum magnitude of a single steering force
    pub const MAX_STEER_FORCE: f32 = 3.0;
}

/// Steering weights applied to each force term
pub mod weights {
    pub const TARGET: f32 = 1.0;
    pub const ALIGN: f32 = 1.0;
    pub const COHESION: f32 = 1.0;
    pub const SEPARATION: f32 = 1.0;
    /// Obstacle avoidance dominates the other terms
    pub const AVOID_COLLISION: f32 = 10.0;
}

/// Obstacle avoidance query constants
pub mod avoidance {
    /// Radius of the swept sphere around each agent
    pub const BOUNDS_RADIUS: f32 = 0.27;
    /// How far ahead each sweep looks
    pub const QUERY_RANGE: f32 = 5.0;
    /// Layer mask matching every obstacle layer
    pub const OBSTACLE_MASK_ALL: u32 = u32::MAX;
    /// Minimum sweep commands handed to one engine job
    pub const BATCH_SIZE: usize = 100;
    /// Number of golden-spiral candidate directions
    pub const CANDIDATE_DIRECTIONS: usize = 300;
}

/// Flock spawn constants
pub mod spawn {
    /// Radius of the sphere agents are scattered in
    pub const RADIUS: f32 = 10.0;
    /// Default number of agents
    pub const COUNT: usize = 250;
}

/// Headless simulation constants
pub mod sim {
    /// Frame rate of the fixed-step driver
    pub const FRAME_RATE: u32 = 60;
    /// Delta time per frame in seconds
    pub const DT: f32 = 1.0 / 60.0;
    /// Default number of frames the demo runs
    pub const FRAMES: u32 = 600;
    /// Radius of the world obstacles are scattered in
    pub const WORLD_RADIUS: f32 = 40.0;
    /// Default number of sphere obstacles
    pub const OBSTACLE_COUNT: usize = 60;
    /// Default obstacle radius
    pub const OBSTACLE_RADIUS: f32 = 2.0;
    /// Distance at which a boid counts another as a neighbour
    pub const PERCEPTION_RADIUS: f32 = 2.5;
    /// Neighbours closer than this push the boid away
    pub const CROWDING_RADIUS: f32 = 1.0;
    /// Seconds per revolution of the demo's orbiting target
    pub const TARGET_ORBIT_PERIOD: f32 = 20.0;
    /// Frames between progress log lines
    pub const LOG_EVERY_FRAMES: u32 = 120;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_bounds_are_ordered() {
        assert!(speed::MIN > 0.0, "min speed must keep velocity non-zero");
        assert!(speed::MIN <= speed::MAX);
    }

    #[test]
    fn test_dt_matches_frame_rate() {
        assert!((sim::DT * sim::FRAME_RATE as f32 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_avoidance_dominates_flocking() {
        assert!(weights::AVOID_COLLISION > weights::ALIGN);
        assert!(weights::AVOID_COLLISION > weights::COHESION);
        assert!(weights::AVOID_COLLISION > weights::SEPARATION);
    }
}
