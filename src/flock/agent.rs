//! Per-agent kinematic state, force accumulation and integration

use crate::config::FlockSettings;
use crate::flock::systems::query_batch::{
    dispatch, ObstacleQueryBatch, QueryDispatchError, SpatialQueryEngine, SweepBatch,
    SweepDirection, SweepQuery,
};
use crate::flock::systems::steering::steer_towards;
use crate::util::basis::Basis;
use crate::util::vec3::Vec3;

/// Stable handle for an agent, assigned at spawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(pub u32);

/// Outcome of one frame's avoidance search for an agent
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Avoidance {
    /// Current heading is clear, no avoidance needed
    Clear,
    /// First clear candidate direction, world space
    Steer(Vec3),
    /// Every candidate was blocked; keep flying along this heading
    Fallback(Vec3),
}

impl Avoidance {
    /// Avoidance vector fed to the steering stage (zero for `Clear`)
    #[inline]
    pub fn vector(&self) -> Vec3 {
        match *self {
            Avoidance::Clear => Vec3::ZERO,
            Avoidance::Steer(dir) | Avoidance::Fallback(dir) => dir,
        }
    }
}

/// Per-frame avoidance state. Reset to `NeedsResolution` at the start of
/// every avoidance pass so a stale resolution is never reused.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum AvoidanceState {
    #[default]
    NeedsResolution,
    Resolved(Avoidance),
}

/// Flocking aggregates for one agent and one frame.
///
/// Produced fresh every frame by the neighbour aggregation step and only
/// read here. `neighbor_centroid_sum` is the plain sum of neighbour
/// positions; the division by `neighbor_count` happens locally.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlockInputs {
    pub avg_neighbor_heading: Vec3,
    pub neighbor_centroid_sum: Vec3,
    /// Average heading away from crowding neighbours
    pub separation_heading: Vec3,
    pub neighbor_count: u32,
    pub target: Option<Vec3>,
}

impl FlockInputs {
    /// No neighbours, no target
    pub fn alone() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, target: Vec3) -> Self {
        self.target = Some(target);
        self
    }

    /// Neighbour centroid, if there are any neighbours
    #[inline]
    pub fn centroid(&self) -> Option<Vec3> {
        (self.neighbor_count > 0).then(|| self.neighbor_centroid_sum / self.neighbor_count as f32)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub id: AgentId,
    pub position: Vec3,
    /// Unit vector of `velocity`
    pub heading: Vec3,
    pub velocity: Vec3,
    pub avoidance: AvoidanceState,
}

impl Agent {
    /// New agent at the flock's start speed (midpoint of min and max).
    /// A zero heading falls back to world forward.
    pub fn new(id: AgentId, position: Vec3, heading: Vec3, settings: &FlockSettings) -> Self {
        let heading = heading.try_normalize().unwrap_or(Vec3::FORWARD);
        Self {
            id,
            position,
            heading,
            velocity: heading * settings.start_speed(),
            avoidance: AvoidanceState::NeedsResolution,
        }
    }

    #[inline]
    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    /// Orientation used to rotate local candidate directions
    #[inline]
    pub fn basis(&self) -> Basis {
        Basis::look_rotation(self.heading)
    }

    #[inline]
    pub fn is_resolved(&self) -> bool {
        matches!(self.avoidance, AvoidanceState::Resolved(_))
    }

    /// Resolved avoidance vector for this frame, `None` until resolved
    #[inline]
    pub fn resolved_avoidance(&self) -> Option<Vec3> {
        match self.avoidance {
            AvoidanceState::Resolved(a) => Some(a.vector()),
            AvoidanceState::NeedsResolution => None,
        }
    }

    #[inline]
    pub fn reset_avoidance(&mut self) {
        self.avoidance = AvoidanceState::NeedsResolution;
    }

    #[inline]
    pub fn resolve(&mut self, avoidance: Avoidance) {
        self.avoidance = AvoidanceState::Resolved(avoidance);
    }

    /// Sum of weighted steering forces for this frame.
    ///
    /// Terms whose desired direction is zero contribute nothing. Pure with
    /// respect to `inputs`, so calling it twice gives the same answer.
    pub fn update_forces(&self, inputs: &FlockInputs, settings: &FlockSettings) -> Vec3 {
        let w = &settings.weights;
        let steer = |desired: Vec3| {
            steer_towards(desired, self.velocity, settings.max_speed, settings.max_steer_force)
                .unwrap_or(Vec3::ZERO)
        };

        let mut acceleration = Vec3::ZERO;

        if let Some(target) = inputs.target {
            acceleration += steer(target - self.position) * w.target;
        }

        if let Some(centroid) = inputs.centroid() {
            acceleration += steer(inputs.avg_neighbor_heading) * w.align;
            acceleration += steer(centroid - self.position) * w.cohesion;
            acceleration += steer(inputs.separation_heading) * w.separation;
        }

        if let Some(avoid) = self.resolved_avoidance() {
            // Zero for a clear heading, so this only fires when steering away
            acceleration += steer(avoid) * w.avoid_collision;
        }

        acceleration
    }

    /// Semi-implicit Euler step with speed clamped to the flock's range.
    ///
    /// If velocity collapses to zero the previous heading is kept at
    /// `min_speed`.
    pub fn integrate(&mut self, acceleration: Vec3, dt: f32, settings: &FlockSettings) {
        let velocity = self.velocity + acceleration * dt;

        let (dir, speed) = match velocity.try_normalize() {
            Some(dir) => (dir, velocity.length().clamp(settings.min_speed, settings.max_speed)),
            None => (self.heading, settings.min_speed),
        };

        self.velocity = dir * speed;
        self.position += self.velocity * dt;
        self.heading = dir;
    }

    /// Update a single agent without the flock-wide batching.
    ///
    /// Runs a one-query heading check; if blocked, sweeps every candidate
    /// direction in one batch and takes the first clear one in table order,
    /// falling back to the current heading. Then applies forces and
    /// integrates.
    pub fn update_single<E: SpatialQueryEngine + ?Sized>(
        &mut self,
        engine: &E,
        settings: &FlockSettings,
        inputs: &FlockInputs,
        dt: f32,
    ) -> Result<Avoidance, QueryDispatchError> {
        self.reset_avoidance();

        let precheck = ObstacleQueryBatch::new(engine, settings);
        precheck.run(std::slice::from_mut(self), &[0], SweepDirection::Heading)?;

        let resolution = match self.avoidance {
            AvoidanceState::Resolved(clear) => clear,
            AvoidanceState::NeedsResolution => self.search_candidates(engine, settings)?,
        };

        let acceleration = self.update_forces(inputs, settings);
        self.integrate(acceleration, dt, settings);

        Ok(resolution)
    }

    /// Sweep every candidate direction for this agent in one batch
    fn search_candidates<E: SpatialQueryEngine + ?Sized>(
        &mut self,
        engine: &E,
        settings: &FlockSettings,
    ) -> Result<Avoidance, QueryDispatchError> {
        let basis = self.basis();
        let world_dirs: Vec<Vec3> = settings
            .directions
            .iter()
            .map(|local| basis.transform_direction(local))
            .collect();
        let batch = SweepBatch {
            queries: world_dirs
                .iter()
                .map(|&dir| SweepQuery::from_agent(self, dir, settings))
                .collect(),
            min_commands_per_job: settings.batch_size,
        };

        let results = dispatch(engine, &batch, settings.query_timeout)?;
        let resolution = results
            .iter()
            .position(|r| !r.hit)
            .map(|slot| Avoidance::Steer(world_dirs[slot]))
            .unwrap_or(Avoidance::Fallback(self.heading));
        self.resolve(resolution);
        Ok(resolution)
    }
}
