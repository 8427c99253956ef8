//! Seeded placement of agents and obstacles

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::flock::agent::AgentId;
use crate::flock::spatial::{ObstacleField, ObstacleId};
use crate::flock::systems::update_loop::Flock;
use crate::util::vec3::Vec3;

/// Rejection sampling attempts before falling back to the center
const MAX_SAMPLE_ATTEMPTS: u32 = 32;

/// Attempts to place one obstacle clear of the spawn sphere
const MAX_OBSTACLE_ATTEMPTS: u32 = 16;

pub struct Spawner {
    rng: StdRng,
    center: Vec3,
    radius: f32,
}

impl Spawner {
    pub fn new(seed: u64, center: Vec3, radius: f32) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            center,
            radius: radius.abs(),
        }
    }

    /// Random point inside a ball of `radius` around `center`
    fn point_in_ball(&mut self, center: Vec3, radius: f32) -> Vec3 {
        for _ in 0..MAX_SAMPLE_ATTEMPTS {
            let p = Vec3::new(
                self.rng.gen_range(-1.0..=1.0),
                self.rng.gen_range(-1.0..=1.0),
                self.rng.gen_range(-1.0..=1.0),
            );
            if p.length_sq() <= 1.0 {
                return center + p * radius;
            }
        }
        center
    }

    /// Uniform random unit vector
    pub fn random_heading(&mut self) -> Vec3 {
        for _ in 0..MAX_SAMPLE_ATTEMPTS {
            let p = self.point_in_ball(Vec3::ZERO, 1.0);
            if let Some(dir) = p.try_normalize() {
                return dir;
            }
        }
        Vec3::FORWARD
    }

    pub fn random_position(&mut self) -> Vec3 {
        self.point_in_ball(self.center, self.radius)
    }

    /// Spawn `count` agents inside the spawn sphere with random headings
    pub fn spawn_into(&mut self, flock: &mut Flock, count: usize) -> Vec<AgentId> {
        (0..count)
            .map(|_| {
                let position = self.random_position();
                let heading = self.random_heading();
                flock.spawn_agent(position, heading)
            })
            .collect()
    }

    /// Scatter obstacles through the world sphere, keeping them outside the
    /// spawn sphere when a clear spot is found
    pub fn scatter_obstacles(
        &mut self,
        field: &mut ObstacleField,
        count: usize,
        obstacle_radius: f32,
        world_radius: f32,
    ) -> Vec<ObstacleId> {
        let keep_out = self.radius + obstacle_radius;
        let mut placed = Vec::with_capacity(count);

        for _ in 0..count {
            let mut center = self.point_in_ball(self.center, world_radius);
            for _ in 0..MAX_OBSTACLE_ATTEMPTS {
                if center.distance_to(self.center) > keep_out {
                    break;
                }
                center = self.point_in_ball(self.center, world_radius);
            }
            placed.push(field.insert(center, obstacle_radius));
        }

        tracing::debug!(count = placed.len(), obstacle_radius, world_radius, "Scattered obstacles");
        placed
    }
}
