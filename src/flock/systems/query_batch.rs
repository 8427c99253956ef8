//! Batched sphere-sweep queries against the external obstacle engine
//!
//! One `ObstacleQueryBatch::run` call issues exactly one engine batch: one
//! sweep per active agent, all along the same candidate direction. Results
//! come back in submission order and are mapped to agents through the
//! explicit `active` index array.

use std::time::{Duration, Instant};

use crate::config::FlockSettings;
use crate::flock::agent::{Agent, Avoidance};
use crate::util::vec3::Vec3;

/// One sphere sweep: a sphere of `radius` moved from `origin` along
/// `direction` for at most `max_distance`, tested against `layer_mask`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepQuery {
    pub origin: Vec3,
    pub radius: f32,
    pub direction: Vec3,
    pub max_distance: f32,
    pub layer_mask: u32,
}

impl SweepQuery {
    /// Sweep from an agent's position along `direction` with the flock's
    /// radius, range and mask
    #[inline]
    pub fn from_agent(agent: &Agent, direction: Vec3, settings: &FlockSettings) -> Self {
        Self {
            origin: agent.position,
            radius: settings.bounds_radius,
            direction,
            max_distance: settings.avoidance_query_range,
            layer_mask: settings.obstacle_mask,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepHit {
    pub hit: bool,
}

/// Queries submitted together, plus the job granularity the engine may use
#[derive(Debug, Clone, PartialEq)]
pub struct SweepBatch {
    pub queries: Vec<SweepQuery>,
    pub min_commands_per_job: usize,
}

impl SweepBatch {
    #[inline]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

/// Errors raised while dispatching a sweep batch. Fatal for the frame's
/// avoidance pass.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryDispatchError {
    #[error("Spatial query engine unavailable: {0}")]
    Unavailable(String),
    #[error("Sweep batch rejected: {0}")]
    Rejected(String),
    #[error("Engine returned {actual} results for {expected} queries")]
    ResultCountMismatch { expected: usize, actual: usize },
    #[error("Sweep batch took {elapsed:?} (limit {limit:?})")]
    Timeout { elapsed: Duration, limit: Duration },
}

/// The external spatial query capability.
///
/// Blocking: the call returns once every query in the batch has a result,
/// one per query, in submission order.
pub trait SpatialQueryEngine {
    fn submit_sweep_batch(&self, batch: &SweepBatch) -> Result<Vec<SweepHit>, QueryDispatchError>;
}

impl<E: SpatialQueryEngine + ?Sized> SpatialQueryEngine for &E {
    fn submit_sweep_batch(&self, batch: &SweepBatch) -> Result<Vec<SweepHit>, QueryDispatchError> {
        (**self).submit_sweep_batch(batch)
    }
}

/// Submit a batch and validate what comes back: result count must match and
/// the batch must finish inside `timeout` when one is set.
pub fn dispatch<E: SpatialQueryEngine + ?Sized>(
    engine: &E,
    batch: &SweepBatch,
    timeout: Option<Duration>,
) -> Result<Vec<SweepHit>, QueryDispatchError> {
    let started = Instant::now();
    let results = engine.submit_sweep_batch(batch)?;

    if let Some(limit) = timeout {
        let elapsed = started.elapsed();
        if elapsed > limit {
            return Err(QueryDispatchError::Timeout { elapsed, limit });
        }
    }

    if results.len() != batch.len() {
        return Err(QueryDispatchError::ResultCountMismatch {
            expected: batch.len(),
            actual: results.len(),
        });
    }

    Ok(results)
}

/// Direction swept by every agent in one batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SweepDirection {
    /// The agent's current world-space heading (pre-check)
    Heading,
    /// A candidate in agent-local space, rotated by each agent's own basis
    Local(Vec3),
}

/// Issues one batched sweep for a set of agents and records the agents that
/// came back clear.
pub struct ObstacleQueryBatch<'a, E: ?Sized> {
    engine: &'a E,
    settings: &'a FlockSettings,
}

impl<'a, E: SpatialQueryEngine + ?Sized> ObstacleQueryBatch<'a, E> {
    pub fn new(engine: &'a E, settings: &'a FlockSettings) -> Self {
        Self { engine, settings }
    }

    /// Sweep every agent named in `active` along `direction`.
    ///
    /// Agents whose sweep reports no hit are resolved (`Clear` for the
    /// heading pre-check, `Steer` with the world-space direction otherwise)
    /// and their indices returned in `active` order. An empty `active` set
    /// submits nothing. On error no agent is touched.
    pub fn run(
        &self,
        agents: &mut [Agent],
        active: &[usize],
        direction: SweepDirection,
    ) -> Result<Vec<usize>, QueryDispatchError> {
        if active.is_empty() {
            return Ok(Vec::new());
        }

        // world_dirs[slot] is the direction swept for agents[active[slot]]
        let world_dirs: Vec<Vec3> = active
            .iter()
            .map(|&index| {
                let agent = &agents[index];
                match direction {
                    SweepDirection::Heading => agent.heading,
                    SweepDirection::Local(local) => agent.basis().transform_direction(local),
                }
            })
            .collect();

        let batch = SweepBatch {
            queries: active
                .iter()
                .zip(&world_dirs)
                .map(|(&index, &dir)| SweepQuery::from_agent(&agents[index], dir, self.settings))
                .collect(),
            min_commands_per_job: self.settings.batch_size,
        };

        let results = dispatch(self.engine, &batch, self.settings.query_timeout)?;

        let mut cleared = Vec::new();
        for (slot, result) in results.iter().enumerate() {
            if result.hit {
                continue;
            }
            let index = active[slot];
            let resolution = match direction {
                SweepDirection::Heading => Avoidance::Clear,
                SweepDirection::Local(_) => Avoidance::Steer(world_dirs[slot]),
            };
            agents[index].resolve(resolution);
            cleared.push(index);
        }

        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flock::agent::{AgentId, AvoidanceState};
    use crate::flock::testing::ScriptedEngine;

    fn agents_at(xs: &[f32]) -> (Vec<Agent>, FlockSettings) {
        let settings = FlockSettings::default();
        let agents = xs
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                Agent::new(AgentId(i as u32), Vec3::new(x, 0.0, 0.0), Vec3::FORWARD, &settings)
            })
            .collect();
        (agents, settings)
    }

    #[test]
    fn test_empty_active_set_submits_nothing() {
        let (mut agents, settings) = agents_at(&[0.0, 1.0]);
        let engine = ScriptedEngine::new(|_| false);
        let batch = ObstacleQueryBatch::new(&engine, &settings);

        let cleared = batch.run(&mut agents, &[], SweepDirection::Heading).unwrap();

        assert!(cleared.is_empty());
        assert_eq!(engine.batch_count(), 0);
    }

    #[test]
    fn test_query_fields_come_from_agent_and_settings() {
        let (mut agents, mut settings) = agents_at(&[3.0]);
        settings.bounds_radius = 0.5;
        settings.avoidance_query_range = 7.0;
        settings.obstacle_mask = 0b100;
        settings.batch_size = 16;
        let engine = ScriptedEngine::new(|_| true);

        ObstacleQueryBatch::new(&engine, &settings)
            .run(&mut agents, &[0], SweepDirection::Heading)
            .unwrap();

        let batches = engine.batches();
        assert_eq!(batches[0].min_commands_per_job, 16);
        let q = batches[0].queries[0];
        assert_eq!(q.origin, Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(q.radius, 0.5);
        assert_eq!(q.max_distance, 7.0);
        assert_eq!(q.layer_mask, 0b100);
        assert_eq!(q.direction, Vec3::FORWARD);
    }

    #[test]
    fn test_heading_precheck_resolves_clear() {
        let (mut agents, settings) = agents_at(&[0.0, 10.0]);
        // Only the agent at x=10 is blocked
        let engine = ScriptedEngine::new(|q| q.origin.x > 5.0);

        let cleared = ObstacleQueryBatch::new(&engine, &settings)
            .run(&mut agents, &[0, 1], SweepDirection::Heading)
            .unwrap();

        assert_eq!(cleared, vec![0]);
        assert_eq!(agents[0].avoidance, AvoidanceState::Resolved(Avoidance::Clear));
        assert_eq!(agents[0].resolved_avoidance(), Some(Vec3::ZERO));
        assert_eq!(agents[1].avoidance, AvoidanceState::NeedsResolution);
    }

    #[test]
    fn test_local_direction_is_rotated_per_agent() {
        let (mut agents, settings) = agents_at(&[0.0, 10.0]);
        // Second agent flies along +X, so local forward maps to +X
        agents[1].heading = Vec3::RIGHT;
        let engine = ScriptedEngine::new(|_| false);

        ObstacleQueryBatch::new(&engine, &settings)
            .run(&mut agents, &[0, 1], SweepDirection::Local(Vec3::FORWARD))
            .unwrap();

        let queries = &engine.batches()[0].queries;
        assert!(queries[0].direction.approx_eq(Vec3::FORWARD, 1e-5));
        assert!(queries[1].direction.approx_eq(Vec3::RIGHT, 1e-5));
        assert_eq!(
            agents[1].avoidance,
            AvoidanceState::Resolved(Avoidance::Steer(queries[1].direction))
        );
    }

    #[test]
    fn test_compacted_indices_map_back_to_agents() {
        // Active set skips agents 0, 2 and 4; results are positional
        let (mut agents, settings) = agents_at(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let active = [1, 3, 5];
        // Clear exactly at slot 1 of the batch, which is agent 3
        let engine = ScriptedEngine::new(|q| q.origin.x != 3.0);

        let cleared = ObstacleQueryBatch::new(&engine, &settings)
            .run(&mut agents, &active, SweepDirection::Local(Vec3::FORWARD))
            .unwrap();

        assert_eq!(cleared, vec![3]);
        let origins: Vec<f32> = engine.batches()[0].queries.iter().map(|q| q.origin.x).collect();
        assert_eq!(origins, vec![1.0, 3.0, 5.0]);
        for (i, agent) in agents.iter().enumerate() {
            assert_eq!(agent.is_resolved(), i == 3, "agent {}", i);
        }
    }

    #[test]
    fn test_last_slot_maps_to_last_active_agent() {
        let (mut agents, settings) = agents_at(&[0.0, 1.0, 2.0, 3.0]);
        let engine = ScriptedEngine::new(|q| q.origin.x != 3.0);

        let cleared = ObstacleQueryBatch::new(&engine, &settings)
            .run(&mut agents, &[0, 2, 3], SweepDirection::Heading)
            .unwrap();

        assert_eq!(cleared, vec![3]);
        assert!(!agents[2].is_resolved());
    }

    #[test]
    fn test_failure_writes_nothing() {
        let (mut agents, settings) = agents_at(&[0.0, 1.0]);
        let engine = ScriptedEngine::new(|_| false).failing_on_batch(0);

        let err = ObstacleQueryBatch::new(&engine, &settings)
            .run(&mut agents, &[0, 1], SweepDirection::Heading)
            .unwrap_err();

        assert!(matches!(err, QueryDispatchError::Unavailable(_)));
        assert!(agents.iter().all(|a| !a.is_resolved()));
    }

    #[test]
    fn test_short_result_list_is_rejected() {
        let (mut agents, settings) = agents_at(&[0.0, 1.0, 2.0]);
        let engine = ScriptedEngine::new(|_| false).truncating_results(1);

        let err = ObstacleQueryBatch::new(&engine, &settings)
            .run(&mut agents, &[0, 1, 2], SweepDirection::Heading)
            .unwrap_err();

        assert_eq!(
            err,
            QueryDispatchError::ResultCountMismatch { expected: 3, actual: 2 }
        );
        assert!(agents.iter().all(|a| !a.is_resolved()));
    }

    #[test]
    fn test_slow_batch_times_out() {
        let (mut agents, mut settings) = agents_at(&[0.0]);
        settings.query_timeout = Some(Duration::from_millis(1));
        let engine = ScriptedEngine::new(|_| false).with_delay(Duration::from_millis(20));

        let err = ObstacleQueryBatch::new(&engine, &settings)
            .run(&mut agents, &[0], SweepDirection::Heading)
            .unwrap_err();

        assert!(matches!(err, QueryDispatchError::Timeout { .. }));
        assert!(!agents[0].is_resolved());
    }
}
