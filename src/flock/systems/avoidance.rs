//! Flock-wide obstacle avoidance resolution
//!
//! Every agent starts the pass as `NeedsResolution`. One pre-check batch
//! sweeps each agent's current heading; agents that come back clear need no
//! avoidance. The rest are swept along the candidate directions in table
//! order, one batch per direction, and each batch only contains agents that
//! are still unresolved. Total query count is therefore the sum of the
//! shrinking active set sizes rather than agents x directions. Agents still
//! blocked after the last candidate fall back to their current heading.

use bitvec::prelude::*;

use crate::config::FlockSettings;
use crate::flock::agent::{Agent, Avoidance};
use crate::flock::systems::query_batch::{
    ObstacleQueryBatch, QueryDispatchError, SpatialQueryEngine, SweepDirection,
};

/// Query volume and outcomes of one resolver pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvoidanceReport {
    /// Size of the heading pre-check batch (the flock size)
    pub precheck_size: usize,
    /// Active set size for each candidate direction that was swept
    pub round_sizes: Vec<usize>,
    /// Agents whose heading was clear
    pub clear: usize,
    /// Agents resolved on a candidate direction
    pub steered: usize,
    /// Agents that exhausted the candidate list
    pub fallback: usize,
}

impl AvoidanceReport {
    pub fn search_queries(&self) -> usize {
        self.round_sizes.iter().sum()
    }

    pub fn total_queries(&self) -> usize {
        self.precheck_size + self.search_queries()
    }

    /// Batches submitted to the engine, pre-check included
    pub fn batches(&self) -> usize {
        usize::from(self.precheck_size > 0) + self.round_sizes.len()
    }
}

pub struct AvoidanceResolver<'a, E: ?Sized> {
    batch: ObstacleQueryBatch<'a, E>,
    settings: &'a FlockSettings,
}

impl<'a, E: SpatialQueryEngine + ?Sized> AvoidanceResolver<'a, E> {
    pub fn new(engine: &'a E, settings: &'a FlockSettings) -> Self {
        Self {
            batch: ObstacleQueryBatch::new(engine, settings),
            settings,
        }
    }

    /// Resolve avoidance for every agent.
    ///
    /// On `Ok` every agent is `Resolved`. On a dispatch failure the pass
    /// stops: agents confirmed in earlier batches keep their resolution and
    /// the rest stay `NeedsResolution`.
    pub fn resolve(&self, agents: &mut [Agent]) -> Result<AvoidanceReport, QueryDispatchError> {
        let mut report = AvoidanceReport::default();
        self.resolve_into(agents, &mut report)?;
        Ok(report)
    }

    /// Same as `resolve`, but fills `report` as batches go out so a failed
    /// pass still accounts for every batch submitted, the failing one
    /// included.
    pub fn resolve_into(
        &self,
        agents: &mut [Agent],
        report: &mut AvoidanceReport,
    ) -> Result<(), QueryDispatchError> {
        *report = AvoidanceReport::default();
        for agent in agents.iter_mut() {
            agent.reset_avoidance();
        }

        if agents.is_empty() {
            return Ok(());
        }

        let mut active: Vec<usize> = (0..agents.len()).collect();
        let mut resolved = bitvec![0; agents.len()];

        report.precheck_size = active.len();
        let cleared = self.batch.run(agents, &active, SweepDirection::Heading)?;
        report.clear = cleared.len();
        shrink(&mut active, &mut resolved, &cleared);

        for local in self.settings.directions.iter() {
            if active.is_empty() {
                break;
            }
            report.round_sizes.push(active.len());
            let cleared = self.batch.run(agents, &active, SweepDirection::Local(local))?;
            report.steered += cleared.len();
            shrink(&mut active, &mut resolved, &cleared);
        }

        for &index in &active {
            let heading = agents[index].heading;
            agents[index].resolve(Avoidance::Fallback(heading));
        }
        report.fallback = active.len();

        tracing::debug!(
            agents = agents.len(),
            clear = report.clear,
            steered = report.steered,
            fallback = report.fallback,
            rounds = report.round_sizes.len(),
            queries = report.total_queries(),
            "Avoidance pass resolved"
        );

        Ok(())
    }
}

/// Drop newly cleared agents from the active set, keeping its order
fn shrink(active: &mut Vec<usize>, resolved: &mut BitVec, cleared: &[usize]) {
    if cleared.is_empty() {
        return;
    }
    for &index in cleared {
        resolved.set(index, true);
    }
    active.retain(|&index| !resolved[index]);
}
