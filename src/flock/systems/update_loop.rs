//! Per-frame flock driver
//!
//! A frame resolves obstacle avoidance for the whole flock first, then runs
//! force accumulation and integration agent by agent. No agent integrates
//! before every agent's avoidance for the frame is settled.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{ConfigError, FlockSettings};
use crate::flock::agent::{Agent, AgentId, Avoidance, FlockInputs};
use crate::flock::systems::avoidance::{AvoidanceReport, AvoidanceResolver};
use crate::flock::systems::query_batch::{QueryDispatchError, SpatialQueryEngine};
use crate::metrics::AvoidanceMetrics;
use crate::util::vec3::Vec3;

/// What the driver does when the avoidance pass cannot complete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AvoidanceFailurePolicy {
    /// Return the error; no agent moves this frame
    #[default]
    Halt,
    /// Log and skip the frame; no agent moves
    SkipFrame,
    /// Log, resolve unresolved agents to their current heading and integrate
    HoldHeading,
}

impl fmt::Display for AvoidanceFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AvoidanceFailurePolicy::Halt => "halt",
            AvoidanceFailurePolicy::SkipFrame => "skip",
            AvoidanceFailurePolicy::HoldHeading => "hold",
        };
        f.write_str(name)
    }
}

impl FromStr for AvoidanceFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "halt" => Ok(AvoidanceFailurePolicy::Halt),
            "skip" | "skip_frame" => Ok(AvoidanceFailurePolicy::SkipFrame),
            "hold" | "hold_heading" => Ok(AvoidanceFailurePolicy::HoldHeading),
            other => Err(format!("unknown failure policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("Avoidance pass failed: {0}")]
    Avoidance(#[from] QueryDispatchError),
    #[error("Got {inputs} flock inputs for {agents} agents")]
    InputMismatch { agents: usize, inputs: usize },
    #[error("Timestep must be positive and finite, got {0}")]
    InvalidTimestep(f32),
}

/// Result of a frame that did not return an error
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Avoidance resolved normally and every agent integrated
    Completed(AvoidanceReport),
    /// Avoidance failed, the frame was skipped under `SkipFrame`
    Skipped(QueryDispatchError),
    /// Avoidance failed, unresolved agents held their heading under
    /// `HoldHeading` and every agent integrated
    HeldHeading(QueryDispatchError),
}

/// A flock of agents sharing one immutable settings object
pub struct Flock {
    settings: FlockSettings,
    agents: Vec<Agent>,
    policy: AvoidanceFailurePolicy,
    metrics: Option<Arc<AvoidanceMetrics>>,
    frame: u64,
    next_id: u32,
}

impl Flock {
    /// Empty flock. Settings are validated here, before any frame runs.
    pub fn new(settings: FlockSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            settings,
            agents: Vec::new(),
            policy: AvoidanceFailurePolicy::default(),
            metrics: None,
            frame: 0,
            next_id: 0,
        })
    }

    pub fn with_failure_policy(mut self, policy: AvoidanceFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<AvoidanceMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Add an agent at the flock's start speed
    pub fn spawn_agent(&mut self, position: Vec3, heading: Vec3) -> AgentId {
        let id = AgentId(self.next_id);
        self.next_id += 1;
        self.agents.push(Agent::new(id, position, heading, &self.settings));
        id
    }

    #[inline]
    pub fn settings(&self) -> &FlockSettings {
        &self.settings
    }

    #[inline]
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// Mutable agent access for external bookkeeping (removal, teleports)
    #[inline]
    pub fn agents_mut(&mut self) -> &mut Vec<Agent> {
        &mut self.agents
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    #[inline]
    pub fn policy(&self) -> AvoidanceFailurePolicy {
        self.policy
    }

    /// Frames that ran force and integration
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Advance the flock by one frame.
    ///
    /// `inputs[i]` holds this frame's flocking aggregates for `agents()[i]`.
    pub fn step<E: SpatialQueryEngine + ?Sized>(
        &mut self,
        engine: &E,
        inputs: &[FlockInputs],
        dt: f32,
    ) -> Result<FrameOutcome, FrameError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(FrameError::InvalidTimestep(dt));
        }
        if inputs.len() != self.agents.len() {
            return Err(FrameError::InputMismatch {
                agents: self.agents.len(),
                inputs: inputs.len(),
            });
        }

        let started = Instant::now();

        let resolver = AvoidanceResolver::new(engine, &self.settings);
        let mut report = AvoidanceReport::default();
        let outcome = match resolver.resolve_into(&mut self.agents, &mut report) {
            Ok(()) => {
                self.record(|m| m.record_report(&report));
                FrameOutcome::Completed(report)
            }
            Err(error) => match self.policy {
                AvoidanceFailurePolicy::Halt => {
                    self.record(|m| {
                        m.record_report(&report);
                        m.record_failed_frame();
                    });
                    return Err(FrameError::Avoidance(error));
                }
                AvoidanceFailurePolicy::SkipFrame => {
                    tracing::warn!(frame = self.frame, "Avoidance failed, skipping frame: {}", error);
                    self.record(|m| {
                        m.record_report(&report);
                        m.record_skipped_frame();
                    });
                    return Ok(FrameOutcome::Skipped(error));
                }
                AvoidanceFailurePolicy::HoldHeading => {
                    tracing::warn!(frame = self.frame, "Avoidance failed, holding headings: {}", error);
                    for agent in self.agents.iter_mut().filter(|a| !a.is_resolved()) {
                        let heading = agent.heading;
                        agent.resolve(Avoidance::Fallback(heading));
                        report.fallback += 1;
                    }
                    self.record(|m| {
                        m.record_report(&report);
                        m.record_held_frame();
                    });
                    FrameOutcome::HeldHeading(error)
                }
            },
        };

        for (agent, input) in self.agents.iter_mut().zip(inputs) {
            let acceleration = agent.update_forces(input, &self.settings);
            agent.integrate(acceleration, dt, &self.settings);
        }

        self.frame += 1;
        let agents = self.agents.len();
        self.record(|m| m.record_frame_time(started.elapsed(), agents));

        Ok(outcome)
    }

    #[inline]
    fn record(&self, f: impl FnOnce(&AvoidanceMetrics)) {
        if let Some(metrics) = &self.metrics {
            f(metrics);
        }
    }
}
