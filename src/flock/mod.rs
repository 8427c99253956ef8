//! Flock simulation core
//!
//! Agents, candidate directions and the per-frame systems that resolve
//! obstacle avoidance and integrate motion.

pub mod agent;
pub mod constants;
pub mod directions;
pub mod spatial;
pub mod spawn;
pub mod systems;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{Agent, AgentId, Avoidance, AvoidanceState, FlockInputs};
pub use directions::CandidateDirections;
pub use spatial::ObstacleField;
pub use spawn::Spawner;
pub use systems::update_loop::{AvoidanceFailurePolicy, Flock, FrameError, FrameOutcome};
