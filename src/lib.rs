//! Skyflock
//!
//! Boids flock simulation with batched sphere-sweep obstacle avoidance.
//!
//! Every frame the whole flock checks its current heading with one batch of
//! sweep queries, then walks an ordered list of candidate directions one batch
//! at a time, querying only the agents that are still blocked.
//!
//! # Features
//!
//! - `parallel_queries` - Evaluate sweep batches on the rayon pool in the
//!   built-in `ObstacleField` engine (enabled by default)

pub mod config;
pub mod flock;
pub mod metrics;
pub mod util;
