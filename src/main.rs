use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use skyflock::config::{FlockSettings, SimConfig};
use skyflock::flock::constants::sim::{
    CROWDING_RADIUS, LOG_EVERY_FRAMES, PERCEPTION_RADIUS, TARGET_ORBIT_PERIOD,
};
use skyflock::flock::{Agent, Flock, FlockInputs, FrameOutcome, ObstacleField, Spawner};
use skyflock::metrics::AvoidanceMetrics;
use skyflock::util::vec3::Vec3;

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Skyflock v{}", env!("CARGO_PKG_VERSION"));

    let settings = FlockSettings::load_or_default();
    settings.validate().context("invalid flock settings")?;
    let sim = SimConfig::load_or_default();
    sim.validate().context("invalid simulation config")?;

    info!(
        "Simulating {} agents for {} frames, {} obstacles, policy={}",
        sim.agent_count, sim.frames, sim.obstacle_count, sim.failure_policy
    );

    let metrics = Arc::new(AvoidanceMetrics::new());
    let mut spawner = Spawner::new(sim.seed, Vec3::ZERO, sim.spawn_radius);

    let mut field = ObstacleField::default();
    spawner.scatter_obstacles(&mut field, sim.obstacle_count, sim.obstacle_radius, sim.world_radius);

    let mut flock = Flock::new(settings)?
        .with_failure_policy(sim.failure_policy)
        .with_metrics(metrics.clone());
    spawner.spawn_into(&mut flock, sim.agent_count);

    let started = Instant::now();
    for frame in 0..sim.frames {
        let t = frame as f32 * sim.dt;
        let target = orbit_target(t, sim.world_radius * 0.5);
        let inputs = gather_inputs(flock.agents(), target);

        match flock.step(&field, &inputs, sim.dt) {
            Ok(FrameOutcome::Completed(_)) => {}
            Ok(FrameOutcome::Skipped(e)) => warn!("Frame {} skipped: {}", frame, e),
            Ok(FrameOutcome::HeldHeading(e)) => warn!("Frame {} held headings: {}", frame, e),
            Err(e) => {
                error!("Frame {} failed: {}", frame, e);
                return Err(e.into());
            }
        }

        if frame > 0 && frame % LOG_EVERY_FRAMES == 0 {
            info!(
                "frame={} queries/frame={:.1} p95={}us",
                frame,
                metrics.queries_per_frame(),
                metrics.frame_time_p95_us.load(std::sync::atomic::Ordering::Relaxed)
            );
        }
    }

    info!(
        "Finished {} frames in {:.2}s",
        sim.frames,
        started.elapsed().as_secs_f32()
    );
    println!("{}", metrics.to_prometheus());

    Ok(())
}

/// Point circling the world center in the horizontal plane
fn orbit_target(t: f32, radius: f32) -> Vec3 {
    let angle = t / TARGET_ORBIT_PERIOD * std::f32::consts::TAU;
    Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius)
}

/// Brute-force neighbour aggregation for the demo flock
fn gather_inputs(agents: &[Agent], target: Vec3) -> Vec<FlockInputs> {
    let perception_sq = PERCEPTION_RADIUS * PERCEPTION_RADIUS;
    let crowding_sq = CROWDING_RADIUS * CROWDING_RADIUS;

    agents
        .iter()
        .enumerate()
        .map(|(i, agent)| {
            let mut inputs = FlockInputs::alone().with_target(target);
            let mut crowding = 0u32;

            for (j, other) in agents.iter().enumerate() {
                if i == j {
                    continue;
                }
                let offset = other.position - agent.position;
                let dist_sq = offset.length_sq();
                if dist_sq >= perception_sq {
                    continue;
                }

                inputs.neighbor_count += 1;
                inputs.avg_neighbor_heading += other.heading;
                inputs.neighbor_centroid_sum += other.position;

                if dist_sq < crowding_sq && dist_sq > 0.0 {
                    inputs.separation_heading -= offset / dist_sq;
                    crowding += 1;
                }
            }

            if inputs.neighbor_count > 0 {
                inputs.avg_neighbor_heading /= inputs.neighbor_count as f32;
            }
            if crowding > 0 {
                inputs.separation_heading /= crowding as f32;
            }
            inputs
        })
        .collect()
}
