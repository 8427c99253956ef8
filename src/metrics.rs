//! Avoidance and frame metrics
//!
//! Counters are updated by the frame driver and can be rendered in
//! Prometheus text format for scraping or logging.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::flock::systems::avoidance::AvoidanceReport;

/// Frame time samples kept for percentiles
const FRAME_HISTORY_LEN: usize = 1000;

#[derive(Debug)]
pub struct AvoidanceMetrics {
    // Frames
    pub frames: AtomicU64,
    pub frames_failed: AtomicU64,
    pub frames_skipped: AtomicU64,
    pub frames_held: AtomicU64,

    // Query volume
    pub batches: AtomicU64,
    pub precheck_queries: AtomicU64,
    pub search_queries: AtomicU64,

    // Resolution outcomes
    pub agents_clear: AtomicU64,
    pub agents_steered: AtomicU64,
    pub agents_fallback: AtomicU64,

    pub agent_count: AtomicU64,

    // Frame timing (microseconds)
    pub frame_time_us: AtomicU64,
    pub frame_time_p95_us: AtomicU64,
    pub frame_time_p99_us: AtomicU64,
    pub frame_time_max_us: AtomicU64,

    start_time: Instant,

    // Rolling frame times for percentile calculation
    frame_history: RwLock<VecDeque<u64>>,
}

impl AvoidanceMetrics {
    pub fn new() -> Self {
        Self {
            frames: AtomicU64::new(0),
            frames_failed: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
            frames_held: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            precheck_queries: AtomicU64::new(0),
            search_queries: AtomicU64::new(0),
            agents_clear: AtomicU64::new(0),
            agents_steered: AtomicU64::new(0),
            agents_fallback: AtomicU64::new(0),
            agent_count: AtomicU64::new(0),
            frame_time_us: AtomicU64::new(0),
            frame_time_p95_us: AtomicU64::new(0),
            frame_time_p99_us: AtomicU64::new(0),
            frame_time_max_us: AtomicU64::new(0),
            start_time: Instant::now(),
            frame_history: RwLock::new(VecDeque::with_capacity(FRAME_HISTORY_LEN)),
        }
    }

    /// Accumulate the query volume and outcomes of one resolver pass
    pub fn record_report(&self, report: &AvoidanceReport) {
        self.batches.fetch_add(report.batches() as u64, Ordering::Relaxed);
        self.precheck_queries.fetch_add(report.precheck_size as u64, Ordering::Relaxed);
        self.search_queries.fetch_add(report.search_queries() as u64, Ordering::Relaxed);
        self.agents_clear.fetch_add(report.clear as u64, Ordering::Relaxed);
        self.agents_steered.fetch_add(report.steered as u64, Ordering::Relaxed);
        self.agents_fallback.fetch_add(report.fallback as u64, Ordering::Relaxed);
    }

    pub fn record_failed_frame(&self) {
        self.frames_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_frame(&self) {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_held_frame(&self) {
        self.frames_held.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an integrated frame and update percentiles
    pub fn record_frame_time(&self, duration: Duration, agents: usize) {
        let us = duration.as_micros() as u64;
        self.frame_time_us.store(us, Ordering::Relaxed);
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.agent_count.store(agents as u64, Ordering::Relaxed);

        let mut history = self.frame_history.write();
        history.push_back(us);
        while history.len() > FRAME_HISTORY_LEN {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.frame_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.frame_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.frame_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Mean sweep queries per integrated frame
    pub fn queries_per_frame(&self) -> f64 {
        let frames = self.frames.load(Ordering::Relaxed);
        if frames == 0 {
            return 0.0;
        }
        let queries = self.precheck_queries.load(Ordering::Relaxed)
            + self.search_queries.load(Ordering::Relaxed);
        queries as f64 / frames as f64
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("skyflock_frames_total", "Frames integrated", "counter",
            self.frames.load(Ordering::Relaxed));
        metric!("skyflock_frames_failed_total", "Frames aborted by an avoidance failure", "counter",
            self.frames_failed.load(Ordering::Relaxed));
        metric!("skyflock_frames_skipped_total", "Frames skipped after an avoidance failure", "counter",
            self.frames_skipped.load(Ordering::Relaxed));
        metric!("skyflock_frames_held_total", "Frames integrated with held headings after a failure", "counter",
            self.frames_held.load(Ordering::Relaxed));

        metric!("skyflock_sweep_batches_total", "Sweep batches submitted", "counter",
            self.batches.load(Ordering::Relaxed));
        metric!("skyflock_precheck_queries_total", "Heading pre-check sweeps", "counter",
            self.precheck_queries.load(Ordering::Relaxed));
        metric!("skyflock_search_queries_total", "Candidate direction sweeps", "counter",
            self.search_queries.load(Ordering::Relaxed));

        metric!("skyflock_agents_clear_total", "Agents with a clear heading", "counter",
            self.agents_clear.load(Ordering::Relaxed));
        metric!("skyflock_agents_steered_total", "Agents resolved on a candidate direction", "counter",
            self.agents_steered.load(Ordering::Relaxed));
        metric!("skyflock_agents_fallback_total", "Agents that exhausted every candidate", "counter",
            self.agents_fallback.load(Ordering::Relaxed));
        metric!("skyflock_agents", "Agents in the flock", "gauge",
            self.agent_count.load(Ordering::Relaxed));

        metric!("skyflock_frame_time_microseconds", "Last frame time", "gauge",
            self.frame_time_us.load(Ordering::Relaxed));
        metric!("skyflock_frame_time_p95_microseconds", "95th percentile frame time", "gauge",
            self.frame_time_p95_us.load(Ordering::Relaxed));
        metric!("skyflock_frame_time_p99_microseconds", "99th percentile frame time", "gauge",
            self.frame_time_p99_us.load(Ordering::Relaxed));
        metric!("skyflock_frame_time_max_microseconds", "Maximum frame time", "gauge",
            self.frame_time_max_us.load(Ordering::Relaxed));
        metric!("skyflock_uptime_seconds", "Seconds since metrics were created", "counter",
            self.uptime_seconds());

        output
    }
}

impl Default for AvoidanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = AvoidanceMetrics::new();
        assert_eq!(metrics.frames.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.batches.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.queries_per_frame(), 0.0);
    }

    #[test]
    fn test_record_report() {
        let metrics = AvoidanceMetrics::new();
        let report = AvoidanceReport {
            precheck_size: 3,
            round_sizes: vec![2, 2, 2, 1],
            clear: 1,
            steered: 1,
            fallback: 1,
        };

        metrics.record_report(&report);
        metrics.record_frame_time(Duration::from_micros(50), 3);

        assert_eq!(metrics.batches.load(Ordering::Relaxed), 5);
        assert_eq!(metrics.precheck_queries.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.search_queries.load(Ordering::Relaxed), 7);
        assert_eq!(metrics.agents_steered.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.queries_per_frame(), 10.0);
    }

    #[test]
    fn test_record_frame_time() {
        let metrics = AvoidanceMetrics::new();

        for i in 0..100 {
            metrics.record_frame_time(Duration::from_micros(100 + i * 10), 10);
        }

        assert_eq!(metrics.frames.load(Ordering::Relaxed), 100);
        assert!(metrics.frame_time_p95_us.load(Ordering::Relaxed) > 0);
        assert!(metrics.frame_time_p99_us.load(Ordering::Relaxed) > 0);
        assert_eq!(metrics.frame_time_max_us.load(Ordering::Relaxed), 1090);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = AvoidanceMetrics::new();
        metrics.record_failed_frame();
        metrics.agents_clear.store(42, Ordering::Relaxed);

        let output = metrics.to_prometheus();

        assert!(output.contains("skyflock_frames_failed_total 1"));
        assert!(output.contains("skyflock_agents_clear_total 42"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE skyflock_agents gauge"));
    }
}
