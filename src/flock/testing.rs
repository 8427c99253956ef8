//! Deterministic query engine for unit tests

use std::time::Duration;

use parking_lot::Mutex;

use crate::flock::systems::query_batch::{
    QueryDispatchError, SpatialQueryEngine, SweepBatch, SweepHit, SweepQuery,
};

type HitFn = Box<dyn Fn(&SweepQuery) -> bool + Send + Sync>;

/// Answers each sweep with a fixed rule and records every batch it sees
pub struct ScriptedEngine {
    hit: HitFn,
    log: Mutex<Vec<SweepBatch>>,
    fail_on_batch: Option<usize>,
    truncate_by: usize,
    delay: Option<Duration>,
}

impl ScriptedEngine {
    pub fn new(hit: impl Fn(&SweepQuery) -> bool + Send + Sync + 'static) -> Self {
        Self {
            hit: Box::new(hit),
            log: Mutex::new(Vec::new()),
            fail_on_batch: None,
            truncate_by: 0,
            delay: None,
        }
    }

    /// The n-th submitted batch (0-based) reports the engine as unavailable
    pub fn failing_on_batch(mut self, n: usize) -> Self {
        self.fail_on_batch = Some(n);
        self
    }

    /// Drop `k` results from the end of every answer
    pub fn truncating_results(mut self, k: usize) -> Self {
        self.truncate_by = k;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn batches(&self) -> Vec<SweepBatch> {
        self.log.lock().clone()
    }

    pub fn batch_count(&self) -> usize {
        self.log.lock().len()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.log.lock().iter().map(SweepBatch::len).collect()
    }

    /// Origins swept in the n-th batch, in submission order
    pub fn origins(&self, n: usize) -> Vec<[f32; 3]> {
        self.log.lock()[n]
            .queries
            .iter()
            .map(|q| [q.origin.x, q.origin.y, q.origin.z])
            .collect()
    }
}

impl SpatialQueryEngine for ScriptedEngine {
    fn submit_sweep_batch(&self, batch: &SweepBatch) -> Result<Vec<SweepHit>, QueryDispatchError> {
        let index = {
            let mut log = self.log.lock();
            log.push(batch.clone());
            log.len() - 1
        };

        if self.fail_on_batch == Some(index) {
            return Err(QueryDispatchError::Unavailable(format!("scripted failure on batch {}", index)));
        }

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let mut results: Vec<SweepHit> = batch
            .queries
            .iter()
            .map(|q| SweepHit { hit: (self.hit)(q) })
            .collect();
        let keep = results.len().saturating_sub(self.truncate_by);
        results.truncate(keep);
        Ok(results)
    }
}
