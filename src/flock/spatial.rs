//! Spatial hash grid of sphere obstacles
//!
//! Reference in-process implementation of `SpatialQueryEngine`. Obstacles
//! are stored in every cell their bounding box touches; a sweep only tests
//! obstacles in the cells covered by the swept capsule's bounding box.
//! Obstacles spanning more than `MAX_CELLS_PER_OBSTACLE` cells live in a
//! separate list that every sweep tests.

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
#[cfg(feature = "parallel_queries")]
use rayon::prelude::*;

use crate::flock::systems::query_batch::{
    QueryDispatchError, SpatialQueryEngine, SweepBatch, SweepHit, SweepQuery,
};
use crate::util::vec3::Vec3;

/// Default cell size for the obstacle grid (world units)
/// Should be around the typical obstacle diameter
pub const OBSTACLE_GRID_CELL_SIZE: f32 = 4.0;

/// Initial capacity for grid cells (number of expected non-empty cells)
const OBSTACLE_GRID_INITIAL_CAPACITY: usize = 256;

/// Initial capacity for obstacle lists within cells
const OBSTACLE_CELL_INITIAL_CAPACITY: usize = 4;

/// Obstacles covering more cells than this skip the grid
const MAX_CELLS_PER_OBSTACLE: u64 = 512;

/// Layer given to obstacles inserted without an explicit one
pub const DEFAULT_OBSTACLE_LAYER: u32 = 1;

/// Grid cell key - (x, y, z) cell coordinates
pub type CellKey = (i32, i32, i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObstacleId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    pub id: ObstacleId,
    pub center: Vec3,
    pub radius: f32,
    /// Layer bits matched against a sweep's mask
    pub layer: u32,
}

impl Obstacle {
    /// Does a sphere of `radius` swept along the query segment touch this
    /// obstacle? A sweep starting inside the obstacle counts as a hit.
    pub fn blocks(&self, query: &SweepQuery) -> bool {
        if self.layer & query.layer_mask == 0 {
            return false;
        }

        let reach = self.radius + query.radius;
        let to_center = self.center - query.origin;

        let closest = match query.direction.try_normalize() {
            Some(dir) => {
                let t = to_center.dot(dir).clamp(0.0, query.max_distance.max(0.0));
                query.origin + dir * t
            }
            None => query.origin,
        };

        closest.distance_sq_to(self.center) <= reach * reach
    }
}

/// Static and moving sphere obstacles indexed for sweep queries
pub struct ObstacleField {
    /// Inverse cell size for fast position-to-cell conversion
    inv_cell_size: f32,
    obstacles: HashMap<ObstacleId, Obstacle>,
    /// Map from cell key to obstacles overlapping that cell
    cells: HashMap<CellKey, Vec<ObstacleId>>,
    /// Obstacles too large to index cell by cell
    oversized: Vec<ObstacleId>,
    next_id: u32,
}

impl ObstacleField {
    pub fn new(cell_size: f32) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            OBSTACLE_GRID_CELL_SIZE
        };
        Self {
            inv_cell_size: 1.0 / cell_size,
            obstacles: HashMap::new(),
            cells: HashMap::with_capacity(OBSTACLE_GRID_INITIAL_CAPACITY),
            oversized: Vec::new(),
            next_id: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }

    pub fn get(&self, id: ObstacleId) -> Option<&Obstacle> {
        self.obstacles.get(&id)
    }

    /// Insert an obstacle on the default layer
    pub fn insert(&mut self, center: Vec3, radius: f32) -> ObstacleId {
        self.insert_on_layer(center, radius, DEFAULT_OBSTACLE_LAYER)
    }

    pub fn insert_on_layer(&mut self, center: Vec3, radius: f32, layer: u32) -> ObstacleId {
        let id = ObstacleId(self.next_id);
        self.next_id += 1;
        let obstacle = Obstacle {
            id,
            center,
            radius: radius.abs(),
            layer,
        };
        self.index(&obstacle);
        self.obstacles.insert(id, obstacle);
        id
    }

    /// Move an obstacle, re-indexing it. Returns false for an unknown id.
    pub fn move_obstacle(&mut self, id: ObstacleId, center: Vec3) -> bool {
        let Some(mut obstacle) = self.obstacles.get(&id).copied() else {
            return false;
        };
        self.unindex(&obstacle);
        obstacle.center = center;
        self.index(&obstacle);
        self.obstacles.insert(id, obstacle);
        true
    }

    pub fn remove(&mut self, id: ObstacleId) -> bool {
        match self.obstacles.remove(&id) {
            Some(obstacle) => {
                self.unindex(&obstacle);
                true
            }
            None => false,
        }
    }

    /// Convert world position to cell key
    #[inline]
    fn position_to_cell(&self, position: Vec3) -> CellKey {
        (
            (position.x * self.inv_cell_size).floor() as i32,
            (position.y * self.inv_cell_size).floor() as i32,
            (position.z * self.inv_cell_size).floor() as i32,
        )
    }

    /// Cells overlapped by the box [min, max]
    fn cell_range(&self, min: Vec3, max: Vec3) -> (CellKey, CellKey) {
        (self.position_to_cell(min), self.position_to_cell(max))
    }

    fn cells_in_range(lo: CellKey, hi: CellKey) -> u64 {
        let span = |a: i32, b: i32| (i64::from(b) - i64::from(a) + 1).max(0) as u64;
        span(lo.0, hi.0)
            .saturating_mul(span(lo.1, hi.1))
            .saturating_mul(span(lo.2, hi.2))
    }

    fn for_each_cell(lo: CellKey, hi: CellKey, mut f: impl FnMut(CellKey)) {
        for x in lo.0..=hi.0 {
            for y in lo.1..=hi.1 {
                for z in lo.2..=hi.2 {
                    f((x, y, z));
                }
            }
        }
    }

    fn obstacle_bounds(obstacle: &Obstacle) -> (Vec3, Vec3) {
        let r = Vec3::new(obstacle.radius, obstacle.radius, obstacle.radius);
        (obstacle.center - r, obstacle.center + r)
    }

    fn index(&mut self, obstacle: &Obstacle) {
        let (min, max) = Self::obstacle_bounds(obstacle);
        let (lo, hi) = self.cell_range(min, max);
        let id = obstacle.id;
        if Self::cells_in_range(lo, hi) > MAX_CELLS_PER_OBSTACLE {
            self.oversized.push(id);
            return;
        }
        let cells = &mut self.cells;
        Self::for_each_cell(lo, hi, |key| {
            cells
                .entry(key)
                .or_insert_with(|| Vec::with_capacity(OBSTACLE_CELL_INITIAL_CAPACITY))
                .push(id);
        });
    }

    fn unindex(&mut self, obstacle: &Obstacle) {
        let (min, max) = Self::obstacle_bounds(obstacle);
        let (lo, hi) = self.cell_range(min, max);
        let id = obstacle.id;
        if Self::cells_in_range(lo, hi) > MAX_CELLS_PER_OBSTACLE {
            self.oversized.retain(|&other| other != id);
            return;
        }
        let cells = &mut self.cells;
        Self::for_each_cell(lo, hi, |key| {
            if let Entry::Occupied(mut entry) = cells.entry(key) {
                entry.get_mut().retain(|&other| other != id);
                if entry.get().is_empty() {
                    entry.remove();
                }
            }
        });
    }

    /// Does the sweep hit any obstacle?
    pub fn sweep(&self, query: &SweepQuery) -> bool {
        if self.obstacles.is_empty() {
            return false;
        }

        let end = match query.direction.try_normalize() {
            Some(dir) => query.origin + dir * query.max_distance.max(0.0),
            None => query.origin,
        };
        let pad = Vec3::new(query.radius, query.radius, query.radius);
        let (lo, hi) = self.cell_range(query.origin.min(end) - pad, query.origin.max(end) + pad);

        // Long sweeps over a sparse field: testing everything is cheaper
        if Self::cells_in_range(lo, hi) > self.obstacles.len() as u64 {
            return self.obstacles.values().any(|o| o.blocks(query));
        }

        let mut hit = self
            .oversized
            .iter()
            .filter_map(|id| self.obstacles.get(id))
            .any(|o| o.blocks(query));
        Self::for_each_cell(lo, hi, |key| {
            if hit {
                return;
            }
            if let Some(cell) = self.cells.get(&key) {
                hit = cell
                    .iter()
                    .filter_map(|id| self.obstacles.get(id))
                    .any(|o| o.blocks(query));
            }
        });
        hit
    }
}

impl Default for ObstacleField {
    fn default() -> Self {
        Self::new(OBSTACLE_GRID_CELL_SIZE)
    }
}

impl SpatialQueryEngine for ObstacleField {
    fn submit_sweep_batch(&self, batch: &SweepBatch) -> Result<Vec<SweepHit>, QueryDispatchError> {
        #[cfg(feature = "parallel_queries")]
        let results: Vec<SweepHit> = batch
            .queries
            .par_iter()
            .with_min_len(batch.min_commands_per_job.max(1))
            .map(|q| SweepHit { hit: self.sweep(q) })
            .collect();

        #[cfg(not(feature = "parallel_queries"))]
        let results: Vec<SweepHit> = batch
            .queries
            .iter()
            .map(|q| SweepHit { hit: self.sweep(q) })
            .collect();

        Ok(results)
    }
}
