//! Ordered candidate directions for the avoidance search
//!
//! Directions live in agent-local space (+Z forward). Index 0 is the closest
//! to forward and the angular offset grows with the index, so the search
//! accepts the least deviating clear heading first.

use std::f32::consts::PI;
use std::sync::Arc;

use crate::config::ConfigError;
use crate::util::vec3::Vec3;

/// Immutable, validated table of unit directions.
///
/// Cheap to clone; the table is shared between the flock settings and any
/// single-agent updates.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateDirections {
    dirs: Arc<[Vec3]>,
}

impl CandidateDirections {
    /// Build from an explicit table. Directions are normalized; a zero or
    /// non-finite entry rejects the whole table.
    pub fn new(dirs: Vec<Vec3>) -> Result<Self, ConfigError> {
        if dirs.is_empty() {
            return Err(ConfigError::EmptyDirections);
        }

        let mut normalized = Vec::with_capacity(dirs.len());
        for (index, dir) in dirs.into_iter().enumerate() {
            match dir.try_normalize() {
                Some(unit) => normalized.push(unit),
                None => return Err(ConfigError::DegenerateDirection { index }),
            }
        }

        Ok(Self { dirs: normalized.into() })
    }

    /// Points spread over the unit sphere along a golden-ratio spiral,
    /// starting at straight ahead and ending straight behind.
    pub fn golden_spiral(count: usize) -> Result<Self, ConfigError> {
        if count == 0 {
            return Err(ConfigError::EmptyDirections);
        }

        let golden_ratio = (1.0 + 5.0_f32.sqrt()) / 2.0;
        let angle_increment = PI * 2.0 * golden_ratio;

        let dirs = (0..count)
            .map(|i| {
                let t = i as f32 / count as f32;
                let inclination = (1.0 - 2.0 * t).acos();
                let azimuth = angle_increment * i as f32;
                Vec3::new(
                    inclination.sin() * azimuth.cos(),
                    inclination.sin() * azimuth.sin(),
                    inclination.cos(),
                )
            })
            .collect();

        Self::new(dirs)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    /// Always false for a constructed table
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<Vec3> {
        self.dirs.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.dirs.iter().copied()
    }
}

impl Default for CandidateDirections {
    fn default() -> Self {
        use crate::flock::constants::avoidance::CANDIDATE_DIRECTIONS;
        Self::golden_spiral(CANDIDATE_DIRECTIONS).unwrap_or_else(|_| Self {
            dirs: Arc::from([Vec3::FORWARD]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    #[test]
    fn test_golden_spiral_starts_forward() {
        let dirs = CandidateDirections::golden_spiral(300).unwrap();
        assert_eq!(dirs.len(), 300);
        assert!(dirs.get(0).unwrap().approx_eq(Vec3::FORWARD, EPSILON));
    }

    #[test]
    fn test_golden_spiral_is_unit_length() {
        let dirs = CandidateDirections::golden_spiral(64).unwrap();
        for d in dirs.iter() {
            assert!((d.length() - 1.0).abs() < EPSILON, "not unit: {:?}", d);
        }
    }

    #[test]
    fn test_golden_spiral_moves_away_from_forward() {
        // Forward component falls monotonically with the index
        let dirs = CandidateDirections::golden_spiral(50).unwrap();
        let zs: Vec<f32> = dirs.iter().map(|d| d.z).collect();
        for pair in zs.windows(2) {
            assert!(pair[1] < pair[0], "{} should be below {}", pair[1], pair[0]);
        }
    }

    #[test]
    fn test_empty_table_rejected() {
        assert!(matches!(
            CandidateDirections::new(Vec::new()),
            Err(ConfigError::EmptyDirections)
        ));
        assert!(matches!(
            CandidateDirections::golden_spiral(0),
            Err(ConfigError::EmptyDirections)
        ));
    }

    #[test]
    fn test_zero_direction_rejected() {
        let result = CandidateDirections::new(vec![Vec3::FORWARD, Vec3::ZERO]);
        assert!(matches!(
            result,
            Err(ConfigError::DegenerateDirection { index: 1 })
        ));
    }

    #[test]
    fn test_explicit_table_is_normalized() {
        let dirs = CandidateDirections::new(vec![Vec3::new(0.0, 0.0, 5.0)]).unwrap();
        assert_eq!(dirs.get(0), Some(Vec3::FORWARD));
        assert_eq!(dirs.get(1), None);
    }

    #[test]
    fn test_default_table() {
        let dirs = CandidateDirections::default();
        assert_eq!(dirs.len(), 300);
    }
}
