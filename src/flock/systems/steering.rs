use crate::util::vec3::Vec3;

/// Steering force turning `velocity` toward `desired` at full speed.
///
/// The force is `normalize(desired) * max_speed - velocity`, capped at
/// `max_steer_force`. Returns `None` when `desired` has no direction; the
/// caller drops the term.
#[inline]
pub fn steer_towards(
    desired: Vec3,
    velocity: Vec3,
    max_speed: f32,
    max_steer_force: f32,
) -> Option<Vec3> {
    let dir = desired.try_normalize()?;
    Some((dir * max_speed - velocity).clamp_length(max_steer_force))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    #[test]
    fn test_zero_desired_has_no_force() {
        assert!(steer_towards(Vec3::ZERO, Vec3::FORWARD, 5.0, 3.0).is_none());
    }

    #[test]
    fn test_small_correction_is_not_clamped() {
        // Desired velocity (0,0,5), current (0,0,4) -> raw force (0,0,1)
        let force = steer_towards(Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, 4.0), 5.0, 3.0)
            .unwrap();
        assert!(force.approx_eq(Vec3::new(0.0, 0.0, 1.0), EPSILON));
    }

    #[test]
    fn test_large_correction_is_clamped_preserving_direction() {
        // Reverse direction: raw force (0,0,-10) capped to length 3
        let force = steer_towards(-Vec3::FORWARD, Vec3::new(0.0, 0.0, 5.0), 5.0, 3.0).unwrap();
        assert!((force.length() - 3.0).abs() < EPSILON);
        assert!(force.approx_eq(Vec3::new(0.0, 0.0, -3.0), EPSILON));
    }

    #[test]
    fn test_magnitude_never_exceeds_max_steer_force() {
        let desired = [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(-3.0, 2.0, 7.0),
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(100.0, 100.0, -100.0),
        ];
        let velocities = [
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::new(-4.0, 1.0, 0.5),
        ];
        for &d in &desired {
            for &v in &velocities {
                let force = steer_towards(d, v, 5.0, 0.75).unwrap();
                assert!(force.length() <= 0.75 + EPSILON, "{:?} too strong", force);
            }
        }
    }

    #[test]
    fn test_desired_magnitude_is_ignored() {
        let a = steer_towards(Vec3::new(0.0, 1.0, 0.0), Vec3::ZERO, 2.0, 10.0).unwrap();
        let b = steer_towards(Vec3::new(0.0, 50.0, 0.0), Vec3::ZERO, 2.0, 10.0).unwrap();
        assert!(a.approx_eq(b, EPSILON));
        assert!(a.approx_eq(Vec3::new(0.0, 2.0, 0.0), EPSILON));
    }
}
