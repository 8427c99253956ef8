//! Orthonormal orientation frame derived from a heading
//!
//! Candidate avoidance directions are authored in agent-local space
//! (+Z forward, +Y up, +X right). `Basis` maps them into world space.

use super::vec3::Vec3;

/// Below this the heading is treated as parallel to world up
const PARALLEL_EPSILON: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Basis {
    pub right: Vec3,
    pub up: Vec3,
    pub forward: Vec3,
}

impl Basis {
    pub const IDENTITY: Basis = Basis {
        right: Vec3::RIGHT,
        up: Vec3::UP,
        forward: Vec3::FORWARD,
    };

    /// Frame looking along `forward` with world up as the roll reference.
    ///
    /// When `forward` is (anti)parallel to world up, -Z is used as the
    /// reference instead. A zero `forward` yields the identity frame.
    pub fn look_rotation(forward: Vec3) -> Self {
        let Some(forward) = forward.try_normalize() else {
            return Self::IDENTITY;
        };

        let reference = if Vec3::UP.cross(forward).length() > PARALLEL_EPSILON {
            Vec3::UP
        } else {
            Vec3::new(0.0, 0.0, -1.0)
        };
        let right = reference.cross(forward).normalize();
        let up = forward.cross(right);

        Self { right, up, forward }
    }

    /// Local-to-world direction transform
    #[inline]
    pub fn transform_direction(&self, local: Vec3) -> Vec3 {
        self.right * local.x + self.up * local.y + self.forward * local.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    fn assert_orthonormal(b: &Basis) {
        assert!((b.right.length() - 1.0).abs() < EPSILON);
        assert!((b.up.length() - 1.0).abs() < EPSILON);
        assert!((b.forward.length() - 1.0).abs() < EPSILON);
        assert!(b.right.dot(b.up).abs() < EPSILON);
        assert!(b.right.dot(b.forward).abs() < EPSILON);
        assert!(b.up.dot(b.forward).abs() < EPSILON);
    }

    #[test]
    fn test_identity_for_world_forward() {
        let b = Basis::look_rotation(Vec3::FORWARD);
        assert!(b.right.approx_eq(Vec3::RIGHT, EPSILON));
        assert!(b.up.approx_eq(Vec3::UP, EPSILON));
        assert!(b.forward.approx_eq(Vec3::FORWARD, EPSILON));
    }

    #[test]
    fn test_local_forward_maps_to_heading() {
        let heading = Vec3::new(1.0, 2.0, -3.0).normalize();
        let b = Basis::look_rotation(heading);
        assert_orthonormal(&b);
        assert!(b.transform_direction(Vec3::FORWARD).approx_eq(heading, EPSILON));
    }

    #[test]
    fn test_heading_along_world_up() {
        for heading in [Vec3::UP, -Vec3::UP] {
            let b = Basis::look_rotation(heading);
            assert_orthonormal(&b);
            assert!(b.forward.approx_eq(heading, EPSILON));
        }
    }

    #[test]
    fn test_transform_preserves_length() {
        let b = Basis::look_rotation(Vec3::new(-0.3, 0.1, 0.9));
        let local = Vec3::new(0.6, 0.0, 0.8);
        assert!((b.transform_direction(local).length() - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_zero_heading_is_identity() {
        assert_eq!(Basis::look_rotation(Vec3::ZERO), Basis::IDENTITY);
    }
}
