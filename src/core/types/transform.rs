//! Rigid transform type and helpers.
//!
//! A transform is a proper rigid motion (rotation + translation) expressed
//! as an isometry. Non-rigid transforms are unrepresentable, so callers
//! never need to validate rigidity at runtime.

use nalgebra::{Isometry3, Point3, Vector3};

/// A 3D rigid transform (right-handed, rotation + translation).
pub type Transform = Isometry3<f64>;

/// Apply the full rigid transform (rotation and translation) to a point.
#[inline]
pub fn transform_point(t: &Transform, p: &Vector3<f64>) -> Vector3<f64> {
    t.transform_point(&Point3::from(*p)).coords
}

/// Pure-translation transform, mostly useful in tests.
#[inline]
pub fn translation(x: f64, y: f64, z: f64) -> Transform {
    Transform::translation(x, y, z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;

    #[test]
    fn test_transform_point_translation() {
        let t = translation(1.0, 2.0, 3.0);
        let p = transform_point(&t, &Vector3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.x, 2.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 2.0, epsilon = 1e-12);
        assert_relative_eq!(p.z, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_transform_roundtrip() {
        let t = Transform::from_parts(
            Vector3::new(0.5, -1.0, 2.0).into(),
            UnitQuaternion::from_euler_angles(0.3, -0.2, 1.1),
        );
        let p = Vector3::new(4.0, -2.0, 0.7);
        let back = transform_point(&t.inverse(), &transform_point(&t, &p));
        assert_relative_eq!(back.x, p.x, epsilon = 1e-10);
        assert_relative_eq!(back.y, p.y, epsilon = 1e-10);
        assert_relative_eq!(back.z, p.z, epsilon = 1e-10);
    }
}
