//! Rigid-body transform primitives: thin, `Copy` wrappers over `nalgebra`.
//!
//! This module does not reimplement vector/quaternion math; it adapts `nalgebra`'s
//! `Vector3`/`UnitQuaternion`/`Isometry3` to the exact shape the rest of the crate needs
//! (composition order, column-major matrix export, epsilon equality).

use nalgebra::{Isometry3, Matrix4, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// A point or direction in 3-space.
pub type Vec3 = Vector3<f64>;

/// A unit quaternion rotation. `q` and `-q` represent the same rotation.
pub type Rotation = UnitQuaternion<f64>;

/// A rigid-body transform: a rotation followed by a translation.
///
/// Composition is associative but not commutative: `a.compose(b)` applies `a` then `b`, i.e. a
/// point in `b`'s frame is first mapped by `b`, then by `a` -- matching `nalgebra::Isometry3`'s
/// own multiplication order (`a * b`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform(pub Isometry3<f64>);

impl Transform {
    /// The identity transform: zero translation, no rotation.
    pub fn identity() -> Self {
        Self(Isometry3::identity())
    }

    pub fn new(translation: Vec3, rotation: Rotation) -> Self {
        Self(Isometry3::from_parts(translation.into(), rotation))
    }

    pub fn translation(&self) -> Vec3 {
        self.0.translation.vector
    }

    pub fn rotation(&self) -> Rotation {
        self.0.rotation
    }

    /// Composes two transforms: `other` is applied first, then `self` -- the same order as
    /// `nalgebra::Isometry3`'s `*` and ordinary matrix multiplication (`self.matrix *
    /// other.matrix`). For a frame whose world transform is `self` and whose local transform to
    /// a child is `other`, `self.compose(other)` is that child's world transform.
    pub fn compose(&self, other: &Transform) -> Transform {
        Transform(self.0 * other.0)
    }

    /// The inverse transform `t^-1`, such that `t.compose(&t.invert())` is the identity.
    pub fn invert(&self) -> Transform {
        Transform(self.0.inverse())
    }

    /// Rotates then translates a point.
    pub fn apply(&self, p: Vec3) -> Vec3 {
        self.0.transform_point(&p.into()).coords
    }

    /// A 16-element column-major matrix, suitable for external renderers.
    pub fn to_mat4(&self) -> [f64; 16] {
        let m: Matrix4<f64> = self.0.to_homogeneous();
        let mut out = [0.0; 16];
        out.copy_from_slice(m.as_slice());
        out
    }

    /// Decomposes a column-major 4x4 matrix back into a rigid transform.
    ///
    /// The rotation is extracted from the upper-left 3x3 block and orthonormalized via
    /// quaternion conversion; translation is read from the last column.
    pub fn from_mat4(m: &[f64; 16]) -> Transform {
        let mat = Matrix4::from_column_slice(m);
        let translation = Translation3::new(mat[(0, 3)], mat[(1, 3)], mat[(2, 3)]);
        let rotation_matrix = mat.fixed_view::<3, 3>(0, 0).into_owned();
        let rotation = Rotation::from_matrix(&rotation_matrix);
        Transform(Isometry3::from_parts(translation, rotation))
    }

    /// Approximate equality: translation within `eps`, rotation within `eps` (comparing `|dot|`
    /// against 1, since `q` and `-q` denote the same rotation).
    pub fn approx_eq(&self, other: &Transform, eps: f64) -> bool {
        let dt = (self.translation() - other.translation()).norm();
        let dot = self.rotation().quaternion().dot(other.rotation().quaternion());
        dt <= eps && (dot.abs() - 1.0).abs() <= eps
    }
}

/// Component-wise linear interpolation between two vectors.
pub fn lerp(a: Vec3, b: Vec3, alpha: f64) -> Vec3 {
    a + (b - a) * alpha
}

/// Shortest-arc spherical linear interpolation between two rotations.
///
/// Delegates to `nalgebra`'s own `slerp`, which already negates one operand when their dot
/// product is negative so a 180-degree interpolation doesn't take the long way round.
pub fn slerp(a: Rotation, b: Rotation, alpha: f64) -> Rotation {
    a.slerp(&b, alpha)
}

/// Linear interpolation between two rigid transforms: `lerp` on translation, `slerp` on rotation.
pub fn interpolate(a: &Transform, b: &Transform, alpha: f64) -> Transform {
    Transform::new(
        lerp(a.translation(), b.translation(), alpha),
        slerp(a.rotation(), b.rotation(), alpha),
    )
}

/// Serializable, plain-data mirror of [`Transform`] used at the snapshot boundary (§6.2).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransformRecord {
    pub translation: [f64; 3],
    pub rotation: [f64; 4],
}

impl From<&Transform> for TransformRecord {
    fn from(t: &Transform) -> Self {
        let tr = t.translation();
        let q = t.rotation().quaternion();
        TransformRecord {
            translation: [tr.x, tr.y, tr.z],
            rotation: [q.i, q.j, q.k, q.w],
        }
    }
}

impl From<&TransformRecord> for Transform {
    fn from(r: &TransformRecord) -> Self {
        let translation = Vec3::new(r.translation[0], r.translation[1], r.translation[2]);
        let rotation = Rotation::from_quaternion(nalgebra::Quaternion::new(
            r.rotation[3],
            r.rotation[0],
            r.rotation[1],
            r.rotation[2],
        ));
        Transform::new(translation, rotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn identity_round_trips_through_mat4() {
        let t = Transform::identity();
        let m = t.to_mat4();
        let back = Transform::from_mat4(&m);
        assert!(t.approx_eq(&back, 1e-9));
    }

    #[test]
    fn invert_cancels_compose() {
        let t = Transform::new(Vec3::new(1.0, 2.0, 3.0), Rotation::from_axis_angle(&Vec3::z_axis(), 0.7));
        let identity = t.compose(&t.invert());
        assert!(identity.approx_eq(&Transform::identity(), 1e-9));
    }

    #[test]
    fn rotate_90_about_z() {
        let t = Transform::new(Vec3::zeros(), Rotation::from_axis_angle(&Vec3::z_axis(), FRAC_PI_2));
        let p = t.apply(Vec3::new(1.0, 0.0, 0.0));
        assert_abs_diff_eq!(p.x, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.y, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn slerp_takes_shortest_arc() {
        let a = Rotation::from_axis_angle(&Vec3::z_axis(), 0.0);
        let b = Rotation::from_axis_angle(&Vec3::z_axis(), std::f64::consts::PI - 0.01);
        let mid = slerp(a, b, 0.5);
        // shortest-arc midpoint should be close to half the small angle, not wrap the long way.
        let angle = mid.angle();
        assert!(angle < std::f64::consts::FRAC_PI_2 + 0.1);
    }

    #[test]
    fn lerp_is_componentwise() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(10.0, 0.0, 0.0);
        let mid = lerp(a, b, 0.5);
        assert_abs_diff_eq!(mid.x, 5.0);
    }

    #[test]
    fn transform_record_round_trips() {
        let t = Transform::new(Vec3::new(1.0, -2.0, 3.5), Rotation::from_axis_angle(&Vec3::y_axis(), 1.2));
        let record = TransformRecord::from(&t);
        let back: Transform = (&record).into();
        assert!(t.approx_eq(&back, 1e-9));
    }
}
