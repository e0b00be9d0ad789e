//! SE(3) rigid-body transform used for all poses in the system.
//!
//! Poses are stored as a unit quaternion plus a translation vector rather
//! than a 4×4 matrix; the matrix form is materialized only at serialization
//! boundaries (trajectory export).

use nalgebra::{Matrix4, UnitQuaternion, Vector3};

/// A rigid-body transform (rotation + translation).
///
/// The naming convention is `a_to_b`: a transform that maps points expressed
/// in frame `a` into frame `b`, so `p_b = a_to_b.transform_point(&p_a)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Create a transform from a rotation and a translation.
    pub fn from_parts(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Create a pure translation.
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation,
        }
    }

    /// The inverse transform: if `self` maps a→b, the result maps b→a.
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            translation: -(rotation * self.translation),
            rotation,
        }
    }

    /// Compose with another transform: `self ∘ other`.
    ///
    /// If `other` maps a→b and `self` maps b→c, the result maps a→c.
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Apply the transform to a point.
    pub fn transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * point + self.translation
    }

    /// The rotation expressed as a Rodrigues vector (axis scaled by angle).
    ///
    /// Its norm is the rotation magnitude in radians, which is what the
    /// motion-delta acceptance test compares against.
    pub fn rotation_vector(&self) -> Vector3<f64> {
        self.rotation.scaled_axis()
    }

    /// The homogeneous 4×4 matrix form.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        let mut matrix = Matrix4::identity();
        matrix
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(self.rotation.to_rotation_matrix().matrix());
        matrix
            .fixed_view_mut::<3, 1>(0, 3)
            .copy_from(&self.translation);
        matrix
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}
