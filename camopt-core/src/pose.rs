use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use nalgebra::{Matrix3, Matrix3x4, Matrix4, RealField, Vector3};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The rotation block of a 3x4 `[R | t]` transform.
#[inline(always)]
pub fn rotation_part<T: RealField>(transform: &Matrix3x4<T>) -> Matrix3<T> {
    transform.fixed_view::<3, 3>(0, 0).into_owned()
}

/// The translation column of a 3x4 `[R | t]` transform.
#[inline(always)]
pub fn translation_part<T: RealField>(transform: &Matrix3x4<T>) -> Vector3<T> {
    transform.column(3).into_owned()
}

/// Extends a 3x4 transform to 4x4 by appending the row `[0, 0, 0, 1]`.
pub fn to_homogeneous<T: RealField>(transform: &Matrix3x4<T>) -> Matrix4<T> {
    let mut homogeneous = Matrix4::identity();
    homogeneous
        .fixed_view_mut::<3, 4>(0, 0)
        .copy_from(transform);
    homogeneous
}

/// Chains two 3x4 transforms as if they were 4x4 homogeneous matrices, applying `b` first.
pub fn compose<T: RealField>(a: &Matrix3x4<T>, b: &Matrix3x4<T>) -> Matrix3x4<T> {
    a * to_homogeneous(b)
}

/// Inverts a rigid 3x4 transform.
///
/// The rotation block must be orthonormal; this is not checked.
pub fn inverse<T: RealField>(transform: &Matrix3x4<T>) -> Matrix3x4<T> {
    let rotation_t = rotation_part(transform).transpose();
    let translation = -(&rotation_t * translation_part(transform));
    crate::lie::from_rotation_translation(&rotation_t, &translation)
}

/// This contains a camera pose, which is a pose of the camera relative to the world.
/// This transforms camera points (with depth as `z`) into world coordinates.
/// This also tells you where the camera is located and oriented in the world.
///
/// It is stored as the top three rows of the homogeneous matrix.
#[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraToWorld(pub Matrix3x4<f64>);

impl CameraToWorld {
    /// Creates a pose with no change in position or orientation.
    pub fn identity() -> Self {
        Self(Matrix3x4::identity())
    }

    /// Create the pose from rotation and translation.
    pub fn from_parts(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self(crate::lie::from_rotation_translation(&rotation, &translation))
    }

    /// Applies `transform` in the camera frame before this pose, i.e. `self * transform`.
    #[must_use]
    pub fn then_local(self, transform: &Matrix3x4<f64>) -> Self {
        Self(compose(&self.0, transform))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lie::exp_map_se3;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3x4, Vector6};

    #[test]
    fn homogeneous_last_row() {
        let transform = exp_map_se3(&Vector6::new(1.0, 2.0, 3.0, 0.1, 0.2, 0.3));
        let homogeneous = to_homogeneous(&transform);
        assert_eq!(
            homogeneous.row(3).into_owned(),
            nalgebra::RowVector4::new(0.0, 0.0, 0.0, 1.0)
        );
        assert_eq!(homogeneous.fixed_view::<3, 4>(0, 0).into_owned(), transform);
    }

    #[test]
    fn compose_with_inverse_is_identity() {
        let transform = exp_map_se3(&Vector6::new(-0.4, 0.2, 1.3, 0.5, -0.1, 0.9));
        assert_relative_eq!(
            compose(&transform, &inverse(&transform)),
            Matrix3x4::identity(),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            compose(&inverse(&transform), &transform),
            Matrix3x4::identity(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn compose_applies_right_first() {
        let a = exp_map_se3(&Vector6::new(1.0, 0.0, 0.0, 0.0, 0.0, core::f64::consts::FRAC_PI_2));
        let b = exp_map_se3(&Vector6::new(0.0, 2.0, 0.0, 0.0, 0.0, 0.0));
        let point = nalgebra::Vector4::new(0.0, 0.0, 0.0, 1.0);
        let direct = to_homogeneous(&a) * (to_homogeneous(&b) * point);
        assert_relative_eq!(to_homogeneous(&compose(&a, &b)) * point, direct, epsilon = 1e-12);
    }
}
