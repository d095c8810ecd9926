//! Exponential maps from a 6-dimensional generator into a 3x4 rigid transform.
//!
//! The generator is laid out as `[translation, rotation]`, with the rotation given as a scaled
//! axis (an element of so(3)). Both maps are generic over [`RealField`] so that the same code
//! runs on `f64` and on dual numbers when the derivative with respect to the generator is needed.
//!
//! Near the identity the trigonometric coefficients are replaced by their Taylor expansions in
//! `theta^2`. This keeps the maps free of `sqrt(0)`, which would otherwise poison derivatives
//! evaluated at the zero generator.

use nalgebra::{Matrix3, Matrix3x4, RealField, Vector3, Vector6};

/// Below this squared angle the Taylor expansions are used.
const SMALL_ANGLE_SQUARED: f64 = 1e-4;

#[inline(always)]
fn constant<T: RealField>(value: f64) -> T {
    nalgebra::convert(value)
}

/// The coefficients shared by the rotation and the SE(3) left Jacobian.
struct So3Coefficients<T> {
    /// `cos(theta)`
    cosine: T,
    /// `sin(theta) / theta`
    sine_by_theta: T,
    /// `(1 - cos(theta)) / theta^2`
    one_minus_cosine_by_theta2: T,
    /// `(theta - sin(theta)) / theta^3`
    theta_minus_sine_by_theta3: T,
}

impl<T: RealField> So3Coefficients<T> {
    fn new(rotation: &Vector3<T>) -> Self {
        let theta2 = rotation.dot(rotation);
        if theta2 < constant::<T>(SMALL_ANGLE_SQUARED) {
            let theta4 = theta2.clone() * theta2.clone();
            Self {
                cosine: T::one() - theta2.clone() * constant::<T>(0.5)
                    + theta4.clone() / constant::<T>(24.0),
                sine_by_theta: T::one() - theta2.clone() / constant::<T>(6.0)
                    + theta4.clone() / constant::<T>(120.0),
                one_minus_cosine_by_theta2: constant::<T>(0.5)
                    - theta2.clone() / constant::<T>(24.0)
                    + theta4.clone() / constant::<T>(720.0),
                theta_minus_sine_by_theta3: constant::<T>(1.0 / 6.0)
                    - theta2 / constant::<T>(120.0)
                    + theta4 / constant::<T>(5040.0),
            }
        } else {
            let theta = theta2.clone().sqrt();
            let (sine, cosine) = theta.clone().sin_cos();
            let theta3 = theta2.clone() * theta.clone();
            Self {
                sine_by_theta: sine.clone() / theta.clone(),
                one_minus_cosine_by_theta2: (T::one() - cosine.clone()) / theta2,
                theta_minus_sine_by_theta3: (theta - sine) / theta3,
                cosine,
            }
        }
    }

    /// Rodrigues' formula: `cos(theta) I + sin(theta)/theta [w]x + (1 - cos(theta))/theta^2 w w^T`.
    fn rotation(&self, rotation: &Vector3<T>) -> Matrix3<T> {
        Matrix3::identity() * self.cosine.clone()
            + rotation.cross_matrix() * self.sine_by_theta.clone()
            + rotation * rotation.transpose() * self.one_minus_cosine_by_theta2.clone()
    }

    /// The left Jacobian of SO(3) applied to `translation`.
    fn left_jacobian_times(&self, rotation: &Vector3<T>, translation: &Vector3<T>) -> Vector3<T> {
        translation * self.sine_by_theta.clone()
            + rotation.cross(translation) * self.one_minus_cosine_by_theta2.clone()
            + rotation * rotation.dot(translation) * self.theta_minus_sine_by_theta3.clone()
    }
}

/// Packs a rotation matrix and a translation into a 3x4 `[R | t]` matrix.
pub fn from_rotation_translation<T: RealField>(
    rotation: &Matrix3<T>,
    translation: &Vector3<T>,
) -> Matrix3x4<T> {
    Matrix3x4::from_columns(&[
        rotation.column(0),
        rotation.column(1),
        rotation.column(2),
        translation.column(0),
    ])
}

/// The SO(3) exponential map of a scaled axis.
pub fn exp_map_so3<T: RealField>(rotation: &Vector3<T>) -> Matrix3<T> {
    So3Coefficients::new(rotation).rotation(rotation)
}

/// Exponential map of SO(3)×R3: rotation and translation are independent, so the translation
/// half of the generator is copied into the transform unchanged.
pub fn exp_map_so3xr3<T: RealField>(tangent: &Vector6<T>) -> Matrix3x4<T> {
    let translation: Vector3<T> = tangent.fixed_rows::<3>(0).into_owned();
    let rotation: Vector3<T> = tangent.fixed_rows::<3>(3).into_owned();
    from_rotation_translation(&exp_map_so3(&rotation), &translation)
}

/// Exponential map of SE(3): the translation is carried along the rotation through the left
/// Jacobian of SO(3), coupling both halves of the generator.
pub fn exp_map_se3<T: RealField>(tangent: &Vector6<T>) -> Matrix3x4<T> {
    let translation: Vector3<T> = tangent.fixed_rows::<3>(0).into_owned();
    let rotation: Vector3<T> = tangent.fixed_rows::<3>(3).into_owned();
    let coefficients = So3Coefficients::new(&rotation);
    from_rotation_translation(
        &coefficients.rotation(&rotation),
        &coefficients.left_jacobian_times(&rotation, &translation),
    )
}
