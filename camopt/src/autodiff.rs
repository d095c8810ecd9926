//! Exponential maps with their Jacobians, evaluated with `num-dual`.
//!
//! The 3x4 output is flattened column-major into 12 values, so row `r + 3 * c` of the Jacobian
//! holds the derivatives of entry `(r, c)` of the transform with respect to the 6 generator
//! components `[translation, rotation]`.

use camopt_core::lie::{exp_map_se3, exp_map_so3xr3};
use camopt_core::nalgebra::{Matrix3x4, RealField, SMatrix, SVector, Vector6};
use num_dual::{jacobian, DualSVec64};

/// Derivative of the flattened transform with respect to the generator.
pub type ExpJacobian = SMatrix<f64, 12, 6>;

/// The Lie group a correction is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LieGroup {
    So3xR3,
    Se3,
}

impl LieGroup {
    /// Applies the group's exponential map to `[translation, rotation]`.
    pub(crate) fn exp<T: RealField>(self, tangent: &Vector6<T>) -> Matrix3x4<T> {
        match self {
            Self::So3xR3 => exp_map_so3xr3(tangent),
            Self::Se3 => exp_map_se3(tangent),
        }
    }

    /// Evaluates the exponential map together with its Jacobian.
    pub(crate) fn exp_with_jacobian(
        self,
        tangent: &Vector6<f64>,
    ) -> (Matrix3x4<f64>, ExpJacobian) {
        let (value, jacobian) = jacobian(
            |x: SVector<DualSVec64<6>, 6>| {
                SVector::<DualSVec64<6>, 12>::from_iterator(self.exp(&x).iter().cloned())
            },
            *tangent,
        );
        (Matrix3x4::from_column_slice(value.as_slice()), jacobian)
    }
}

/// Pulls a gradient on the transform back onto the generator: `J^T vec(grad)`.
pub(crate) fn pullback(jacobian: &ExpJacobian, grad: &Matrix3x4<f64>) -> Vector6<f64> {
    let flat = SVector::<f64, 12>::from_column_slice(grad.as_slice());
    jacobian.transpose() * flat
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn finite_difference(group: LieGroup, tangent: &Vector6<f64>) -> ExpJacobian {
        let step = 1e-6;
        let mut jacobian = ExpJacobian::zeros();
        for k in 0..6 {
            let mut plus = *tangent;
            let mut minus = *tangent;
            plus[k] += step;
            minus[k] -= step;
            let derivative = (group.exp(&plus) - group.exp(&minus)) / (2.0 * step);
            jacobian
                .column_mut(k)
                .copy_from_slice(derivative.as_slice());
        }
        jacobian
    }

    #[test]
    fn value_matches_plain_evaluation() {
        let tangent = Vector6::new(0.1, -0.3, 0.2, 0.4, 0.05, -0.6);
        for group in [LieGroup::So3xR3, LieGroup::Se3] {
            let (value, _) = group.exp_with_jacobian(&tangent);
            assert_relative_eq!(value, group.exp(&tangent), epsilon = 1e-14);
        }
    }

    #[test]
    fn jacobian_matches_finite_difference() {
        for tangent in [
            Vector6::new(0.1, -0.3, 0.2, 0.4, 0.05, -0.6),
            Vector6::new(0.5, 0.0, -0.1, 1e-3, -2e-3, 5e-4),
        ] {
            for group in [LieGroup::So3xR3, LieGroup::Se3] {
                let (_, jacobian) = group.exp_with_jacobian(&tangent);
                assert_relative_eq!(
                    jacobian,
                    finite_difference(group, &tangent),
                    epsilon = 1e-6
                );
            }
        }
    }

    #[test]
    fn jacobian_at_identity_is_finite() {
        for group in [LieGroup::So3xR3, LieGroup::Se3] {
            let (value, jacobian) = group.exp_with_jacobian(&Vector6::zeros());
            assert_eq!(value, Matrix3x4::identity());
            assert!(jacobian.iter().all(|n| n.is_finite()));
            // d(translation)/d(translation) is the identity at zero.
            for k in 0..3 {
                assert_relative_eq!(jacobian[(9 + k, k)], 1.0, epsilon = 1e-12);
            }
            // Rotating about z moves entry (1, 0) of the rotation block.
            assert_relative_eq!(jacobian[(1, 5)], 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn pullback_of_translation_gradient() {
        let (_, jacobian) = LieGroup::So3xR3.exp_with_jacobian(&Vector6::zeros());
        let mut grad = Matrix3x4::zeros();
        grad[(0, 3)] = 2.0;
        grad[(2, 3)] = -1.0;
        let pulled = pullback(&jacobian, &grad);
        assert_relative_eq!(
            pulled,
            Vector6::new(2.0, 0.0, -1.0, 0.0, 0.0, 0.0),
            epsilon = 1e-12
        );
    }
}
