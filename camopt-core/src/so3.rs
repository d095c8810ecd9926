use crate::lie::{exp_map_se3, exp_map_so3, exp_map_so3xr3};
use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use nalgebra::{Const, Matrix3, Matrix3x4, Rotation3, Vector3, Vector6};
#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A small translation and rotation generator that is turned into a rigid correction through one
/// of the exponential maps.
///
/// The translation comes first when flattened, which matches the layout the exponential maps in
/// [`crate::lie`] expect.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Se3TangentSpace {
    pub translation: Vector3<f64>,
    pub rotation: Vector3<f64>,
}

impl Se3TangentSpace {
    #[inline(always)]
    pub fn new(translation: Vector3<f64>, rotation: Vector3<f64>) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    #[inline(always)]
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: Vector3::zeros(),
        }
    }

    /// Applies the SO(3)×R3 exponential map, keeping translation and rotation independent.
    #[must_use]
    #[inline(always)]
    pub fn exp_so3xr3(self) -> Matrix3x4<f64> {
        exp_map_so3xr3(&self.to_vec())
    }

    /// Applies the SE(3) exponential map, coupling translation and rotation.
    #[must_use]
    #[inline(always)]
    pub fn exp_se3(self) -> Matrix3x4<f64> {
        exp_map_se3(&self.to_vec())
    }

    #[inline(always)]
    pub fn to_vec(&self) -> Vector6<f64> {
        Vector6::new(
            self.translation.x,
            self.translation.y,
            self.translation.z,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        )
    }

    #[inline(always)]
    pub fn from_vec(v: Vector6<f64>) -> Self {
        Self {
            translation: v.rows_generic(0, Const::<3>).into_owned(),
            rotation: v.rows_generic(3, Const::<3>).into_owned(),
        }
    }
}

/// Contains a member of the lie algebra so(3), a representation of the tangent space
/// of 3d rotation. This is also known as the lie algebra of the 3d rotation group SO(3).
///
/// This is only intended to be used where it is desirable to have unconstrained variables
/// representing the degrees of freedom of the rotation, such as the rotation half of a learned
/// correction. Its norm is the rotation angle in radians.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Skew3(pub Vector3<f64>);

impl Skew3 {
    /// Converts the Skew3 to a Rotation3 matrix.
    pub fn rotation(self) -> Rotation3<f64> {
        self.into()
    }

    /// The rotation angle in degrees.
    pub fn angle_degrees(self) -> f64 {
        self.0.norm().to_degrees()
    }
}

/// This is the exponential map.
impl From<Skew3> for Rotation3<f64> {
    fn from(w: Skew3) -> Self {
        Self::from_matrix_unchecked(exp_map_so3(&w.0))
    }
}
