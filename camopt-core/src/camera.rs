use crate::CameraToWorld;
use derive_more::{AsMut, AsRef, Display, From, Into};
use nalgebra::Vector6;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The position of a camera in the training set.
///
/// Learned per-camera state is stored in rows indexed by this value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, AsMut, AsRef, Display, From, Into,
)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraIndex(pub usize);

/// A camera as seen by the correction layers.
///
/// Cameras that are not part of the training set (a viewer camera, for instance) have no
/// `training_index` and are never corrected.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Camera {
    pub camera_to_world: CameraToWorld,
    pub training_index: Option<CameraIndex>,
    /// Linear velocity followed by angular velocity.
    pub velocity: Option<Vector6<f64>>,
}

impl Camera {
    pub fn new(camera_to_world: CameraToWorld) -> Self {
        Self {
            camera_to_world,
            training_index: None,
            velocity: None,
        }
    }

    #[must_use]
    pub fn with_training_index(self, index: impl Into<CameraIndex>) -> Self {
        Self {
            training_index: Some(index.into()),
            ..self
        }
    }

    #[must_use]
    pub fn with_velocity(self, velocity: Vector6<f64>) -> Self {
        Self {
            velocity: Some(velocity),
            ..self
        }
    }
}
