use crate::CameraIndex;
use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A batch of rays, each cast from the camera at the same position in `camera_indices`.
///
/// The three vectors always have the same length.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct RayBundle {
    pub origins: Vec<Point3<f64>>,
    pub directions: Vec<Vector3<f64>>,
    pub camera_indices: Vec<CameraIndex>,
}

impl RayBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, origin: Point3<f64>, direction: Vector3<f64>, camera: CameraIndex) {
        self.origins.push(origin);
        self.directions.push(direction);
        self.camera_indices.push(camera);
    }

    pub fn len(&self) -> usize {
        self.camera_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.camera_indices.is_empty()
    }

    /// Iterates over `(origin, direction, camera)` for each ray.
    pub fn iter(&self) -> impl Iterator<Item = (Point3<f64>, Vector3<f64>, CameraIndex)> + '_ {
        self.origins
            .iter()
            .zip(&self.directions)
            .zip(&self.camera_indices)
            .map(|((&origin, &direction), &camera)| (origin, direction, camera))
    }
}

impl FromIterator<(Point3<f64>, Vector3<f64>, CameraIndex)> for RayBundle {
    fn from_iter<I: IntoIterator<Item = (Point3<f64>, Vector3<f64>, CameraIndex)>>(
        iter: I,
    ) -> Self {
        let mut bundle = Self::new();
        for (origin, direction, camera) in iter {
            bundle.push(origin, direction, camera);
        }
        bundle
    }
}
