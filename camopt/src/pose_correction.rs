use crate::autodiff::{pullback, ExpJacobian, LieGroup};
use crate::param::{check_index, mean_and_max, relocate_mask};
use crate::{
    CameraOptimizerConfig, CameraOptimizerMode, Device, LossDict, MetricsDict, NonTrainableMask,
    ParamGroups, Parameter, Result,
};
use camopt_core::nalgebra::{Matrix3x4, Vector3};
use camopt_core::{
    compose, rotation_part, translation_part, Camera, CameraIndex, RayBundle, Se3TangentSpace,
    Skew3,
};
use log::*;

pub const POSE_REGULARIZER: &str = "camera_opt_regularizer";
pub const TRANSLATION_GROUP: &str = "camera_opt_trans";
pub const ROTATION_GROUP: &str = "camera_opt_rot";

pub const TRANSLATION_MAX_METRIC: &str = "camera_opt_translation_max";
pub const TRANSLATION_MEAN_METRIC: &str = "camera_opt_translation_mean";
pub const ROTATION_MEAN_METRIC: &str = "camera_opt_rotation_mean";
pub const ROTATION_MAX_METRIC: &str = "camera_opt_rotation_max";

/// Per-camera translation and rotation generators.
#[derive(Debug, Clone, PartialEq)]
struct PoseParameters {
    translation: Parameter,
    rotation: Parameter,
}

impl PoseParameters {
    fn zeros(num_cameras: usize, device: Device) -> Self {
        Self {
            translation: Parameter::zeros(num_cameras, device),
            rotation: Parameter::zeros(num_cameras, device),
        }
    }

    fn tangent(&self, row: usize) -> Se3TangentSpace {
        Se3TangentSpace::new(self.translation.value[row], self.rotation.value[row])
    }
}

/// The learned state, which only exists when corrections are switched on.
#[derive(Debug, Clone, PartialEq)]
enum PoseState {
    Off,
    Learned(LieGroup, PoseParameters),
}

/// One evaluated correction.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnedCorrection {
    pub camera: CameraIndex,
    pub transform: Matrix3x4<f64>,
    /// `None` for cameras pinned to the identity, which receive no gradient.
    jacobian: Option<ExpJacobian>,
}

/// The corrections for a batch of camera indices, in the order they were requested.
///
/// Each transform maps the optimized camera frame into the nominal camera frame.
#[derive(Debug, Clone, PartialEq)]
pub enum PoseCorrections {
    /// Every correction is the identity. Nothing is stored per camera.
    Identity { len: usize },
    Learned(Vec<LearnedCorrection>),
}

impl PoseCorrections {
    pub fn len(&self) -> usize {
        match self {
            Self::Identity { len } => *len,
            Self::Learned(corrections) => corrections.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The correction at position `i` of the batch.
    pub fn get(&self, i: usize) -> Option<Matrix3x4<f64>> {
        match self {
            Self::Identity { len } => (i < *len).then(Matrix3x4::identity),
            Self::Learned(corrections) => corrections.get(i).map(|c| c.transform),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Matrix3x4<f64>> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    pub fn to_vec(&self) -> Vec<Matrix3x4<f64>> {
        self.iter().collect()
    }
}

/// The state needed to push ray gradients back into the pose correction.
#[derive(Debug, Clone, PartialEq)]
pub struct RayBundleCorrection {
    corrections: PoseCorrections,
    input_directions: Vec<Vector3<f64>>,
}

impl RayBundleCorrection {
    pub fn corrections(&self) -> &PoseCorrections {
        &self.corrections
    }

    /// Converts gradients on the corrected origins and directions into gradients on the
    /// correction transform of each ray.
    ///
    /// With `o' = o + t` and `d' = R d`, `dL/dt = dL/do'` and `dL/dR = dL/dd' d^T`.
    pub fn transform_gradients(
        &self,
        grad_origins: &[Vector3<f64>],
        grad_directions: &[Vector3<f64>],
    ) -> Vec<Matrix3x4<f64>> {
        assert_eq!(grad_origins.len(), self.input_directions.len());
        assert_eq!(grad_directions.len(), self.input_directions.len());
        self.input_directions
            .iter()
            .zip(grad_origins)
            .zip(grad_directions)
            .map(|((direction, grad_origin), grad_direction)| {
                let grad_rotation = grad_direction * direction.transpose();
                camopt_core::lie::from_rotation_translation(&grad_rotation, grad_origin)
            })
            .collect()
    }
}

/// Layer that learns a rigid correction for every training camera's pose.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseCorrectionLayer {
    config: CameraOptimizerConfig,
    num_cameras: usize,
    device: Device,
    state: PoseState,
    non_trainable: Option<NonTrainableMask>,
}

impl PoseCorrectionLayer {
    /// Creates the layer with zero-initialized generators for `num_cameras` cameras.
    ///
    /// The non-trainable mask is moved onto `device` if it lives elsewhere.
    pub fn new(
        config: CameraOptimizerConfig,
        num_cameras: usize,
        device: Device,
        non_trainable: Option<NonTrainableMask>,
    ) -> Self {
        let state = match config.mode {
            CameraOptimizerMode::Off => PoseState::Off,
            CameraOptimizerMode::So3xR3 => PoseState::Learned(
                LieGroup::So3xR3,
                PoseParameters::zeros(num_cameras, device),
            ),
            CameraOptimizerMode::Se3 => {
                PoseState::Learned(LieGroup::Se3, PoseParameters::zeros(num_cameras, device))
            }
        };
        debug!(
            "pose correction in mode {} for {} cameras on {}",
            config.mode, num_cameras, device
        );
        Self {
            config,
            num_cameras,
            device,
            state,
            non_trainable: relocate_mask(non_trainable, device),
        }
    }

    pub fn config(&self) -> &CameraOptimizerConfig {
        &self.config
    }

    pub fn mode(&self) -> CameraOptimizerMode {
        self.config.mode
    }

    pub fn num_cameras(&self) -> usize {
        self.num_cameras
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn non_trainable(&self) -> Option<&NonTrainableMask> {
        self.non_trainable.as_ref()
    }

    /// The translation generators, if corrections are on.
    pub fn translation(&self) -> Option<&Parameter> {
        match &self.state {
            PoseState::Off => None,
            PoseState::Learned(_, params) => Some(&params.translation),
        }
    }

    /// The rotation generators, if corrections are on.
    pub fn rotation(&self) -> Option<&Parameter> {
        match &self.state {
            PoseState::Off => None,
            PoseState::Learned(_, params) => Some(&params.rotation),
        }
    }

    fn is_non_trainable(&self, camera: CameraIndex) -> bool {
        self.non_trainable
            .as_ref()
            .map_or(false, |mask| mask.contains(camera))
    }

    /// Looks up the correction of every camera in `indices`.
    pub fn evaluate(&self, indices: &[CameraIndex]) -> Result<PoseCorrections> {
        let (group, params) = match &self.state {
            PoseState::Off => return Ok(PoseCorrections::Identity { len: indices.len() }),
            PoseState::Learned(group, params) => (*group, params),
        };
        indices
            .iter()
            .map(|&camera| {
                let row = check_index(camera, self.num_cameras)?;
                if self.is_non_trainable(camera) {
                    // Replaced rather than blended, so no gradient flows to this camera.
                    return Ok(LearnedCorrection {
                        camera,
                        transform: Matrix3x4::identity(),
                        jacobian: None,
                    });
                }
                let (transform, jacobian) =
                    group.exp_with_jacobian(&params.tangent(row).to_vec());
                Ok(LearnedCorrection {
                    camera,
                    transform,
                    jacobian: Some(jacobian),
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(PoseCorrections::Learned)
    }

    /// The corrections of all cameras, in index order.
    pub fn all_corrections(&self) -> Result<PoseCorrections> {
        let indices: Vec<CameraIndex> = (0..self.num_cameras).map(CameraIndex).collect();
        self.evaluate(&indices)
    }

    /// Accumulates the gradient of the loss with respect to each correction transform into the
    /// generators.
    ///
    /// `grad_output[i]` is the gradient with respect to `corrections.get(i)`.
    ///
    /// # Panics
    ///
    /// Panics if the lengths differ, or if `corrections` came from a layer with more cameras.
    pub fn backward(&mut self, corrections: &PoseCorrections, grad_output: &[Matrix3x4<f64>]) {
        assert_eq!(
            corrections.len(),
            grad_output.len(),
            "one gradient is needed per correction"
        );
        let num_cameras = self.num_cameras;
        let (params, learned) = match (&mut self.state, corrections) {
            (PoseState::Learned(_, params), PoseCorrections::Learned(learned)) => (params, learned),
            _ => return,
        };
        for (correction, grad) in learned.iter().zip(grad_output) {
            assert!(
                correction.camera.0 < num_cameras,
                "correction for camera {} does not belong to a layer of {} cameras",
                correction.camera,
                num_cameras
            );
            if let Some(jacobian) = &correction.jacobian {
                let tangent_grad = Se3TangentSpace::from_vec(pullback(jacobian, grad));
                params.translation.grad[correction.camera.0] += tangent_grad.translation;
                params.rotation.grad[correction.camera.0] += tangent_grad.rotation;
            }
        }
    }

    /// Corrects every ray in place by the pose correction of the camera it came from.
    ///
    /// Returns `None` without touching the bundle when corrections are off.
    ///
    /// # Panics
    ///
    /// Panics if the bundle's origins, directions and camera indices differ in length.
    pub fn apply_to_ray_bundle(
        &self,
        bundle: &mut RayBundle,
    ) -> Result<Option<RayBundleCorrection>> {
        assert!(
            bundle.origins.len() == bundle.directions.len()
                && bundle.directions.len() == bundle.camera_indices.len(),
            "ragged ray bundle: {} origins, {} directions, {} camera indices",
            bundle.origins.len(),
            bundle.directions.len(),
            bundle.camera_indices.len()
        );
        if let PoseState::Off = self.state {
            return Ok(None);
        }
        let corrections = self.evaluate(&bundle.camera_indices)?;
        let input_directions = bundle.directions.clone();
        for ((origin, direction), correction) in bundle
            .origins
            .iter_mut()
            .zip(bundle.directions.iter_mut())
            .zip(corrections.iter())
        {
            *origin += translation_part(&correction);
            *direction = rotation_part(&correction) * *direction;
        }
        trace!("corrected {} rays", bundle.len());
        Ok(Some(RayBundleCorrection {
            corrections,
            input_directions,
        }))
    }

    /// Backward pass of [`Self::apply_to_ray_bundle`].
    pub fn backward_ray_bundle(
        &mut self,
        record: &RayBundleCorrection,
        grad_origins: &[Vector3<f64>],
        grad_directions: &[Vector3<f64>],
    ) {
        let grads = record.transform_gradients(grad_origins, grad_directions);
        self.backward(&record.corrections, &grads);
    }

    fn camera_correction(&self, camera: &Camera) -> Result<Option<PoseCorrections>> {
        match (&self.state, camera.training_index) {
            (PoseState::Off, _) | (_, None) => Ok(None),
            (PoseState::Learned(..), Some(index)) => self.evaluate(&[index]).map(Some),
        }
    }

    /// The corrected camera-to-world extrinsics, `camera_to_world * [correction; 0 0 0 1]`.
    ///
    /// Cameras without a training index, and all cameras when corrections are off, are returned
    /// unchanged.
    pub fn apply_to_camera(&self, camera: &Camera) -> Result<Matrix3x4<f64>> {
        let extrinsics = camera.camera_to_world.0;
        Ok(match self.camera_correction(camera)? {
            Some(corrections) => match corrections.get(0) {
                Some(correction) => compose(&extrinsics, &correction),
                None => extrinsics,
            },
            None => extrinsics,
        })
    }

    /// Backward pass of [`Self::apply_to_camera`], given the gradient on the returned extrinsics.
    pub fn backward_camera(
        &mut self,
        camera: &Camera,
        grad_extrinsics: &Matrix3x4<f64>,
    ) -> Result<()> {
        if let Some(corrections) = self.camera_correction(camera)? {
            // out = C H(A), so dL/dH = C^T G and the correction takes its top three rows.
            let grad_homogeneous = camera.camera_to_world.0.transpose() * grad_extrinsics;
            let grad = grad_homogeneous.fixed_rows::<3>(0).into_owned();
            self.backward(&corrections, &[grad]);
        }
        Ok(())
    }

    /// Adds the L2 regularizer on the generators under `camera_opt_regularizer`.
    pub fn add_loss(&self, losses: &mut LossDict) {
        if let PoseState::Learned(_, params) = &self.state {
            losses.insert(
                POSE_REGULARIZER,
                params.translation.mean_norm() * self.config.trans_l2_penalty
                    + params.rotation.mean_norm() * self.config.rot_l2_penalty,
            );
        }
    }

    /// Accumulates `scale` times the gradient of the regularizer into the generators.
    pub fn backward_regularization(&mut self, scale: f64) {
        if let PoseState::Learned(_, params) = &mut self.state {
            params
                .translation
                .accumulate_mean_norm_grad(scale * self.config.trans_l2_penalty);
            params
                .rotation
                .accumulate_mean_norm_grad(scale * self.config.rot_l2_penalty);
        }
    }

    /// Reports the size of the corrections, with rotations in degrees.
    pub fn add_metrics(&self, metrics: &mut MetricsDict) {
        if let PoseState::Learned(_, params) = &self.state {
            metrics.insert(TRANSLATION_MAX_METRIC, params.translation.max_norm());
            metrics.insert(TRANSLATION_MEAN_METRIC, params.translation.mean_norm());
            let (mean_degrees, max_degrees) = mean_and_max(
                params
                    .rotation
                    .value
                    .iter()
                    .map(|&rotation| Skew3(rotation).angle_degrees()),
            );
            metrics.insert(ROTATION_MEAN_METRIC, mean_degrees);
            metrics.insert(ROTATION_MAX_METRIC, max_degrees);
        }
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        match &mut self.state {
            PoseState::Off => vec![],
            PoseState::Learned(_, params) => vec![&mut params.translation, &mut params.rotation],
        }
    }

    /// Hands the translation and rotation generators to an optimizer as two named groups.
    ///
    /// # Panics
    ///
    /// Panics if the number of parameters does not match the mode.
    pub fn trainable_parameters<'a>(&'a mut self, groups: &mut ParamGroups<'a>) {
        let expected = self.mode().num_parameters();
        let mut params = self.parameters_mut();
        assert_eq!(
            params.len(),
            expected,
            "pose correction parameters do not match the mode"
        );
        if let (Some(rotation), Some(translation)) = (params.pop(), params.pop()) {
            groups.insert(TRANSLATION_GROUP, vec![translation]);
            groups.insert(ROTATION_GROUP, vec![rotation]);
        }
    }

    pub fn zero_grad(&mut self) {
        for param in self.parameters_mut() {
            param.zero_grad();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use camopt_core::nalgebra::Point3;

    fn layer(mode: CameraOptimizerMode, num_cameras: usize) -> PoseCorrectionLayer {
        PoseCorrectionLayer::new(
            CameraOptimizerConfig::with_mode(mode),
            num_cameras,
            Device::Cpu,
            None,
        )
    }

    fn set_generator(layer: &mut PoseCorrectionLayer, camera: usize, tangent: Se3TangentSpace) {
        let mut groups = ParamGroups::new();
        layer.trainable_parameters(&mut groups);
        groups.get_mut(TRANSLATION_GROUP).unwrap()[0].value[camera] = tangent.translation;
        groups.get_mut(ROTATION_GROUP).unwrap()[0].value[camera] = tangent.rotation;
    }

    #[test]
    fn off_is_identity_without_storage() {
        let layer = layer(CameraOptimizerMode::Off, 4);
        let corrections = layer.evaluate(&[CameraIndex(0), CameraIndex(3)]).unwrap();
        assert_eq!(corrections, PoseCorrections::Identity { len: 2 });
        assert_eq!(corrections.to_vec(), vec![Matrix3x4::identity(); 2]);
        assert_eq!(corrections.get(2), None);
        assert!(layer.translation().is_none());
    }

    #[test]
    fn out_of_range_index() {
        let layer = layer(CameraOptimizerMode::So3xR3, 2);
        assert_eq!(
            layer.evaluate(&[CameraIndex(2)]),
            Err(crate::CorrectionError::IndexOutOfRange {
                index: 2,
                num_cameras: 2
            })
        );
    }

    #[test]
    fn so3xr3_translation_is_unrotated() {
        let mut layer = layer(CameraOptimizerMode::So3xR3, 2);
        let tangent =
            Se3TangentSpace::new(Vector3::new(1.0, 2.0, 3.0), Vector3::new(0.0, 0.0, 0.5));
        set_generator(&mut layer, 1, tangent);
        let corrections = layer.evaluate(&[CameraIndex(1)]).unwrap();
        let correction = corrections.get(0).unwrap();
        assert_relative_eq!(translation_part(&correction), tangent.translation);
        assert_relative_eq!(correction, tangent.exp_so3xr3());
    }

    #[test]
    fn ray_bundle_gradient() {
        let mut layer = layer(CameraOptimizerMode::Se3, 1);
        let mut bundle: RayBundle = [(
            Point3::origin(),
            Vector3::new(0.0, 0.0, 1.0),
            CameraIndex(0),
        )]
        .into_iter()
        .collect();
        let record = layer.apply_to_ray_bundle(&mut bundle).unwrap().unwrap();
        // Pull the origin towards +x and the direction towards +y.
        layer.backward_ray_bundle(&record, &[-Vector3::x()], &[-Vector3::y()]);
        let translation = layer.translation().unwrap().grad[0];
        let rotation = layer.rotation().unwrap().grad[0];
        assert_relative_eq!(translation, -Vector3::x(), epsilon = 1e-12);
        // Rotating z towards y is a negative rotation about x.
        assert_relative_eq!(rotation, Vector3::x(), epsilon = 1e-12);
    }
}
