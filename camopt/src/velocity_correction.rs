use crate::param::{check_index, relocate_mask};
use crate::{
    CameraVelocityOptimizerConfig, CorrectionError, Device, LossDict, MetricsDict,
    NonTrainableMask, ParamGroups, Parameter, Result,
};
use camopt_core::nalgebra::Vector6;
use camopt_core::Camera;
use log::*;

pub const VELOCITY_REGULARIZER: &str = "camera_velocity_regularizer";
pub const LINEAR_GROUP: &str = "camera_velocity_opt_linear";
pub const ANGULAR_GROUP: &str = "camera_velocity_opt_angular";

pub const LINEAR_MAX_METRIC: &str = "camera_opt_vel_max";
pub const LINEAR_MEAN_METRIC: &str = "camera_opt_vel_mean";
pub const ANGULAR_MAX_METRIC: &str = "camera_opt_ang_vel_max";
pub const ANGULAR_MEAN_METRIC: &str = "camera_opt_ang_vel_mean";

#[derive(Debug, Clone, PartialEq)]
struct VelocityParameters {
    linear: Parameter,
    angular: Parameter,
}

/// Layer that learns an additive correction to every training camera's velocity.
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityCorrectionLayer {
    config: CameraVelocityOptimizerConfig,
    num_cameras: usize,
    device: Device,
    params: Option<VelocityParameters>,
    non_trainable: Option<NonTrainableMask>,
}

impl VelocityCorrectionLayer {
    pub fn new(
        config: CameraVelocityOptimizerConfig,
        num_cameras: usize,
        device: Device,
        non_trainable: Option<NonTrainableMask>,
    ) -> Self {
        let params = config.enabled.then(|| VelocityParameters {
            linear: Parameter::zeros(num_cameras, device),
            angular: Parameter::zeros(num_cameras, device),
        });
        debug!(
            "velocity correction {} for {} cameras on {}",
            if config.enabled { "enabled" } else { "disabled" },
            num_cameras,
            device
        );
        Self {
            config,
            num_cameras,
            device,
            params,
            non_trainable: relocate_mask(non_trainable, device),
        }
    }

    pub fn config(&self) -> &CameraVelocityOptimizerConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.params.is_some()
    }

    pub fn num_cameras(&self) -> usize {
        self.num_cameras
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn linear(&self) -> Option<&Parameter> {
        self.params.as_ref().map(|params| &params.linear)
    }

    pub fn angular(&self) -> Option<&Parameter> {
        self.params.as_ref().map(|params| &params.angular)
    }

    /// The velocity the correction is added to.
    fn base_velocity(&self, camera: &Camera) -> Result<Vector6<f64>> {
        match camera.training_index {
            Some(index) if !self.config.zero_initial_velocities => camera
                .velocity
                .ok_or(CorrectionError::MissingVelocity { index: index.0 }),
            _ => Ok(Vector6::zeros()),
        }
    }

    /// The corrected velocity of `camera`, linear followed by angular.
    ///
    /// Cameras without a training index get a zero base and no correction.
    pub fn evaluate(&self, camera: &Camera) -> Result<Vector6<f64>> {
        let base = self.base_velocity(camera)?;
        let (params, index) = match (&self.params, camera.training_index) {
            (Some(params), Some(index)) => (params, index),
            _ => return Ok(base),
        };
        let row = check_index(index, self.num_cameras)?;
        let linear = params.linear.value[row];
        let angular = params.angular.value[row];
        Ok(base + Vector6::new(linear.x, linear.y, linear.z, angular.x, angular.y, angular.z))
    }

    /// Accumulates the gradient of the loss with respect to the velocity returned by
    /// [`Self::evaluate`] for `camera`.
    ///
    /// Cameras in the non-trainable mask receive no gradient.
    pub fn backward(&mut self, camera: &Camera, grad: &Vector6<f64>) -> Result<()> {
        let index = match camera.training_index {
            Some(index) => index,
            None => return Ok(()),
        };
        if self
            .non_trainable
            .as_ref()
            .map_or(false, |mask| mask.contains(index))
        {
            return Ok(());
        }
        let row = check_index(index, self.num_cameras)?;
        if let Some(params) = &mut self.params {
            params.linear.grad[row] += grad.fixed_rows::<3>(0);
            params.angular.grad[row] += grad.fixed_rows::<3>(3);
        }
        Ok(())
    }

    /// Adds the L2 regularizer on the adjustments under `camera_velocity_regularizer`.
    pub fn add_loss(&self, losses: &mut LossDict) {
        if let Some(params) = &self.params {
            losses.insert(
                VELOCITY_REGULARIZER,
                params.linear.mean_norm() * self.config.linear_l2_penalty
                    + params.angular.mean_norm() * self.config.angular_l2_penalty,
            );
        }
    }

    /// Accumulates `scale` times the gradient of the regularizer into the adjustments.
    pub fn backward_regularization(&mut self, scale: f64) {
        if let Some(params) = &mut self.params {
            params
                .linear
                .accumulate_mean_norm_grad(scale * self.config.linear_l2_penalty);
            params
                .angular
                .accumulate_mean_norm_grad(scale * self.config.angular_l2_penalty);
        }
    }

    pub fn add_metrics(&self, metrics: &mut MetricsDict) {
        if let Some(params) = &self.params {
            metrics.insert(LINEAR_MAX_METRIC, params.linear.max_norm());
            metrics.insert(LINEAR_MEAN_METRIC, params.linear.mean_norm());
            metrics.insert(ANGULAR_MAX_METRIC, params.angular.max_norm());
            metrics.insert(ANGULAR_MEAN_METRIC, params.angular.mean_norm());
        }
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        match &mut self.params {
            None => vec![],
            Some(params) => vec![&mut params.linear, &mut params.angular],
        }
    }

    /// Hands the linear and angular adjustments to an optimizer as two named groups.
    ///
    /// # Panics
    ///
    /// Panics if parameters exist while disabled or are missing while enabled.
    pub fn trainable_parameters<'a>(&'a mut self, groups: &mut ParamGroups<'a>) {
        let expected = if self.config.enabled { 2 } else { 0 };
        let mut params = self.parameters_mut();
        assert_eq!(
            params.len(),
            expected,
            "velocity correction parameters do not match the enabled flag"
        );
        if let (Some(angular), Some(linear)) = (params.pop(), params.pop()) {
            groups.insert(LINEAR_GROUP, vec![linear]);
            groups.insert(ANGULAR_GROUP, vec![angular]);
        }
    }

    pub fn zero_grad(&mut self) {
        for param in self.parameters_mut() {
            param.zero_grad();
        }
    }
}
