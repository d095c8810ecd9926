use crate::CorrectionError;
use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// How pose corrections are parameterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum CameraOptimizerMode {
    /// No pose correction; every correction is the identity.
    #[default]
    #[cfg_attr(feature = "serde-serialize", serde(rename = "off"))]
    Off,
    /// Rotation and translation optimized independently. This is the recommended mode.
    #[cfg_attr(feature = "serde-serialize", serde(rename = "SO3xR3"))]
    So3xR3,
    /// Rotation and translation coupled through the SE(3) exponential map.
    #[cfg_attr(feature = "serde-serialize", serde(rename = "SE3"))]
    Se3,
}

impl CameraOptimizerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::So3xR3 => "SO3xR3",
            Self::Se3 => "SE3",
        }
    }

    /// The number of parameter tensors a layer in this mode owns.
    pub fn num_parameters(self) -> usize {
        match self {
            Self::Off => 0,
            Self::So3xR3 | Self::Se3 => 2,
        }
    }
}

impl fmt::Display for CameraOptimizerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CameraOptimizerMode {
    type Err = CorrectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(Self::Off),
            "SO3xR3" => Ok(Self::So3xR3),
            "SE3" => Ok(Self::Se3),
            other => Err(CorrectionError::UnknownMode(other.to_owned())),
        }
    }
}

/// Configuration of optimization for camera poses.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraOptimizerConfig {
    /// Pose optimization strategy to use.
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub mode: CameraOptimizerMode,
    /// L2 penalty on translation parameters.
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_trans_l2_penalty")
    )]
    pub trans_l2_penalty: f64,
    /// L2 penalty on rotation parameters.
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_rot_l2_penalty")
    )]
    pub rot_l2_penalty: f64,
}

impl CameraOptimizerConfig {
    pub fn with_mode(mode: CameraOptimizerMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

impl Default for CameraOptimizerConfig {
    fn default() -> Self {
        Self {
            mode: CameraOptimizerMode::default(),
            trans_l2_penalty: default_trans_l2_penalty(),
            rot_l2_penalty: default_rot_l2_penalty(),
        }
    }
}

/// Configuration of optimization for camera velocities.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraVelocityOptimizerConfig {
    /// Optimize velocities.
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub enabled: bool,
    /// Do not use the velocities stored in cameras as a starting point.
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub zero_initial_velocities: bool,
    /// L2 penalty on linear velocity.
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_linear_l2_penalty")
    )]
    pub linear_l2_penalty: f64,
    /// L2 penalty on angular velocity.
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_angular_l2_penalty")
    )]
    pub angular_l2_penalty: f64,
}

impl Default for CameraVelocityOptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            zero_initial_velocities: false,
            linear_l2_penalty: default_linear_l2_penalty(),
            angular_l2_penalty: default_angular_l2_penalty(),
        }
    }
}

fn default_trans_l2_penalty() -> f64 {
    1e-4
}

fn default_rot_l2_penalty() -> f64 {
    1e-3
}

fn default_linear_l2_penalty() -> f64 {
    1e-6
}

fn default_angular_l2_penalty() -> f64 {
    1e-5
}
