use crate::CorrectionError;
use average::{Max, Mean};
use camopt_core::nalgebra::Vector3;
use camopt_core::CameraIndex;
use core::fmt;
use core::str::FromStr;
use std::collections::{BTreeMap, BTreeSet};

/// Scalar contributions to the training loss, keyed by name.
pub type LossDict = BTreeMap<&'static str, f64>;

/// Diagnostic scalars reported to the training loop, keyed by name.
pub type MetricsDict = BTreeMap<&'static str, f64>;

/// Named parameter groups handed to an optimizer, which may use a different learning rate per
/// group.
pub type ParamGroups<'a> = BTreeMap<&'static str, Vec<&'a mut Parameter>>;

/// Where a parameter lives. Placement is fixed when the owning layer is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(u32),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(ordinal) => write!(f, "cuda:{}", ordinal),
        }
    }
}

impl FromStr for Device {
    type Err = CorrectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda(0)),
            _ => s
                .strip_prefix("cuda:")
                .and_then(|ordinal| ordinal.parse().ok())
                .map(Self::Cuda)
                .ok_or_else(|| CorrectionError::UnknownDevice(s.to_owned())),
        }
    }
}

/// A learnable `(rows, 3)` tensor together with its accumulated gradient.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub value: Vec<Vector3<f64>>,
    pub grad: Vec<Vector3<f64>>,
    device: Device,
}

impl Parameter {
    pub fn zeros(rows: usize, device: Device) -> Self {
        Self {
            value: vec![Vector3::zeros(); rows],
            grad: vec![Vector3::zeros(); rows],
            device,
        }
    }

    pub fn rows(&self) -> usize {
        self.value.len()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn zero_grad(&mut self) {
        self.grad.iter_mut().for_each(|g| *g = Vector3::zeros());
    }

    /// The L2 norm of every row.
    pub fn row_norms(&self) -> impl Iterator<Item = f64> + Clone + '_ {
        self.value.iter().map(|row| row.norm())
    }

    /// Mean of the row norms, `0.0` for an empty tensor.
    pub fn mean_norm(&self) -> f64 {
        mean_and_max(self.row_norms()).0
    }

    /// Largest row norm, `0.0` for an empty tensor.
    pub fn max_norm(&self) -> f64 {
        mean_and_max(self.row_norms()).1
    }

    /// Accumulates the gradient of `scale * mean_norm()` into `grad`.
    ///
    /// Rows with zero norm take the zero subgradient.
    pub(crate) fn accumulate_mean_norm_grad(&mut self, scale: f64) {
        let rows = self.value.len() as f64;
        for (grad, value) in self.grad.iter_mut().zip(&self.value) {
            let norm = value.norm();
            if norm > 0.0 {
                *grad += value * (scale / (rows * norm));
            }
        }
    }
}

/// Cameras whose corrections are pinned to the identity, such as held-out evaluation cameras.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NonTrainableMask {
    indices: BTreeSet<CameraIndex>,
    device: Device,
}

impl NonTrainableMask {
    pub fn new<I>(indices: I, device: Device) -> Self
    where
        I: IntoIterator,
        I::Item: Into<CameraIndex>,
    {
        Self {
            indices: indices.into_iter().map(Into::into).collect(),
            device,
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Moves the mask to `device`.
    #[must_use]
    pub fn to_device(self, device: Device) -> Self {
        Self { device, ..self }
    }

    pub fn contains(&self, index: CameraIndex) -> bool {
        self.indices.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = CameraIndex> + '_ {
        self.indices.iter().copied()
    }
}

/// Places an optional mask on the parameter device, logging when it had to move.
pub(crate) fn relocate_mask(
    mask: Option<NonTrainableMask>,
    device: Device,
) -> Option<NonTrainableMask> {
    mask.map(|mask| {
        if mask.device() != device {
            log::debug!(
                "moving non-trainable camera mask of {} cameras from {} to {}",
                mask.len(),
                mask.device(),
                device
            );
            mask.to_device(device)
        } else {
            mask
        }
    })
}

/// Mean and maximum of `values`, both `0.0` when there are none.
pub(crate) fn mean_and_max<I>(values: I) -> (f64, f64)
where
    I: Iterator<Item = f64> + Clone,
{
    let mean: Mean = values.clone().collect();
    if mean.is_empty() {
        return (0.0, 0.0);
    }
    let max: Max = values.collect();
    (mean.mean(), max.max())
}

/// Checks that `index` addresses a row of a tensor with `num_cameras` rows.
pub(crate) fn check_index(
    index: CameraIndex,
    num_cameras: usize,
) -> Result<usize, CorrectionError> {
    if index.0 < num_cameras {
        Ok(index.0)
    } else {
        Err(CorrectionError::IndexOutOfRange {
            index: index.0,
            num_cameras,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn device_names() {
        assert_eq!("cpu".parse(), Ok(Device::Cpu));
        assert_eq!("cuda".parse(), Ok(Device::Cuda(0)));
        assert_eq!("cuda:3".parse(), Ok(Device::Cuda(3)));
        assert_eq!(Device::Cuda(3).to_string(), "cuda:3");
        assert!("tpu".parse::<Device>().is_err());
        assert!("cuda:x".parse::<Device>().is_err());
    }

    #[test]
    fn norm_statistics() {
        let mut param = Parameter::zeros(2, Device::Cpu);
        assert_eq!(param.mean_norm(), 0.0);
        assert_eq!(param.max_norm(), 0.0);
        param.value[0] = Vector3::new(3.0, 4.0, 0.0);
        assert_relative_eq!(param.mean_norm(), 2.5);
        assert_relative_eq!(param.max_norm(), 5.0);
        assert_eq!(Parameter::zeros(0, Device::Cpu).mean_norm(), 0.0);
        assert_eq!(Parameter::zeros(0, Device::Cpu).max_norm(), 0.0);
    }

    #[test]
    fn mean_and_max_of_values() {
        assert_eq!(mean_and_max([1.0, 4.0, 1.0].into_iter()), (2.0, 4.0));
        assert_eq!(mean_and_max(core::iter::empty()), (0.0, 0.0));
    }

    #[test]
    fn mean_norm_gradient() {
        let mut param = Parameter::zeros(2, Device::Cpu);
        param.value[1] = Vector3::new(0.0, 2.0, 0.0);
        param.accumulate_mean_norm_grad(3.0);
        assert_eq!(param.grad[0], Vector3::zeros());
        assert_relative_eq!(param.grad[1], Vector3::new(0.0, 1.5, 0.0));
        param.zero_grad();
        assert_eq!(param.grad[1], Vector3::zeros());
    }

    #[test]
    fn mask_relocation() {
        let mask = NonTrainableMask::new([1usize, 4], Device::Cpu);
        let moved = relocate_mask(Some(mask), Device::Cuda(1)).unwrap();
        assert_eq!(moved.device(), Device::Cuda(1));
        assert!(moved.contains(CameraIndex(4)));
        assert!(!moved.contains(CameraIndex(2)));
        assert_eq!(moved.iter().collect::<Vec<_>>(), vec![CameraIndex(1), CameraIndex(4)]);
    }
}
