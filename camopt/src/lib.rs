//! Learned camera corrections for neural rendering.
//!
//! Camera poses coming out of structure-from-motion are rarely perfect. The layers in this crate
//! learn a small rigid correction per training camera ([`PoseCorrectionLayer`]) and an additive
//! correction to each camera's velocity ([`VelocityCorrectionLayer`]). Both are meant to sit in
//! a gradient-based training loop:
//!
//! 1. the forward calls ([`PoseCorrectionLayer::evaluate`],
//!    [`PoseCorrectionLayer::apply_to_ray_bundle`], [`PoseCorrectionLayer::apply_to_camera`],
//!    [`VelocityCorrectionLayer::evaluate`]) produce corrected quantities,
//! 2. the matching `backward*` calls accumulate gradients into the layer's parameters,
//! 3. [`PoseCorrectionLayer::trainable_parameters`] hands the parameters to an optimizer such as
//!    [`Sgd`] in named groups.
//!
//! The regularizers are reported through [`LossDict`] and diagnostics through [`MetricsDict`].

mod autodiff;
mod config;
mod error;
mod optimizer;
mod param;
mod pose_correction;
mod velocity_correction;

pub use autodiff::ExpJacobian;
pub use config::*;
pub use error::*;
pub use optimizer::*;
pub use param::{Device, LossDict, MetricsDict, NonTrainableMask, ParamGroups, Parameter};
pub use pose_correction::*;
pub use velocity_correction::*;
