//! # camopt core
//!
//! Common types for learned camera corrections: the Lie-group exponential maps that turn a small
//! generator into a rigid transform, 3x4 pose utilities, and the camera and ray records that the
//! correction layers in `camopt` read and update.
//!
//! All rigid transforms are `[R | t]` 3x4 matrices, the top three rows of a homogeneous 4x4
//! matrix. A correction maps the optimized camera frame into the nominal camera frame, so a
//! corrected camera-to-world pose is `camera_to_world * correction`.
//!
//! ```text
//!   optimized frame --correction--> nominal frame --camera_to_world--> world
//! ```
//!
//! The exponential maps in [`lie`] are generic over [`nalgebra::RealField`], which lets them be
//! evaluated on dual numbers to obtain derivatives with respect to the generator.

mod camera;
pub mod lie;
mod pose;
mod rays;
mod so3;

pub use camera::*;
pub use nalgebra;
pub use pose::*;
pub use rays::*;
pub use so3::*;
