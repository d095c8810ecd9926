use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrectionError {
    #[error("unrecognized camera optimizer mode `{0}`, expected one of `off`, `SO3xR3`, `SE3`")]
    UnknownMode(String),
    #[error("unrecognized device `{0}`, expected `cpu`, `cuda` or `cuda:<ordinal>`")]
    UnknownDevice(String),
    #[error("camera index {index} is out of range for {num_cameras} cameras")]
    IndexOutOfRange { index: usize, num_cameras: usize },
    #[error("camera {index} has no stored velocity to start from")]
    MissingVelocity { index: usize },
}

pub type Result<T, E = CorrectionError> = core::result::Result<T, E>;
