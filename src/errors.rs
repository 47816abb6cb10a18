use thiserror::Error;

#[derive(Error, Debug)]
pub enum FanControlError {
    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("device not present: vendor '{vendor}', product '{product}'")]
    DeviceAbsent { vendor: String, product: String },

    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FanControlError {
    /// Negative errno a sensor framework would hand back to userspace.
    pub fn errno(&self) -> i32 {
        match self {
            FanControlError::Unsupported(_) => -95,     // EOPNOTSUPP
            FanControlError::InvalidArgument(_) => -22, // EINVAL
            FanControlError::DeviceAbsent { .. } => -19, // ENODEV
            FanControlError::ResourceUnavailable(_) => -16, // EBUSY
            FanControlError::PermissionDenied(_) => -13, // EACCES
            FanControlError::Io(_) => -5, // EIO
        }
    }
}
