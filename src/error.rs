use std::time::Duration;

use thiserror::Error;

use crate::feature::FeatureKind;
use crate::pixel::PixelFormat;

/// Errors reported by the camera wrapper.
///
/// Each failure cause has its own variant so callers can tell "feature
/// absent" apart from "feature present but read failed" apart from "camera
/// not open".
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("feature '{name}' is not implemented by this device as {kind}")]
    FeatureUnavailable { name: String, kind: FeatureKind },

    #[error("feature '{0}' is not readable")]
    NotReadable(String),

    #[error("feature '{0}' is not writable")]
    NotWritable(String),

    #[error("feature '{name}' is {actual}, operation requires {expected}")]
    InvalidKind {
        name: String,
        expected: FeatureKind,
        actual: FeatureKind,
    },

    #[error("invalid value for feature '{name}': {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("no frame delivered within {0:?}")]
    AcquisitionTimeout(Duration),

    #[error("flat-field coefficient calculation failed: {0}")]
    CalculationFailed(String),

    #[error("unrecognized flat-field correction mode '{0}'")]
    UnknownCapability(String),

    #[error("no camera found")]
    NoDevice,

    #[error("camera {0} not found")]
    DeviceNotFound(String),

    #[error("camera is not open")]
    NotOpen,

    #[error("not supported: {0}")]
    Unsupported(String),

    #[error("unsupported pixel format {0}")]
    UnsupportedPixelFormat(PixelFormat),

    #[error("device error: {0}")]
    Device(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = CameraError> = std::result::Result<T, E>;

impl CameraError {
    pub(crate) fn unavailable(name: &str, kind: FeatureKind) -> Self {
        CameraError::FeatureUnavailable {
            name: name.to_string(),
            kind,
        }
    }

    pub(crate) fn invalid_value(name: &str, reason: impl Into<String>) -> Self {
        CameraError::InvalidValue {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// True for timeouts, the only failure a frame loop could reasonably
    /// report differently from a hard device fault.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CameraError::AcquisitionTimeout(_))
    }
}
