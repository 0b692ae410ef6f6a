use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::error::{CameraError, Result};
use crate::feature::catalog as names;
use crate::feature::FeatureKind;

/// Frame counts the firmware and the SDK accept.
pub const FRAME_COUNTS: [u32; 5] = [1, 2, 4, 8, 16];

/// Flat-field parameters pushed onto a camera by `configure`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfcParameters {
    pub expected_gray: u32,
    pub frame_count: u32,
    /// `FFCCoefficient` symbolic (device-calculating cameras only).
    pub coefficient_selector: Option<String>,
    /// `FFCAccuracy` symbolic (device-calculating cameras only).
    pub accuracy_selector: Option<String>,
    /// `None` leaves the block size to the device or SDK.
    pub block_size: Option<u32>,
    pub expected_gray_enabled: bool,
}

impl Default for FfcParameters {
    fn default() -> Self {
        Self {
            expected_gray: 127,
            frame_count: 1,
            coefficient_selector: None,
            accuracy_selector: None,
            block_size: None,
            expected_gray_enabled: true,
        }
    }
}

impl FfcParameters {
    /// Defaults, with coefficient selector, accuracy and block size taken
    /// from the camera's current settings where it exposes them.
    pub fn from_device(camera: &Camera) -> Result<Self> {
        let mut params = Self::default();

        let coefficient = camera.feature(names::FFC_COEFFICIENT, FeatureKind::Enum);
        if coefficient.is_readable() {
            params.coefficient_selector = Some(coefficient.get_string()?);
        }
        let accuracy = camera.feature(names::FFC_ACCURACY, FeatureKind::Enum);
        if accuracy.is_readable() {
            params.accuracy_selector = Some(accuracy.get_string()?);
        }
        let block = camera.feature(names::FFC_BLOCK_SIZE, FeatureKind::Enum);
        if block.is_readable() {
            if let Some(size) = block.get()?.as_i64() {
                params.block_size = u32::try_from(size).ok();
            }
        }
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.expected_gray > 255 {
            return Err(CameraError::invalid_value(
                names::FFC_EXPECTED_GRAY,
                format!("{} exceeds 255", self.expected_gray),
            ));
        }
        if !FRAME_COUNTS.contains(&self.frame_count) {
            return Err(CameraError::invalid_value(
                names::FFC_FRAME_COUNT,
                format!("{} not one of {FRAME_COUNTS:?}", self.frame_count),
            ));
        }
        if self.block_size == Some(0) {
            return Err(CameraError::invalid_value(names::FFC_BLOCK_SIZE, "zero"));
        }
        Ok(())
    }

    /// `FFCFrameCount` enum symbolic for this frame count.
    pub fn frame_count_symbolic(&self) -> String {
        format!("FFCFrameCount_{}", self.frame_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_mid_gray_with_one_frame() {
        let params = FfcParameters::default();
        assert_eq!(params.expected_gray, 127);
        assert_eq!(params.frame_count_symbolic(), "FFCFrameCount_1");
        params.validate().unwrap();
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let params = FfcParameters {
            frame_count: 3,
            ..FfcParameters::default()
        };
        assert!(params.validate().is_err());
        let params = FfcParameters {
            expected_gray: 300,
            ..FfcParameters::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let params: FfcParameters = serde_json::from_str(r#"{"frame_count": 4}"#).unwrap();
        assert_eq!(params.frame_count, 4);
        assert_eq!(params.expected_gray, 127);
        assert!(params.expected_gray_enabled);
    }
}
