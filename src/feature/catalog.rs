//! Names of the controls this crate touches.

use super::kind::{FeatureDescriptor, FeatureKind};

pub const DEVICE_VENDOR_NAME: &str = "DeviceVendorName";
pub const DEVICE_MODEL_NAME: &str = "DeviceModelName";
pub const DEVICE_SERIAL_NUMBER: &str = "DeviceSerialNumber";
pub const DEVICE_USER_ID: &str = "DeviceUserID";
pub const PIXEL_COLOR_FILTER: &str = "PixelColorFilter";
pub const PIXEL_FORMAT: &str = "PixelFormat";
pub const WIDTH: &str = "Width";
pub const HEIGHT: &str = "Height";

pub const BINNING_HORIZONTAL: &str = "BinningHorizontal";
pub const BINNING_VERTICAL: &str = "BinningVertical";
pub const GAIN: &str = "Gain";
pub const GAIN_AUTO: &str = "GainAuto";
pub const EXPOSURE_TIME: &str = "ExposureTime";
pub const USER_SET_SELECTOR: &str = "UserSetSelector";
pub const USER_SET_LOAD: &str = "UserSetLoad";
pub const TRIGGER_MODE: &str = "TriggerMode";
pub const TRIGGER_SOURCE: &str = "TriggerSource";
pub const TRIGGER_SOFTWARE: &str = "TriggerSoftware";
pub const ACQUISITION_START: &str = "AcquisitionStart";
pub const ACQUISITION_STOP: &str = "AcquisitionStop";
pub const GAMMA_PARAM: &str = "GammaParam";
pub const CONTRAST_PARAM: &str = "ContrastParam";

pub const SHADING_CORRECTION_MODE: &str = "ShadingCorrectionMode";
pub const FFC_BLOCK_SIZE: &str = "FFCBlockSize";
pub const FFC_EXPECTED_GRAY: &str = "FFCExpectedGray";
pub const FFC_EXPECTED_GRAY_VALUE_ENABLE: &str = "FFCExpectedGrayValueEnable";
pub const FFC_FRAME_COUNT: &str = "FFCFrameCount";
pub const FFC_COEFFICIENT: &str = "FFCCoefficient";
pub const FFC_ACCURACY: &str = "FFCAccuracy";
pub const FLAT_FIELD_CORRECTION: &str = "FlatFieldCorrection";
pub const FFC_GENERATE: &str = "FFCGenerate";
pub const FFC_VALUE_ALL: &str = "FFCValueAll";
pub const FFC_COEFFICIENTS_SIZE: &str = "FFCCoefficientsSize";
pub const FFC_FLASH_SAVE: &str = "FFCFlashSave";
pub const FFC_FLASH_LOAD: &str = "FFCFlashLoad";

pub const GEV_SUPPORTED_OPTION_SELECTOR: &str = "GevSupportedOptionSelector";
pub const GEV_SUPPORTED_OPTION: &str = "GevSupportedOption";
pub const ACTION_DEVICE_KEY: &str = "ActionDeviceKey";
pub const ACTION_GROUP_KEY: &str = "ActionGroupKey";
pub const ACTION_GROUP_MASK: &str = "ActionGroupMask";
pub const PTP_ENABLE: &str = "PtpEnable";
pub const PTP_STATUS: &str = "PtpStatus";
pub const TIMESTAMP_LATCH: &str = "TimestampLatch";
pub const TIMESTAMP_LATCH_VALUE: &str = "TimestampLatchValue";

/// Controls exposed on every opened camera.
pub const STANDARD_FEATURES: [FeatureDescriptor; 10] = [
    FeatureDescriptor::new(BINNING_HORIZONTAL, FeatureKind::Integer),
    FeatureDescriptor::new(BINNING_VERTICAL, FeatureKind::Integer),
    FeatureDescriptor::new(GAIN, FeatureKind::Float),
    FeatureDescriptor::new(GAIN_AUTO, FeatureKind::Enum),
    FeatureDescriptor::new(USER_SET_SELECTOR, FeatureKind::Enum),
    FeatureDescriptor::new(USER_SET_LOAD, FeatureKind::Command),
    FeatureDescriptor::new(EXPOSURE_TIME, FeatureKind::Float),
    FeatureDescriptor::new(TRIGGER_SOFTWARE, FeatureKind::Command),
    FeatureDescriptor::new(TRIGGER_MODE, FeatureKind::Enum),
    FeatureDescriptor::new(TRIGGER_SOURCE, FeatureKind::Enum),
];

/// Flat-field controls, with the kinds the firmware declares them as.
pub const FFC_FEATURES: [FeatureDescriptor; 14] = [
    FeatureDescriptor::new(SHADING_CORRECTION_MODE, FeatureKind::Enum),
    FeatureDescriptor::new(FFC_BLOCK_SIZE, FeatureKind::Enum),
    FeatureDescriptor::new(FFC_EXPECTED_GRAY, FeatureKind::Integer),
    FeatureDescriptor::new(FFC_EXPECTED_GRAY_VALUE_ENABLE, FeatureKind::Enum),
    FeatureDescriptor::new(FFC_FRAME_COUNT, FeatureKind::Enum),
    FeatureDescriptor::new(FFC_COEFFICIENT, FeatureKind::Enum),
    FeatureDescriptor::new(FFC_ACCURACY, FeatureKind::Enum),
    FeatureDescriptor::new(FLAT_FIELD_CORRECTION, FeatureKind::Enum),
    FeatureDescriptor::new(FFC_GENERATE, FeatureKind::Command),
    FeatureDescriptor::new(FFC_VALUE_ALL, FeatureKind::Buffer),
    FeatureDescriptor::new(FFC_COEFFICIENTS_SIZE, FeatureKind::Integer),
    FeatureDescriptor::new(FFC_FLASH_SAVE, FeatureKind::Command),
    FeatureDescriptor::new(FFC_FLASH_LOAD, FeatureKind::Command),
    FeatureDescriptor::new(ACQUISITION_START, FeatureKind::Command),
];

/// Kind of a catalogued control, if known.
pub fn kind_of(name: &str) -> Option<FeatureKind> {
    STANDARD_FEATURES
        .iter()
        .chain(FFC_FEATURES.iter())
        .find(|d| d.name() == name)
        .map(|d| d.kind())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_kinds() {
        assert_eq!(kind_of(GAIN), Some(FeatureKind::Float));
        assert_eq!(kind_of(FFC_VALUE_ALL), Some(FeatureKind::Buffer));
        assert_eq!(kind_of(FFC_FRAME_COUNT), Some(FeatureKind::Enum));
        assert_eq!(kind_of("Nope"), None);
    }
}
