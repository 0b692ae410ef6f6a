use std::fmt;

use crate::device::FeatureControl;
use crate::error::{CameraError, Result};
use crate::feature::catalog as names;
use crate::feature::{Feature, FeatureDescriptor, FeatureKind};

/// Flat-field capability of a camera, read from `ShadingCorrectionMode`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FfcTier {
    /// No on-camera support: the SDK computes and applies coefficients.
    SoftwareCalculateSoftwareApply,
    /// The SDK computes from a bright field only; the camera applies.
    SoftwareCalculateDeviceApply,
    /// The SDK computes from a bright and an optional dark field; the camera
    /// applies.
    SoftwareCalculateDeviceApplyVariant,
    /// The camera computes (`FFCGenerate`) and applies.
    DeviceCalculateDeviceApply,
    /// A mode string this crate does not know.
    Unknown(String),
}

impl FfcTier {
    /// Map a `ShadingCorrectionMode` symbolic (`None` when the node is
    /// absent or unreadable).
    pub fn from_mode(mode: Option<&str>) -> Self {
        match mode {
            None => FfcTier::SoftwareCalculateSoftwareApply,
            Some("TailorFlatFieldCorrection") => FfcTier::SoftwareCalculateDeviceApply,
            Some("FlatFieldCorrection") => FfcTier::SoftwareCalculateDeviceApplyVariant,
            Some("DeviceFlatFieldCorrection") => FfcTier::DeviceCalculateDeviceApply,
            Some(other) => FfcTier::Unknown(other.to_string()),
        }
    }

    pub fn classify(features: &dyn FeatureControl) -> Result<Self> {
        let mode = Feature::resolve(
            features,
            FeatureDescriptor::new(names::SHADING_CORRECTION_MODE, FeatureKind::Enum),
        );
        if !mode.is_readable() {
            return Ok(FfcTier::SoftwareCalculateSoftwareApply);
        }
        let symbolic = mode.get_string()?;
        Ok(Self::from_mode(Some(&symbolic)))
    }

    pub fn calculates_on_device(&self) -> bool {
        matches!(self, FfcTier::DeviceCalculateDeviceApply)
    }

    pub fn applies_on_device(&self) -> bool {
        matches!(
            self,
            FfcTier::SoftwareCalculateDeviceApply
                | FfcTier::SoftwareCalculateDeviceApplyVariant
                | FfcTier::DeviceCalculateDeviceApply
        )
    }

    /// Whether `calculate(true)` captures a dark field.
    pub fn accepts_dark_field(&self) -> bool {
        matches!(
            self,
            FfcTier::SoftwareCalculateSoftwareApply | FfcTier::SoftwareCalculateDeviceApplyVariant
        )
    }
}

impl fmt::Display for FfcTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FfcTier::SoftwareCalculateSoftwareApply => f.write_str("software calculate / software apply"),
            FfcTier::SoftwareCalculateDeviceApply => f.write_str("software calculate / device apply"),
            FfcTier::SoftwareCalculateDeviceApplyVariant => {
                f.write_str("software calculate (bright+dark) / device apply")
            }
            FfcTier::DeviceCalculateDeviceApply => f.write_str("device calculate / device apply"),
            FfcTier::Unknown(mode) => write!(f, "unknown ({mode})"),
        }
    }
}

/// The strategy a controller runs. Chosen once from the tier; there is no
/// strategy for an unknown tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Strategy {
    SoftwareApply,
    SoftwareCalculateDeviceApply { dark_field: bool },
    DeviceCalculate,
}

impl Strategy {
    pub(crate) fn for_tier(tier: &FfcTier) -> Result<Self> {
        match tier {
            FfcTier::SoftwareCalculateSoftwareApply => Ok(Strategy::SoftwareApply),
            FfcTier::SoftwareCalculateDeviceApply => {
                Ok(Strategy::SoftwareCalculateDeviceApply { dark_field: false })
            }
            FfcTier::SoftwareCalculateDeviceApplyVariant => {
                Ok(Strategy::SoftwareCalculateDeviceApply { dark_field: true })
            }
            FfcTier::DeviceCalculateDeviceApply => Ok(Strategy::DeviceCalculate),
            FfcTier::Unknown(mode) => Err(CameraError::UnknownCapability(mode.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_table_is_total() {
        assert_eq!(FfcTier::from_mode(None), FfcTier::SoftwareCalculateSoftwareApply);
        assert_eq!(
            FfcTier::from_mode(Some("TailorFlatFieldCorrection")),
            FfcTier::SoftwareCalculateDeviceApply
        );
        assert_eq!(
            FfcTier::from_mode(Some("FlatFieldCorrection")),
            FfcTier::SoftwareCalculateDeviceApplyVariant
        );
        assert_eq!(
            FfcTier::from_mode(Some("DeviceFlatFieldCorrection")),
            FfcTier::DeviceCalculateDeviceApply
        );
        assert_eq!(
            FfcTier::from_mode(Some("LensShading")),
            FfcTier::Unknown("LensShading".into())
        );
    }

    #[test]
    fn unknown_tier_has_no_strategy() {
        let err = Strategy::for_tier(&FfcTier::Unknown("X".into())).unwrap_err();
        assert!(matches!(err, CameraError::UnknownCapability(mode) if mode == "X"));
        assert_eq!(
            Strategy::for_tier(&FfcTier::SoftwareCalculateDeviceApplyVariant).unwrap(),
            Strategy::SoftwareCalculateDeviceApply { dark_field: true }
        );
    }

    #[test]
    fn capability_flags() {
        assert!(!FfcTier::SoftwareCalculateSoftwareApply.applies_on_device());
        assert!(FfcTier::SoftwareCalculateSoftwareApply.accepts_dark_field());
        assert!(!FfcTier::SoftwareCalculateDeviceApply.accepts_dark_field());
        assert!(FfcTier::DeviceCalculateDeviceApply.calculates_on_device());
    }
}
