//! Flat-field correction.
//!
//! Cameras differ in how much of the correction they do themselves. The
//! `ShadingCorrectionMode` node puts each camera in one [`FfcTier`], and a
//! [`FlatFieldCorrection`] controller runs the matching strategy:
//!
//! | tier | coefficients computed by | applied by | dark field |
//! |------|--------------------------|------------|------------|
//! | `SoftwareCalculateSoftwareApply` | SDK | SDK | optional |
//! | `SoftwareCalculateDeviceApply` | SDK | camera | no |
//! | `SoftwareCalculateDeviceApplyVariant` | SDK | camera | optional |
//! | `DeviceCalculateDeviceApply` | camera | camera | no |

mod coefficients;
mod dark;
mod params;
mod session;
mod tier;

pub use coefficients::CoefficientBuffer;
pub use dark::{DarkFieldPrompt, StdinPrompt};
pub use params::{FfcParameters, FRAME_COUNTS};
pub use session::{FfcState, FfcTimeouts, FlatFieldCorrection};
pub use tier::FfcTier;
