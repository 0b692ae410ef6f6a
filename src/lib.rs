//! Galaxy camera wrapper
//!
//! Strongly typed access to GenICam-style industrial cameras driven by the
//! Galaxy SDK, plus a flat-field-correction controller that adapts to what
//! each camera can do on its own.
//!
//! # Module Structure
//!
//! - `device`: the SDK boundary (traits) and the simulated `stub://` backend
//! - `feature`: named, typed device controls (`Feature`, `FeatureKind`, ...)
//! - `camera`: an opened camera session and its acquisition guard
//! - `ffc`: capability tiers and the flat-field correction controller
//! - `trigger`: two-thread software-trigger loop
//! - `action`: GigE action commands and PTP-scheduled actions
//! - `detect`: object detection backends fed with frames
//! - `config`: settings shared by the `gx_*` tools
//!
//! ```
//! use galaxy_camera::device::open_manager;
//! use galaxy_camera::ffc::{FfcParameters, FfcTier, FlatFieldCorrection};
//! use galaxy_camera::{Camera, CameraOptions, DeviceSelector};
//!
//! let manager = open_manager("stub://?ffc=DeviceFlatFieldCorrection").unwrap();
//! let camera = Camera::open(manager, DeviceSelector::Index(1), CameraOptions::default()).unwrap();
//! let mut ffc = FlatFieldCorrection::new(&camera).unwrap();
//! assert_eq!(ffc.tier(), &FfcTier::DeviceCalculateDeviceApply);
//! ffc.configure(&FfcParameters::default()).unwrap();
//! ffc.calculate(false).unwrap();
//! ffc.enable_correction(true).unwrap();
//! let image = ffc.corrected_image().unwrap();
//! assert!(image.is_complete());
//! ```

pub mod action;
pub mod camera;
pub mod config;
pub mod detect;
pub mod device;
pub mod error;
pub mod feature;
pub mod ffc;
pub mod frame;
pub mod pixel;
pub mod trigger;

pub use camera::{Acquisition, Camera, CameraOptions, DeviceSelector, DEFAULT_GRAB_TIMEOUT};
pub use device::{open_manager, DeviceInfo, DeviceManager, RawImage};
pub use error::{CameraError, Result};
pub use feature::{Feature, FeatureDescriptor, FeatureKind, FeatureValue};
pub use ffc::{FfcParameters, FfcTier, FlatFieldCorrection};
pub use frame::{ChannelOrder, Frame};
pub use pixel::PixelFormat;
pub use trigger::{run_software_trigger_loop, CancelToken};
