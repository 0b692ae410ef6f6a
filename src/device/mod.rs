//! Vendor SDK boundary.
//!
//! Everything the Galaxy SDK does for us is reached through the traits in
//! this module:
//! - `DeviceManager`: enumeration, open by index/serial, action commands
//! - `Device`: one open camera (remote feature control + data stream 0)
//! - `FeatureControl`: the remote device node map
//! - `DataStream`: stream on/off and blocking frame dequeue
//! - `ImageProcessor`: raw-to-RGB conversion and image improvement
//! - `FlatFieldEngine`: software flat-field coefficient calculation/apply
//!
//! The crate ships a simulated implementation (`stub://` URIs) used by the
//! tests and the binaries. The vendor library itself is not linked.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::{CameraError, Result};
use crate::feature::{FeatureKind, FeatureRange, FeatureValue, WriteValue};
use crate::frame::Frame;
use crate::pixel::{PixelFormat, ValidBits};

pub mod sim;

pub use sim::{SimCamera, SimDeviceManager, SimProbe};

/// Transport layer a device is attached through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TransportLayer {
    U3v,
    Gev,
    Usb2,
    Cxp,
}

/// Enumeration record for one camera.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// 1-based enumeration index, as the SDK numbers devices.
    pub index: u32,
    pub vendor_name: String,
    pub model_name: String,
    pub serial_number: String,
    pub transport: TransportLayer,
    /// Present for GigE Vision devices.
    pub ip_address: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Complete,
    Incomplete,
}

/// A frame as dequeued from the data stream, before conversion.
#[derive(Clone, Debug)]
pub struct RawImage {
    pub frame_id: u64,
    pub status: FrameStatus,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    /// Device timestamp in ticks.
    pub timestamp: u64,
    pub data: Vec<u8>,
}

impl RawImage {
    pub fn is_complete(&self) -> bool {
        self.status == FrameStatus::Complete
    }
}

/// Remote device node map.
pub trait FeatureControl: Send + Sync {
    fn is_implemented(&self, name: &str) -> bool;
    fn is_readable(&self, name: &str) -> bool;
    fn is_writable(&self, name: &str) -> bool;

    /// Declared kind of an implemented node.
    fn kind_of(&self, name: &str) -> Option<FeatureKind>;

    fn read(&self, name: &str) -> Result<FeatureValue>;
    fn write(&self, name: &str, value: WriteValue) -> Result<()>;

    /// `None` for kinds that have no range.
    fn range(&self, name: &str) -> Result<Option<FeatureRange>>;

    fn execute(&self, name: &str) -> Result<()>;

    fn string_max_length(&self, name: &str) -> Result<usize>;
    fn buffer_length(&self, name: &str) -> Result<usize>;
}

/// Data stream 0 of an open device.
pub trait DataStream: Send + Sync {
    fn stream_on(&self) -> Result<()>;
    fn stream_off(&self) -> Result<()>;
    fn is_streaming(&self) -> bool;

    /// Block until a frame arrives or `timeout` expires
    /// (`CameraError::AcquisitionTimeout`).
    fn get_image(&self, timeout: Duration) -> Result<RawImage>;

    /// Drop frames already queued; returns how many were discarded.
    fn flush_queue(&self) -> Result<usize>;
}

/// An open camera.
pub trait Device: Send + Sync {
    fn info(&self) -> &DeviceInfo;
    fn features(&self) -> &dyn FeatureControl;
    fn stream(&self) -> &dyn DataStream;
    fn close(&self) -> Result<()>;
}

/// Parameters of the SDK's image improvement pass.
#[derive(Clone, Debug, PartialEq)]
pub struct ImprovementConfig {
    pub gamma: f64,
    pub contrast: i64,
    pub color_correction: bool,
}

impl Default for ImprovementConfig {
    fn default() -> Self {
        Self {
            gamma: 1.0,
            contrast: 0,
            color_correction: false,
        }
    }
}

/// Raw format conversion and image improvement.
pub trait ImageProcessor: Send + Sync {
    /// Convert a raw frame to 8-bit RGB using the given bit window.
    fn convert(&self, raw: &RawImage, valid_bits: ValidBits) -> Result<Frame>;

    fn improve(&self, frame: &mut Frame, config: &ImprovementConfig) -> Result<()>;
}

/// Input to software flat-field coefficient calculation.
#[derive(Clone, Copy, Debug)]
pub struct FlatFieldInput<'a> {
    pub bright: &'a [u8],
    pub dark: Option<&'a [u8]>,
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// `None` lets the engine choose.
    pub block_size: Option<u32>,
    /// `None` targets the mean of the bright field.
    pub expected_gray: Option<u32>,
    pub frame_count: u32,
}

/// Software flat-field correction provided by the SDK.
pub trait FlatFieldEngine: Send + Sync {
    fn coefficients_size(&self, input: &FlatFieldInput<'_>) -> Result<usize>;
    fn calculate(&self, input: &FlatFieldInput<'_>, coefficients: &mut [u8]) -> Result<()>;
    fn apply(&self, image: &mut RawImage, coefficients: &[u8]) -> Result<()>;
}

/// Action command broadcast to a group of GigE Vision cameras.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionCommand {
    pub device_key: u32,
    pub group_key: u32,
    pub group_mask: u32,
    pub broadcast_address: String,
    pub special_address: String,
    pub timeout: Duration,
    pub expected_acks: usize,
    /// Device timestamp to fire at; `None` fires immediately.
    pub action_time: Option<u64>,
}

impl Default for ActionCommand {
    fn default() -> Self {
        Self {
            device_key: 1,
            group_key: 1,
            group_mask: 0xFFFF_FFFF,
            broadcast_address: "255.255.255.255".to_string(),
            special_address: String::new(),
            timeout: Duration::from_millis(500),
            expected_acks: 0,
            action_time: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionStatus {
    Success,
    Late,
    NoRefTime,
    Overflow,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionAck {
    pub device_ip: String,
    pub status: ActionStatus,
}

/// Entry point of the SDK.
pub trait DeviceManager: Send + Sync {
    fn update_device_list(&self) -> Result<Vec<DeviceInfo>>;

    fn update_device_list_ex(&self, transport: TransportLayer) -> Result<Vec<DeviceInfo>> {
        Ok(self
            .update_device_list()?
            .into_iter()
            .filter(|info| info.transport == transport)
            .collect())
    }

    /// Open by 1-based enumeration index.
    fn open_by_index(&self, index: u32) -> Result<Box<dyn Device>>;
    fn open_by_serial(&self, serial: &str) -> Result<Box<dyn Device>>;

    fn image_processor(&self) -> Arc<dyn ImageProcessor>;
    fn flat_field(&self) -> Arc<dyn FlatFieldEngine>;

    fn issue_action_command(&self, command: &ActionCommand) -> Result<Vec<ActionAck>>;
}

/// Resolve a device URI to a manager.
///
/// `stub://...` selects the simulated backend (see `sim::SimDeviceManager::from_uri`).
pub fn open_manager(uri: &str) -> Result<Arc<dyn DeviceManager>> {
    if uri.starts_with("stub://") {
        let manager = SimDeviceManager::from_uri(uri)?;
        log::info!("device manager: simulated backend ({uri})");
        return Ok(Arc::new(manager));
    }
    Err(CameraError::Unsupported(format!(
        "device uri '{uri}': the Galaxy SDK backend is not linked into this build; use stub://"
    )))
}
