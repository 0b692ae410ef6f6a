//! Camera session: one opened device and the operations on it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::device::{
    DataStream, Device, DeviceInfo, DeviceManager, FeatureControl, ImageProcessor,
    ImprovementConfig, RawImage,
};
use crate::error::{CameraError, Result};
use crate::feature::catalog as names;
use crate::feature::{Feature, FeatureDescriptor, FeatureKind};
use crate::frame::Frame;
use crate::pixel::PixelFormat;

/// Frame timeout used when the caller does not pick one.
pub const DEFAULT_GRAB_TIMEOUT: Duration = Duration::from_millis(1000);

/// Which enumerated camera to open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceSelector {
    /// 1-based enumeration index.
    Index(u32),
    Serial(String),
}

impl Default for DeviceSelector {
    fn default() -> Self {
        DeviceSelector::Index(1)
    }
}

impl FromStr for DeviceSelector {
    type Err = CameraError;

    /// A bare number selects by index, `sn:<serial>` (or any other text)
    /// by serial number.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CameraError::invalid_value("device", "empty selector"));
        }
        if let Some(serial) = s.strip_prefix("sn:") {
            return Ok(DeviceSelector::Serial(serial.to_string()));
        }
        match s.parse::<u32>() {
            Ok(0) => Err(CameraError::invalid_value("device", "indices start at 1")),
            Ok(index) => Ok(DeviceSelector::Index(index)),
            Err(_) => Ok(DeviceSelector::Serial(s.to_string())),
        }
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Index(index) => write!(f, "#{index}"),
            DeviceSelector::Serial(serial) => write!(f, "sn:{serial}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CameraOptions {
    /// Restore the `Default` user set right after opening.
    pub load_default_user_set: bool,
    /// Refuse mono sensors.
    pub require_color: bool,
    pub grab_timeout: Duration,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            load_default_user_set: true,
            require_color: false,
            grab_timeout: DEFAULT_GRAB_TIMEOUT,
        }
    }
}

/// An opened camera.
///
/// Features resolved from a camera borrow it, so a session cannot be closed
/// while any of them is alive:
///
/// ```
/// use galaxy_camera::device::open_manager;
/// use galaxy_camera::feature::FeatureKind;
/// use galaxy_camera::{Camera, CameraOptions, DeviceSelector};
///
/// let manager = open_manager("stub://").unwrap();
/// let camera = Camera::open(manager, DeviceSelector::Index(1), CameraOptions::default()).unwrap();
/// let gain = camera.feature("Gain", FeatureKind::Float);
/// gain.set(6.0).unwrap();
/// assert_eq!(gain.get_f64().unwrap(), 6.0);
/// camera.close().unwrap();
/// ```
///
/// ```compile_fail
/// use galaxy_camera::device::open_manager;
/// use galaxy_camera::feature::FeatureKind;
/// use galaxy_camera::{Camera, CameraOptions, DeviceSelector};
///
/// let manager = open_manager("stub://").unwrap();
/// let camera = Camera::open(manager, DeviceSelector::Index(1), CameraOptions::default()).unwrap();
/// let gain = camera.feature("Gain", FeatureKind::Float);
/// camera.close().unwrap();
/// gain.get().unwrap();
/// ```
pub struct Camera {
    manager: Arc<dyn DeviceManager>,
    device: Box<dyn Device>,
    processor: Arc<dyn ImageProcessor>,
    pixel_format: PixelFormat,
    color: bool,
    improvement: ImprovementConfig,
    grab_timeout: Duration,
    closed: bool,
}

impl Camera {
    pub fn open(
        manager: Arc<dyn DeviceManager>,
        selector: DeviceSelector,
        options: CameraOptions,
    ) -> Result<Self> {
        let devices = manager.update_device_list()?;
        if devices.is_empty() {
            return Err(CameraError::NoDevice);
        }

        let device = match &selector {
            DeviceSelector::Index(index) => manager.open_by_index(*index)?,
            DeviceSelector::Serial(serial) => manager.open_by_serial(serial)?,
        };
        let processor = manager.image_processor();
        let mut camera = Self {
            manager,
            device,
            processor,
            pixel_format: PixelFormat::Mono8,
            color: false,
            improvement: ImprovementConfig::default(),
            grab_timeout: options.grab_timeout,
            closed: false,
        };
        // Drop closes the device if setup fails.
        camera.setup(&options)?;
        Ok(camera)
    }

    fn setup(&mut self, options: &CameraOptions) -> Result<()> {
        if options.load_default_user_set {
            self.load_user_set("Default")?;
        }

        let format = self.feature(names::PIXEL_FORMAT, FeatureKind::Enum);
        if format.is_readable() {
            let symbolic = format.get_string()?;
            self.pixel_format = PixelFormat::from_symbolic(&symbolic)
                .ok_or_else(|| CameraError::Unsupported(format!("pixel format {symbolic}")))?;
        }

        let filter = self.feature(names::PIXEL_COLOR_FILTER, FeatureKind::Enum);
        self.color = if filter.is_readable() {
            filter.get_string()? != "None"
        } else {
            !self.pixel_format.is_gray()
        };
        if options.require_color && !self.color {
            return Err(CameraError::Unsupported(format!(
                "{} is a mono camera",
                self.info().model_name
            )));
        }

        let gamma = self.feature(names::GAMMA_PARAM, FeatureKind::Float);
        if gamma.is_readable() {
            self.improvement.gamma = gamma.get_f64()?;
        }
        let contrast = self.feature(names::CONTRAST_PARAM, FeatureKind::Integer);
        if contrast.is_readable() {
            self.improvement.contrast = contrast.get_i64()?;
        }
        self.improvement.color_correction = self.color;

        let info = self.info();
        log::info!(
            "opened {} {} (serial {}, {}, {})",
            info.vendor_name,
            info.model_name,
            info.serial_number,
            self.pixel_format,
            if self.color { "color" } else { "mono" }
        );
        Ok(())
    }

    pub fn info(&self) -> &DeviceInfo {
        self.device.info()
    }

    pub fn manager(&self) -> &Arc<dyn DeviceManager> {
        &self.manager
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub fn is_color(&self) -> bool {
        self.color
    }

    pub fn improvement(&self) -> &ImprovementConfig {
        &self.improvement
    }

    pub fn set_improvement(&mut self, config: ImprovementConfig) {
        self.improvement = config;
    }

    pub fn grab_timeout(&self) -> Duration {
        self.grab_timeout
    }

    pub fn features(&self) -> &dyn FeatureControl {
        self.device.features()
    }

    pub fn stream(&self) -> &dyn DataStream {
        self.device.stream()
    }

    /// Resolve a named control. Never fails; see [`Feature`].
    pub fn feature(&self, name: &str, kind: FeatureKind) -> Feature<'_> {
        Feature::resolve(self.device.features(), FeatureDescriptor::owned(name, kind))
    }

    pub fn resolve(&self, descriptor: &FeatureDescriptor) -> Feature<'_> {
        Feature::resolve(self.device.features(), descriptor.clone())
    }

    /// The catalogued standard controls, resolved against this camera.
    pub fn standard_features(&self) -> Vec<Feature<'_>> {
        names::STANDARD_FEATURES
            .iter()
            .map(|descriptor| self.resolve(descriptor))
            .collect()
    }

    pub fn load_user_set(&self, user_set: &str) -> Result<()> {
        self.feature(names::USER_SET_SELECTOR, FeatureKind::Enum)
            .set(user_set)?;
        self.feature(names::USER_SET_LOAD, FeatureKind::Command)
            .send_command()?;
        log::debug!("{}: user set {user_set} loaded", self.info().serial_number);
        Ok(())
    }

    /// Stream on, then `AcquisitionStart`.
    pub fn start_stream(&self) -> Result<()> {
        self.stream().stream_on()?;
        let start = self.feature(names::ACQUISITION_START, FeatureKind::Command);
        if start.is_available() {
            if let Err(err) = start.send_command() {
                if let Err(off) = self.stream().stream_off() {
                    log::error!("stream off after failed start: {off}");
                }
                return Err(err);
            }
        }
        log::debug!("{}: acquisition started", self.info().serial_number);
        Ok(())
    }

    /// `AcquisitionStop`, then stream off. Both are attempted; the first
    /// error is returned.
    pub fn stop_stream(&self) -> Result<()> {
        let stop = self.feature(names::ACQUISITION_STOP, FeatureKind::Command);
        let stopped = if stop.is_available() {
            stop.send_command()
        } else {
            Ok(())
        };
        let off = self.stream().stream_off();
        log::debug!("{}: acquisition stopped", self.info().serial_number);
        stopped.and(off)
    }

    /// Start acquisition for the lifetime of the returned guard.
    pub fn acquire(&self) -> Result<Acquisition<'_>> {
        self.start_stream()?;
        Ok(Acquisition {
            camera: self,
            active: true,
        })
    }

    pub fn grab_raw(&self, timeout: Duration) -> Result<RawImage> {
        let image = self.stream().get_image(timeout)?;
        log::debug!(
            "frame {} {}x{} {}",
            image.frame_id,
            image.width,
            image.height,
            image.pixel_format
        );
        Ok(image)
    }

    /// Next frame as BGR, converted and improved the way the camera type
    /// calls for.
    pub fn grab_frame(&self, timeout: Duration) -> Result<Frame> {
        let raw = self.grab_raw(timeout)?;
        if !raw.is_complete() {
            return Err(CameraError::Device(format!(
                "frame {} is incomplete",
                raw.frame_id
            )));
        }
        self.convert(&raw)
    }

    pub fn convert(&self, raw: &RawImage) -> Result<Frame> {
        let mut frame = self
            .processor
            .convert(raw, raw.pixel_format.best_valid_bits())?;
        if self.color {
            self.processor.improve(&mut frame, &self.improvement)?;
        }
        Ok(frame.into_bgr())
    }

    pub fn set_software_trigger_mode(&self) -> Result<()> {
        self.feature(names::TRIGGER_MODE, FeatureKind::Enum).set("On")?;
        self.feature(names::TRIGGER_SOURCE, FeatureKind::Enum)
            .set("Software")
    }

    pub fn set_continuous_mode(&self) -> Result<()> {
        self.feature(names::TRIGGER_MODE, FeatureKind::Enum).set("Off")
    }

    pub fn software_trigger(&self) -> Result<()> {
        self.feature(names::TRIGGER_SOFTWARE, FeatureKind::Command)
            .send_command()
    }

    /// Stop any running acquisition and release the device.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.stream().is_streaming() {
            if let Err(err) = self.stop_stream() {
                log::error!("stop stream on close: {err}");
            }
        }
        let serial = self.info().serial_number.clone();
        self.device.close()?;
        log::info!("closed camera {serial}");
        Ok(())
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::error!("close camera: {err}");
        }
    }
}

impl fmt::Debug for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Camera")
            .field("info", self.info())
            .field("pixel_format", &self.pixel_format)
            .field("color", &self.color)
            .finish_non_exhaustive()
    }
}

/// Running acquisition. Stops (AcquisitionStop + stream off) when dropped.
pub struct Acquisition<'cam> {
    camera: &'cam Camera,
    active: bool,
}

impl<'cam> Acquisition<'cam> {
    pub fn camera(&self) -> &'cam Camera {
        self.camera
    }

    pub fn grab_raw(&self, timeout: Duration) -> Result<RawImage> {
        self.camera.grab_raw(timeout)
    }

    pub fn grab_frame(&self, timeout: Duration) -> Result<Frame> {
        self.camera.grab_frame(timeout)
    }

    /// Stop now and report the result.
    pub fn stop(mut self) -> Result<()> {
        self.active = false;
        self.camera.stop_stream()
    }
}

impl Drop for Acquisition<'_> {
    fn drop(&mut self) {
        if self.active {
            if let Err(err) = self.camera.stop_stream() {
                log::error!("stop acquisition: {err}");
            }
        }
    }
}
