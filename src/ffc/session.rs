use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::camera::Camera;
use crate::device::{FlatFieldEngine, FlatFieldInput, RawImage};
use crate::error::{CameraError, Result};
use crate::feature::catalog as names;
use crate::feature::{FeatureKind, SetValue};

use super::coefficients::CoefficientBuffer;
use super::dark::{DarkFieldPrompt, StdinPrompt};
use super::params::FfcParameters;
use super::tier::{FfcTier, Strategy};

/// Where a controller is in the configure / calculate / enable / persist
/// sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FfcState {
    Unconfigured,
    Configured,
    Calculated,
    CorrectionEnabled,
    CorrectionDisabled,
    Persisted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FfcTimeouts {
    pub bright: Duration,
    pub dark: Duration,
    pub image: Duration,
}

impl Default for FfcTimeouts {
    fn default() -> Self {
        Self {
            bright: Duration::from_millis(5000),
            dark: Duration::from_millis(2000),
            image: Duration::from_millis(5000),
        }
    }
}

/// Parameters the software engine needs at calculation time.
#[derive(Clone, Copy, Debug)]
struct EngineSettings {
    block_size: Option<u32>,
    expected_gray: Option<u32>,
    frame_count: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            block_size: None,
            expected_gray: None,
            frame_count: 1,
        }
    }
}

/// Flat-field correction controller for one camera.
///
/// The strategy is fixed at construction from the camera's [`FfcTier`].
pub struct FlatFieldCorrection<'cam> {
    camera: &'cam Camera,
    tier: FfcTier,
    strategy: Strategy,
    engine: Arc<dyn FlatFieldEngine>,
    prompt: Box<dyn DarkFieldPrompt + 'cam>,
    timeouts: FfcTimeouts,
    settings: EngineSettings,
    coefficients: CoefficientBuffer,
    /// Coefficients exist (in memory or on the device).
    calculated: bool,
    /// In-memory coefficients have been written to `FFCValueAll`.
    uploaded: bool,
    correction_enabled: bool,
    state: FfcState,
}

impl<'cam> FlatFieldCorrection<'cam> {
    /// Classify the camera and select its strategy.
    ///
    /// Fails with `UnknownCapability` for an unrecognized
    /// `ShadingCorrectionMode`.
    pub fn new(camera: &'cam Camera) -> Result<Self> {
        let tier = FfcTier::classify(camera.features())?;
        let strategy = Strategy::for_tier(&tier)?;
        log::info!("{}: flat-field tier {tier}", camera.info().serial_number);
        Ok(Self {
            camera,
            tier,
            strategy,
            engine: camera.manager().flat_field(),
            prompt: Box::new(StdinPrompt),
            timeouts: FfcTimeouts::default(),
            settings: EngineSettings::default(),
            coefficients: CoefficientBuffer::default(),
            calculated: false,
            uploaded: false,
            correction_enabled: false,
            state: FfcState::Unconfigured,
        })
    }

    pub fn with_dark_prompt(mut self, prompt: impl DarkFieldPrompt + 'cam) -> Self {
        self.prompt = Box::new(prompt);
        self
    }

    pub fn with_timeouts(mut self, timeouts: FfcTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn tier(&self) -> &FfcTier {
        &self.tier
    }

    pub fn state(&self) -> FfcState {
        self.state
    }

    pub fn coefficients(&self) -> &CoefficientBuffer {
        &self.coefficients
    }

    pub fn is_correction_enabled(&self) -> bool {
        self.correction_enabled
    }

    /// Write a control only when the device implements it and it is
    /// writable; otherwise skip it.
    fn write_if_supported(&self, name: &str, kind: FeatureKind, value: impl Into<SetValue>) -> Result<bool> {
        let feature = self.camera.feature(name, kind);
        if !feature.is_writable() {
            log::warn!("{name}: not supported by this camera, skipped");
            return Ok(false);
        }
        feature.set(value)?;
        Ok(true)
    }

    fn command_if_supported(&self, name: &str) -> Result<bool> {
        let feature = self.camera.feature(name, FeatureKind::Command);
        if !feature.is_writable() {
            log::warn!("{name}: not supported by this camera");
            return Ok(false);
        }
        feature.send_command()?;
        Ok(true)
    }

    /// Push `params` onto the controls this tier uses.
    pub fn configure(&mut self, params: &FfcParameters) -> Result<()> {
        params.validate()?;
        let expected_gray = params.expected_gray_enabled.then_some(params.expected_gray);

        match self.strategy {
            Strategy::SoftwareApply => {
                self.settings = EngineSettings {
                    block_size: None,
                    expected_gray,
                    frame_count: params.frame_count,
                };
                self.write_if_supported(
                    names::FFC_FRAME_COUNT,
                    FeatureKind::Enum,
                    params.frame_count_symbolic(),
                )?;
            }
            Strategy::SoftwareCalculateDeviceApply { .. } | Strategy::DeviceCalculate => {
                if let Some(block) = params.block_size {
                    self.write_if_supported(names::FFC_BLOCK_SIZE, FeatureKind::Enum, block)?;
                }
                self.write_if_supported(
                    names::FFC_EXPECTED_GRAY,
                    FeatureKind::Integer,
                    params.expected_gray,
                )?;
                self.write_if_supported(
                    names::FFC_FRAME_COUNT,
                    FeatureKind::Enum,
                    params.frame_count_symbolic(),
                )?;
                self.write_if_supported(
                    names::FFC_EXPECTED_GRAY_VALUE_ENABLE,
                    FeatureKind::Enum,
                    if params.expected_gray_enabled { "On" } else { "Off" },
                )?;
                self.settings = EngineSettings {
                    block_size: params.block_size,
                    expected_gray,
                    frame_count: params.frame_count,
                };
            }
        }

        if self.strategy == Strategy::DeviceCalculate {
            if let Some(selector) = &params.coefficient_selector {
                self.write_if_supported(names::FFC_COEFFICIENT, FeatureKind::Enum, selector.as_str())?;
            }
            if let Some(accuracy) = &params.accuracy_selector {
                self.write_if_supported(names::FFC_ACCURACY, FeatureKind::Enum, accuracy.as_str())?;
            }
        }

        log::info!(
            "flat-field configured: gray {:?}, frames {}, block {:?}",
            expected_gray,
            params.frame_count,
            params.block_size
        );
        self.state = FfcState::Configured;
        Ok(())
    }

    /// Capture and compute coefficients. `need_dark` adds a dark field on
    /// tiers that use one.
    pub fn calculate(&mut self, need_dark: bool) -> Result<()> {
        match self.strategy {
            Strategy::SoftwareApply => self.calculate_in_software(need_dark),
            Strategy::SoftwareCalculateDeviceApply { dark_field } => {
                self.calculate_in_software(need_dark && dark_field)
            }
            Strategy::DeviceCalculate => self.calculate_on_device(),
        }?;
        self.calculated = true;
        self.state = FfcState::Calculated;
        Ok(())
    }

    fn calculate_in_software(&mut self, dark_field: bool) -> Result<()> {
        let camera = self.camera;
        let acquisition = camera.acquire()?;
        let bright = acquisition.grab_raw(self.timeouts.bright)?;
        let dark = if dark_field {
            self.prompt.cover_lens()?;
            let stale = camera.stream().flush_queue()?;
            log::debug!("dark field: dropped {stale} queued frames");
            Some(acquisition.grab_raw(self.timeouts.dark)?)
        } else {
            None
        };
        acquisition.stop()?;

        let coefficients = self.compute(&bright, dark.as_ref())?;
        log::info!(
            "flat-field coefficients computed ({} bytes{})",
            coefficients.len(),
            if dark.is_some() { ", with dark field" } else { "" }
        );
        self.coefficients = coefficients;
        self.uploaded = false;
        Ok(())
    }

    fn compute(&self, bright: &RawImage, dark: Option<&RawImage>) -> Result<CoefficientBuffer> {
        let input = FlatFieldInput {
            bright: &bright.data,
            dark: dark.map(|image| image.data.as_slice()),
            pixel_format: bright.pixel_format,
            width: bright.width,
            height: bright.height,
            block_size: self.settings.block_size,
            expected_gray: self.settings.expected_gray,
            frame_count: self.settings.frame_count,
        };
        let size = self.engine.coefficients_size(&input)?;
        let mut coefficients = CoefficientBuffer::zeroed(size);
        self.engine.calculate(&input, coefficients.as_mut_bytes())?;
        Ok(coefficients)
    }

    fn calculate_on_device(&mut self) -> Result<()> {
        let generate = self.camera.feature(names::FFC_GENERATE, FeatureKind::Command);
        if !generate.is_writable() {
            return Err(CameraError::CalculationFailed(format!(
                "{} is not supported by this camera",
                names::FFC_GENERATE
            )));
        }
        let acquisition = self.camera.acquire()?;
        generate
            .send_command()
            .map_err(|err| CameraError::CalculationFailed(format!("{}: {err}", names::FFC_GENERATE)))?;
        acquisition.stop()?;
        log::info!("flat-field coefficients generated on device");
        Ok(())
    }

    /// Switch correction on or off.
    pub fn enable_correction(&mut self, enable: bool) -> Result<()> {
        if self.tier.applies_on_device() {
            self.write_if_supported(
                names::FLAT_FIELD_CORRECTION,
                FeatureKind::Enum,
                if enable { "On" } else { "Off" },
            )?;
        }
        self.correction_enabled = enable;
        self.state = if enable {
            FfcState::CorrectionEnabled
        } else {
            FfcState::CorrectionDisabled
        };
        Ok(())
    }

    /// Write in-memory coefficients to the device if they are not there yet.
    fn upload(&mut self) -> Result<()> {
        if self.uploaded || self.coefficients.is_empty() {
            return Ok(());
        }
        let value_all = self.camera.feature(names::FFC_VALUE_ALL, FeatureKind::Buffer);
        if value_all.is_writable() {
            value_all.set_buffer(self.coefficients.as_bytes())?;
            self.uploaded = true;
            log::debug!("uploaded {} coefficient bytes", self.coefficients.len());
        }
        Ok(())
    }

    /// One frame, corrected when coefficients exist and correction is
    /// enabled.
    pub fn corrected_image(&mut self) -> Result<RawImage> {
        if matches!(self.strategy, Strategy::SoftwareCalculateDeviceApply { .. }) {
            self.upload()?;
        }

        let acquisition = self.camera.acquire()?;
        let mut image = acquisition.grab_raw(self.timeouts.image)?;
        acquisition.stop()?;

        if self.strategy == Strategy::SoftwareApply
            && self.correction_enabled
            && self.calculated
            && !self.coefficients.is_empty()
        {
            self.engine.apply(&mut image, self.coefficients.as_bytes())?;
        }
        Ok(image)
    }

    /// Persist coefficients. A non-empty path writes a file; an empty path
    /// stores them in device flash when the camera supports it.
    ///
    /// Returns `Ok(false)` when there is nothing to save or the target is
    /// not supported.
    pub fn save_coefficients(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        let saved = match (self.strategy, path.as_os_str().is_empty()) {
            (Strategy::SoftwareApply, true) => false,
            (Strategy::SoftwareApply, false) => {
                if self.coefficients.is_empty() {
                    false
                } else {
                    self.coefficients.save(path)?;
                    true
                }
            }
            (_, false) => self.save_from_device(path)?,
            (_, true) => {
                self.upload()?;
                self.command_if_supported(names::FFC_FLASH_SAVE)?
            }
        };
        if saved {
            self.state = FfcState::Persisted;
        }
        Ok(saved)
    }

    fn save_from_device(&mut self, path: &Path) -> Result<bool> {
        let size = self.camera.feature(names::FFC_COEFFICIENTS_SIZE, FeatureKind::Integer);
        let value_all = self.camera.feature(names::FFC_VALUE_ALL, FeatureKind::Buffer);
        if !(size.is_readable() && value_all.is_readable()) {
            log::warn!("camera cannot export flat-field coefficients");
            return Ok(false);
        }
        self.upload()?;
        let expected = size.get_i64()?;
        let buffer = CoefficientBuffer::new(value_all.get_buffer()?);
        if buffer.is_empty() {
            return Ok(false);
        }
        if buffer.len() as i64 != expected {
            log::warn!(
                "{} reports {expected} bytes, buffer holds {}",
                names::FFC_COEFFICIENTS_SIZE,
                buffer.len()
            );
        }
        buffer.save(path)?;
        self.coefficients = buffer;
        self.uploaded = true;
        Ok(true)
    }

    /// Load coefficients. A non-empty path reads a file (and writes it to
    /// the device on device-applying tiers); an empty path loads from
    /// device flash and re-reads the coefficients.
    pub fn load_coefficients(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        let loaded = match (self.strategy, path.as_os_str().is_empty()) {
            (Strategy::SoftwareApply, true) => false,
            (Strategy::SoftwareApply, false) => {
                let buffer = CoefficientBuffer::load(path)?;
                if buffer.is_empty() {
                    false
                } else {
                    self.coefficients = buffer;
                    true
                }
            }
            (_, false) => self.load_into_device(path)?,
            (_, true) => self.load_from_flash()?,
        };
        if loaded {
            self.calculated = true;
            self.state = FfcState::Calculated;
        }
        Ok(loaded)
    }

    fn load_into_device(&mut self, path: &Path) -> Result<bool> {
        let size = self.camera.feature(names::FFC_COEFFICIENTS_SIZE, FeatureKind::Integer);
        let value_all = self.camera.feature(names::FFC_VALUE_ALL, FeatureKind::Buffer);
        if !(size.is_readable() && value_all.is_writable()) {
            log::warn!("camera cannot import flat-field coefficients");
            return Ok(false);
        }
        let buffer = CoefficientBuffer::load(path)?;
        if buffer.is_empty() {
            return Ok(false);
        }
        value_all.set_buffer(buffer.as_bytes())?;
        self.coefficients = buffer;
        self.uploaded = true;
        Ok(true)
    }

    fn load_from_flash(&mut self) -> Result<bool> {
        let size = self.camera.feature(names::FFC_COEFFICIENTS_SIZE, FeatureKind::Integer);
        let value_all = self.camera.feature(names::FFC_VALUE_ALL, FeatureKind::Buffer);
        if !(size.is_readable() && value_all.is_readable()) {
            log::warn!("camera cannot read back flat-field coefficients");
            return Ok(false);
        }
        if !self.command_if_supported(names::FFC_FLASH_LOAD)? {
            return Ok(false);
        }
        let expected = size.get_i64()?;
        let buffer = CoefficientBuffer::new(value_all.get_buffer()?);
        log::debug!("flash load: {} bytes ({} reported)", buffer.len(), expected);
        if buffer.is_empty() {
            log::warn!("device flash holds no flat-field coefficients");
            return Ok(false);
        }
        self.coefficients = buffer;
        self.uploaded = true;
        Ok(true)
    }
}

impl fmt::Debug for FlatFieldCorrection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlatFieldCorrection")
            .field("tier", &self.tier)
            .field("state", &self.state)
            .field("coefficients", &self.coefficients)
            .field("correction_enabled", &self.correction_enabled)
            .finish_non_exhaustive()
    }
}
