use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::camera::{Camera, CameraOptions, DeviceSelector, DEFAULT_GRAB_TIMEOUT};
use crate::feature::catalog as names;
use crate::feature::{FeatureKind, SetValue};
use crate::ffc::FfcParameters;

const DEFAULT_DEVICE_URI: &str = "stub://";
const DEFAULT_TRIGGER_INTERVAL_MS: u64 = 500;
const DEFAULT_DETECT_ENDPOINT: &str = "https://detect.roboflow.com";
const DEFAULT_DETECT_MODEL: &str = "simplefruits/1";
const DEFAULT_DETECT_INPUT_SIZE: u32 = 416;
const DEFAULT_DETECT_CONFIDENCE: u32 = 40;
const DEFAULT_DETECT_OVERLAP: u32 = 30;

#[derive(Debug, Deserialize, Default)]
struct ToolConfigFile {
    device: Option<DeviceConfigFile>,
    acquisition: Option<AcquisitionConfigFile>,
    trigger: Option<TriggerConfigFile>,
    ffc: Option<FfcConfigFile>,
    detect: Option<DetectConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DeviceConfigFile {
    uri: Option<String>,
    selector: Option<String>,
    timeout_ms: Option<u64>,
    require_color: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct AcquisitionConfigFile {
    exposure_time: Option<f64>,
    gain: Option<f64>,
    binning: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct TriggerConfigFile {
    interval_ms: Option<u64>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct FfcConfigFile {
    #[serde(flatten)]
    params: FfcParameters,
    file: Option<PathBuf>,
    need_dark: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectConfigFile {
    endpoint: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    input_size: Option<u32>,
    confidence: Option<u32>,
    overlap: Option<u32>,
}

/// Settings shared by the `gx_*` tools.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub device_uri: String,
    pub device: DeviceSelector,
    pub grab_timeout: Duration,
    pub require_color: bool,
    pub acquisition: AcquisitionSettings,
    pub trigger: TriggerLoopSettings,
    pub ffc: FfcSettings,
    pub detect: DetectSettings,
}

/// Values applied after opening; `None` leaves the camera's own value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionSettings {
    pub exposure_time: Option<f64>,
    pub gain: Option<f64>,
    pub binning: Option<u32>,
}

impl AcquisitionSettings {
    /// Write the configured values; controls the camera lacks are skipped.
    pub fn apply(&self, camera: &Camera) -> crate::Result<()> {
        let write = |name: &str, kind: FeatureKind, value: SetValue| -> crate::Result<()> {
            let feature = camera.feature(name, kind);
            if feature.is_writable() {
                feature.set(value)?;
                log::info!("{name} = {}", feature.get()?);
            } else {
                log::warn!("{name}: not writable on this camera, skipped");
            }
            Ok(())
        };
        if let Some(exposure) = self.exposure_time {
            write(names::EXPOSURE_TIME, FeatureKind::Float, exposure.into())?;
        }
        if let Some(gain) = self.gain {
            write(names::GAIN, FeatureKind::Float, gain.into())?;
        }
        if let Some(binning) = self.binning {
            write(names::BINNING_HORIZONTAL, FeatureKind::Integer, binning.into())?;
            write(names::BINNING_VERTICAL, FeatureKind::Integer, binning.into())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TriggerLoopSettings {
    pub interval: Duration,
    pub max_frames: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct FfcSettings {
    pub params: FfcParameters,
    /// Coefficient file; `None` uses device flash where available.
    pub file: Option<PathBuf>,
    pub need_dark: bool,
}

#[derive(Debug, Clone)]
pub struct DetectSettings {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub input_size: u32,
    pub confidence: u32,
    pub overlap: u32,
}

impl ToolConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("GALAXY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn camera_options(&self) -> CameraOptions {
        CameraOptions {
            require_color: self.require_color,
            grab_timeout: self.grab_timeout,
            ..CameraOptions::default()
        }
    }

    fn from_file(file: ToolConfigFile) -> Result<Self> {
        let device = file.device.unwrap_or_default();
        let device_uri = device
            .uri
            .unwrap_or_else(|| DEFAULT_DEVICE_URI.to_string());
        let selector = match device.selector.as_deref() {
            Some(selector) => parse_selector(selector)?,
            None => DeviceSelector::default(),
        };
        let grab_timeout = device
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_GRAB_TIMEOUT);

        let acquisition = file
            .acquisition
            .map(|acq| AcquisitionSettings {
                exposure_time: acq.exposure_time,
                gain: acq.gain,
                binning: acq.binning,
            })
            .unwrap_or_default();

        let trigger = TriggerLoopSettings {
            interval: Duration::from_millis(
                file.trigger
                    .as_ref()
                    .and_then(|trigger| trigger.interval_ms)
                    .unwrap_or(DEFAULT_TRIGGER_INTERVAL_MS),
            ),
            max_frames: file.trigger.and_then(|trigger| trigger.max_frames),
        };

        let ffc = match file.ffc {
            Some(ffc) => FfcSettings {
                params: ffc.params,
                file: ffc.file,
                need_dark: ffc.need_dark.unwrap_or(false),
            },
            None => FfcSettings {
                params: FfcParameters::default(),
                file: None,
                need_dark: false,
            },
        };

        let detect = file.detect.unwrap_or_default();
        let detect = DetectSettings {
            endpoint: detect
                .endpoint
                .unwrap_or_else(|| DEFAULT_DETECT_ENDPOINT.to_string()),
            model: detect
                .model
                .unwrap_or_else(|| DEFAULT_DETECT_MODEL.to_string()),
            api_key: detect.api_key,
            input_size: detect.input_size.unwrap_or(DEFAULT_DETECT_INPUT_SIZE),
            confidence: detect.confidence.unwrap_or(DEFAULT_DETECT_CONFIDENCE),
            overlap: detect.overlap.unwrap_or(DEFAULT_DETECT_OVERLAP),
        };

        Ok(Self {
            device_uri,
            device: selector,
            grab_timeout,
            require_color: device.require_color.unwrap_or(false),
            acquisition,
            trigger,
            ffc,
            detect,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(uri) = std::env::var("GALAXY_DEVICE_URI") {
            if !uri.trim().is_empty() {
                self.device_uri = uri;
            }
        }
        if let Ok(selector) = std::env::var("GALAXY_DEVICE") {
            if !selector.trim().is_empty() {
                self.device = parse_selector(&selector)?;
            }
        }
        if let Ok(timeout) = std::env::var("GALAXY_TIMEOUT_MS") {
            let millis: u64 = timeout
                .parse()
                .map_err(|_| anyhow!("GALAXY_TIMEOUT_MS must be an integer number of milliseconds"))?;
            self.grab_timeout = Duration::from_millis(millis);
        }
        if let Ok(path) = std::env::var("GALAXY_FFC_FILE") {
            if !path.trim().is_empty() {
                self.ffc.file = Some(PathBuf::from(path));
            }
        }
        if let Ok(key) = std::env::var("GALAXY_DETECT_API_KEY") {
            if !key.trim().is_empty() {
                self.detect.api_key = Some(key);
            }
        }
        if let Ok(model) = std::env::var("GALAXY_DETECT_MODEL") {
            if !model.trim().is_empty() {
                self.detect.model = model;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.grab_timeout.is_zero() {
            return Err(anyhow!("frame timeout must be greater than zero"));
        }
        if self.trigger.interval.is_zero() {
            return Err(anyhow!("trigger interval must be greater than zero"));
        }
        if self.acquisition.binning == Some(0) {
            return Err(anyhow!("binning must be at least 1"));
        }
        self.ffc.params.validate().context("invalid ffc settings")?;

        self.detect.endpoint = self.detect.endpoint.trim_end_matches('/').to_string();
        self.detect.model = self.detect.model.trim_matches('/').to_string();
        if self.detect.model.is_empty() {
            return Err(anyhow!("detect model must not be empty"));
        }
        if self.detect.input_size == 0 {
            return Err(anyhow!("detect input size must be greater than zero"));
        }
        if self.detect.confidence > 100 || self.detect.overlap > 100 {
            return Err(anyhow!("detect confidence and overlap are percentages (0-100)"));
        }
        Ok(())
    }
}

fn parse_selector(value: &str) -> Result<DeviceSelector> {
    value
        .parse()
        .with_context(|| format!("invalid device selector '{value}'"))
}

fn read_config_file(path: &Path) -> Result<ToolConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
