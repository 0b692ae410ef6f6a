//! Simulated Galaxy SDK for `stub://` device URIs.
//!
//! Every camera renders a deterministic vignetted gray scene (bright in the
//! centre, darker towards the corners), so flat-field correction has
//! something to correct. Covering the lens switches the scene to a dark
//! field. A `SimProbe` gives tests access to the device state behind the
//! node map: stream state, node values, access modes, command log, and
//! failure injection.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use url::Url;

use crate::device::{
    ActionAck, ActionCommand, ActionStatus, DataStream, Device, DeviceInfo, DeviceManager,
    FeatureControl, FlatFieldEngine, FlatFieldInput, FrameStatus, ImageProcessor,
    ImprovementConfig, RawImage, TransportLayer,
};
use crate::error::{CameraError, Result};
use crate::feature::catalog as names;
use crate::feature::{EnumEntry, EnumSelection, FeatureKind, FeatureRange, FeatureValue, WriteValue};
use crate::frame::{ChannelOrder, Frame};
use crate::pixel::{BayerPattern, PixelFormat, ValidBits};

const VENDOR: &str = "Daheng Imaging";
const DEFAULT_MODEL: &str = "MER2-SIM";
const DEFAULT_WIDTH: u32 = 64;
const DEFAULT_HEIGHT: u32 = 48;
const SIGNAL_LEVEL: f64 = 200.0;
const VIGNETTE: f64 = 0.4;
const DARK_LEVEL: u8 = 6;
const DEFAULT_PTP_SETTLE_POLLS: u32 = 3;
const MAX_FFC_FRAME_COUNT: u32 = 16;

// ----------------------------------------------------------------------------
// Camera description (builder)
// ----------------------------------------------------------------------------

/// Description of one simulated camera.
#[derive(Clone, Debug)]
pub struct SimCamera {
    serial: String,
    model: String,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    ffc_mode: Option<String>,
    gige_ip: Option<String>,
    ptp_settle_polls: u32,
}

impl SimCamera {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            model: DEFAULT_MODEL.to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            pixel_format: PixelFormat::Mono8,
            ffc_mode: None,
            gige_ip: None,
            ptp_settle_polls: DEFAULT_PTP_SETTLE_POLLS,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width.max(1);
        self.height = height.max(1);
        self
    }

    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = format;
        self
    }

    /// Expose `ShadingCorrectionMode` with this symbolic and the FFC node
    /// set that goes with it.
    pub fn with_ffc_mode(mut self, mode: impl Into<String>) -> Self {
        self.ffc_mode = Some(mode.into());
        self
    }

    /// Attach over GigE Vision: action commands, scheduled actions and PTP.
    pub fn with_gige(mut self, ip: impl Into<String>) -> Self {
        self.gige_ip = Some(ip.into());
        self
    }

    /// Number of `PtpStatus` reads before a role is assigned.
    pub fn with_ptp_settle_polls(mut self, polls: u32) -> Self {
        self.ptp_settle_polls = polls;
        self
    }

    fn transport(&self) -> TransportLayer {
        if self.gige_ip.is_some() {
            TransportLayer::Gev
        } else {
            TransportLayer::U3v
        }
    }

    fn coefficient_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

// ----------------------------------------------------------------------------
// Node map
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct Node {
    kind: FeatureKind,
    value: Option<FeatureValue>,
    range: Option<FeatureRange>,
    readable: bool,
    writable: bool,
    max_len: usize,
}

impl Node {
    fn base(kind: FeatureKind, value: Option<FeatureValue>, range: Option<FeatureRange>) -> Self {
        Self {
            kind,
            value,
            range,
            readable: true,
            writable: true,
            max_len: 0,
        }
    }

    fn integer(value: i64, min: i64, max: i64) -> Self {
        Self::base(
            FeatureKind::Integer,
            Some(FeatureValue::Integer(value)),
            Some(FeatureRange::Integer { min, max, inc: 1 }),
        )
    }

    fn float(value: f64, min: f64, max: f64, unit: &str) -> Self {
        Self::base(
            FeatureKind::Float,
            Some(FeatureValue::Float(value)),
            Some(FeatureRange::Float {
                min,
                max,
                inc: None,
                unit: unit.to_string(),
            }),
        )
    }

    fn enumeration(current: &str, entries: &[(i64, &str)]) -> Self {
        let entries: Vec<EnumEntry> = entries
            .iter()
            .map(|(value, symbolic)| EnumEntry::new(*value, *symbolic))
            .collect();
        let value = entries
            .iter()
            .find(|e| e.symbolic == current)
            .cloned()
            .map(FeatureValue::Enum);
        Self::base(FeatureKind::Enum, value, Some(FeatureRange::Enum(entries)))
    }

    fn text(value: &str, max_len: usize) -> Self {
        let mut node = Self::base(
            FeatureKind::String,
            Some(FeatureValue::String(value.to_string())),
            None,
        );
        node.max_len = max_len;
        node
    }

    fn boolean(value: bool) -> Self {
        Self::base(FeatureKind::Bool, Some(FeatureValue::Bool(value)), None)
    }

    fn command() -> Self {
        let mut node = Self::base(FeatureKind::Command, None, None);
        node.readable = false;
        node
    }

    fn buffer() -> Self {
        Self::base(FeatureKind::Buffer, Some(FeatureValue::Buffer(Vec::new())), None)
    }

    fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    fn symbolic(&self) -> Option<&str> {
        match &self.value {
            Some(FeatureValue::Enum(entry)) => Some(&entry.symbolic),
            _ => None,
        }
    }

    /// Validate `value` against the node's kind and range.
    fn accept(&self, name: &str, value: WriteValue) -> Result<FeatureValue> {
        match (self.kind, value) {
            (FeatureKind::Integer, WriteValue::Integer(v)) => {
                if let Some(FeatureRange::Integer { min, max, inc }) = &self.range {
                    if v < *min || v > *max || (*inc > 1 && (v - min) % inc != 0) {
                        return Err(CameraError::invalid_value(
                            name,
                            format!("{v} outside {min}..={max} step {inc}"),
                        ));
                    }
                }
                Ok(FeatureValue::Integer(v))
            }
            (FeatureKind::Float, WriteValue::Float(v)) => {
                if let Some(FeatureRange::Float { min, max, .. }) = &self.range {
                    if !(v >= *min && v <= *max) {
                        return Err(CameraError::invalid_value(
                            name,
                            format!("{v} outside {min}..={max}"),
                        ));
                    }
                }
                Ok(FeatureValue::Float(v))
            }
            (FeatureKind::String, WriteValue::String(s)) => {
                if self.max_len > 0 && s.len() > self.max_len {
                    return Err(CameraError::invalid_value(
                        name,
                        format!("longer than {} bytes", self.max_len),
                    ));
                }
                Ok(FeatureValue::String(s))
            }
            (FeatureKind::Bool, WriteValue::Bool(v)) => Ok(FeatureValue::Bool(v)),
            (FeatureKind::Enum, WriteValue::Enum(selection)) => {
                let entries = self.range.as_ref().map(|r| r.entries()).unwrap_or(&[]);
                let entry = match &selection {
                    EnumSelection::Symbolic(s) => entries.iter().find(|e| &e.symbolic == s),
                    EnumSelection::Value(v) => entries.iter().find(|e| e.value == *v),
                };
                entry.cloned().map(FeatureValue::Enum).ok_or_else(|| {
                    CameraError::invalid_value(name, format!("no entry {selection:?}"))
                })
            }
            (FeatureKind::Buffer, WriteValue::Buffer(data)) => Ok(FeatureValue::Buffer(data)),
            (kind, value) => Err(CameraError::invalid_value(
                name,
                format!("{value:?} does not fit a {kind} node"),
            )),
        }
    }
}

fn build_nodes(config: &SimCamera) -> BTreeMap<String, Node> {
    let mut nodes = BTreeMap::new();
    let mut add = |name: &str, node: Node| {
        nodes.insert(name.to_string(), node);
    };

    add(names::DEVICE_VENDOR_NAME, Node::text(VENDOR, 64).read_only());
    add(names::DEVICE_MODEL_NAME, Node::text(&config.model, 64).read_only());
    add(names::DEVICE_SERIAL_NUMBER, Node::text(&config.serial, 64).read_only());
    add(names::DEVICE_USER_ID, Node::text("", 16));
    add(
        names::WIDTH,
        Node::integer(config.width as i64, 1, config.width as i64).read_only(),
    );
    add(
        names::HEIGHT,
        Node::integer(config.height as i64, 1, config.height as i64).read_only(),
    );
    let format = config.pixel_format.symbolic();
    add(
        names::PIXEL_FORMAT,
        Node::enumeration(&format, &[(0, format.as_str())]).read_only(),
    );
    let filter = match config.pixel_format.bayer_pattern() {
        Some(BayerPattern::Rg) => "BayerRG",
        Some(BayerPattern::Gr) => "BayerGR",
        Some(BayerPattern::Gb) => "BayerGB",
        Some(BayerPattern::Bg) => "BayerBG",
        None => "None",
    };
    add(
        names::PIXEL_COLOR_FILTER,
        Node::enumeration(filter, &[(0, filter)]).read_only(),
    );

    add(names::BINNING_HORIZONTAL, Node::integer(1, 1, 4));
    add(names::BINNING_VERTICAL, Node::integer(1, 1, 4));
    add(names::GAIN, Node::float(0.0, 0.0, 24.0, "dB"));
    add(
        names::GAIN_AUTO,
        Node::enumeration("Off", &[(0, "Off"), (1, "Continuous"), (2, "Once")]),
    );
    add(
        names::EXPOSURE_TIME,
        Node::float(10_000.0, 20.0, 1_000_000.0, "us"),
    );
    add(names::GAMMA_PARAM, Node::float(1.0, 0.1, 10.0, ""));
    add(names::CONTRAST_PARAM, Node::integer(0, -50, 100));
    add(
        names::USER_SET_SELECTOR,
        Node::enumeration("Default", &[(0, "Default"), (1, "UserSet0"), (2, "UserSet1")]),
    );
    add(names::USER_SET_LOAD, Node::command());
    add(
        names::TRIGGER_MODE,
        Node::enumeration("Off", &[(0, "Off"), (1, "On")]),
    );
    let mut sources: Vec<(i64, &str)> = vec![(0, "Software"), (1, "Line0"), (2, "Line2"), (3, "Line3")];
    if config.gige_ip.is_some() {
        sources.push((4, "Action0"));
    }
    add(names::TRIGGER_SOURCE, Node::enumeration("Software", &sources));
    add(names::TRIGGER_SOFTWARE, Node::command());
    add(names::ACQUISITION_START, Node::command());
    add(names::ACQUISITION_STOP, Node::command());

    if config.gige_ip.is_some() {
        add(
            names::GEV_SUPPORTED_OPTION_SELECTOR,
            Node::enumeration(
                "Action",
                &[(0, "Action"), (1, "ScheduledAction"), (2, "Ptp")],
            ),
        );
        add(names::GEV_SUPPORTED_OPTION, Node::boolean(true).read_only());
        add(names::ACTION_DEVICE_KEY, Node::integer(0, 0, u32::MAX as i64));
        add(names::ACTION_GROUP_KEY, Node::integer(0, 0, u32::MAX as i64));
        add(names::ACTION_GROUP_MASK, Node::integer(0, 0, u32::MAX as i64));
        add(names::PTP_ENABLE, Node::boolean(false));
        add(
            names::PTP_STATUS,
            Node::enumeration(
                "Disabled",
                &[
                    (0, "Initializing"),
                    (1, "Listening"),
                    (2, "Master"),
                    (3, "Slave"),
                    (4, "Disabled"),
                ],
            )
            .read_only(),
        );
        add(names::TIMESTAMP_LATCH, Node::command());
        add(
            names::TIMESTAMP_LATCH_VALUE,
            Node::integer(0, 0, i64::MAX).read_only(),
        );
    }

    if let Some(mode) = &config.ffc_mode {
        add(
            names::SHADING_CORRECTION_MODE,
            Node::enumeration(mode, &[(0, mode.as_str())]).read_only(),
        );
        let device_apply = matches!(
            mode.as_str(),
            "TailorFlatFieldCorrection" | "FlatFieldCorrection" | "DeviceFlatFieldCorrection"
        );
        if device_apply {
            add(
                names::FFC_BLOCK_SIZE,
                Node::enumeration(
                    "FFCBlockSize_32",
                    &[
                        (16, "FFCBlockSize_16"),
                        (32, "FFCBlockSize_32"),
                        (64, "FFCBlockSize_64"),
                        (128, "FFCBlockSize_128"),
                    ],
                ),
            );
            add(names::FFC_EXPECTED_GRAY, Node::integer(0, 0, 255));
            add(
                names::FFC_EXPECTED_GRAY_VALUE_ENABLE,
                Node::enumeration("Off", &[(0, "Off"), (1, "On")]),
            );
            add(
                names::FFC_FRAME_COUNT,
                Node::enumeration(
                    "FFCFrameCount_1",
                    &[
                        (1, "FFCFrameCount_1"),
                        (2, "FFCFrameCount_2"),
                        (4, "FFCFrameCount_4"),
                        (8, "FFCFrameCount_8"),
                        (16, "FFCFrameCount_16"),
                    ],
                ),
            );
            add(
                names::FLAT_FIELD_CORRECTION,
                Node::enumeration("Off", &[(0, "Off"), (1, "On")]),
            );
            add(names::FFC_VALUE_ALL, Node::buffer());
            add(
                names::FFC_COEFFICIENTS_SIZE,
                Node::integer(0, 0, i64::MAX).read_only(),
            );
            add(names::FFC_FLASH_SAVE, Node::command());
            add(names::FFC_FLASH_LOAD, Node::command());
        }
        if mode.as_str() == "DeviceFlatFieldCorrection" {
            add(
                names::FFC_COEFFICIENT,
                Node::enumeration(
                    "Coefficient0",
                    &[
                        (0, "Coefficient0"),
                        (1, "Coefficient1"),
                        (2, "Coefficient2"),
                        (3, "Coefficient3"),
                    ],
                ),
            );
            add(
                names::FFC_ACCURACY,
                Node::enumeration("PixelLevel", &[(0, "PixelLevel"), (1, "BlockLevel")]),
            );
            add(names::FFC_GENERATE, Node::command());
        }
    }

    nodes
}

// ----------------------------------------------------------------------------
// Shared device state
// ----------------------------------------------------------------------------

/// Lifetime counters of one simulated camera.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimCounters {
    pub opens: u32,
    pub stream_ons: u32,
    pub stream_offs: u32,
    pub frames_delivered: u64,
    pub flushes: u32,
    /// Executed commands, in order.
    pub commands: Vec<String>,
}

impl SimCounters {
    pub fn executed(&self, command: &str) -> usize {
        self.commands.iter().filter(|c| c.as_str() == command).count()
    }
}

struct SimState {
    nodes: BTreeMap<String, Node>,
    defaults: BTreeMap<String, Node>,
    open: bool,
    streaming: bool,
    acquiring: bool,
    /// Release ticks of pending triggers.
    triggers: Vec<u64>,
    frame_id: u64,
    fail_frames: u32,
    failing_commands: HashSet<String>,
    failing_reads: HashSet<String>,
    lens_covered: bool,
    active_coefficients: Vec<u8>,
    flash_coefficients: Vec<u8>,
    ptp_polls: u32,
    counters: SimCounters,
}

impl SimState {
    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(CameraError::NotOpen)
        }
    }

    fn node(&self, name: &str) -> Result<&Node> {
        self.nodes
            .get(name)
            .ok_or_else(|| CameraError::Device(format!("node {name} does not exist")))
    }

    fn symbolic(&self, name: &str) -> Option<&str> {
        self.nodes.get(name).and_then(Node::symbolic)
    }

    fn integer(&self, name: &str) -> Option<i64> {
        match self.nodes.get(name).and_then(|n| n.value.as_ref()) {
            Some(FeatureValue::Integer(v)) => Some(*v),
            Some(FeatureValue::Enum(entry)) => Some(entry.value),
            _ => None,
        }
    }

    fn flag(&self, name: &str) -> bool {
        matches!(
            self.nodes.get(name).and_then(|n| n.value.as_ref()),
            Some(FeatureValue::Bool(true))
        )
    }

    fn set_symbolic(&mut self, name: &str, symbolic: &str) {
        if let Some(node) = self.nodes.get_mut(name) {
            let entry = node
                .range
                .as_ref()
                .and_then(|r| r.entries().iter().find(|e| e.symbolic == symbolic).cloned());
            if let Some(entry) = entry {
                node.value = Some(FeatureValue::Enum(entry));
            }
        }
    }

    fn triggered_mode(&self) -> bool {
        self.symbolic(names::TRIGGER_MODE) == Some("On")
    }

    fn device_correction_on(&self) -> bool {
        self.symbolic(names::FLAT_FIELD_CORRECTION) == Some("On")
    }

    fn restore_defaults(&mut self) {
        for (name, default) in &self.defaults {
            if name == names::USER_SET_SELECTOR
                || !default.writable
                || matches!(default.kind, FeatureKind::Command | FeatureKind::Buffer)
            {
                continue;
            }
            if let Some(node) = self.nodes.get_mut(name) {
                node.value = default.value.clone();
            }
        }
    }
}

struct SimShared {
    info: DeviceInfo,
    config: SimCamera,
    clock: Instant,
    state: Mutex<SimState>,
    wake: Condvar,
}

impl SimShared {
    fn new(index: u32, config: SimCamera, clock: Instant) -> Self {
        let info = DeviceInfo {
            index,
            vendor_name: VENDOR.to_string(),
            model_name: config.model.clone(),
            serial_number: config.serial.clone(),
            transport: config.transport(),
            ip_address: config.gige_ip.clone(),
        };
        let nodes = build_nodes(&config);
        let state = SimState {
            defaults: nodes.clone(),
            nodes,
            open: false,
            streaming: false,
            acquiring: false,
            triggers: Vec::new(),
            frame_id: 0,
            fail_frames: 0,
            failing_commands: HashSet::new(),
            failing_reads: HashSet::new(),
            lens_covered: false,
            active_coefficients: Vec::new(),
            flash_coefficients: Vec::new(),
            ptp_polls: 0,
            counters: SimCounters::default(),
        };
        Self {
            info,
            config,
            clock,
            state: Mutex::new(state),
            wake: Condvar::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, SimState>> {
        self.state
            .lock()
            .map_err(|_| CameraError::Device("simulated device state poisoned".to_string()))
    }

    fn ticks(&self) -> u64 {
        self.clock.elapsed().as_nanos() as u64
    }

    fn pixel_count(&self) -> usize {
        self.config.width as usize * self.config.height as usize
    }

    /// Scene luminance as 8-bit samples, before any device correction.
    fn scene(&self, lens_covered: bool) -> Vec<u8> {
        let (w, h) = (self.config.width, self.config.height);
        let cx = (w as f64 - 1.0) / 2.0;
        let cy = (h as f64 - 1.0) / 2.0;
        let mut samples = Vec::with_capacity(self.pixel_count());
        for y in 0..h {
            for x in 0..w {
                let dark = DARK_LEVEL + ((x * 7 + y * 13) % 5) as u8;
                if lens_covered {
                    samples.push(dark);
                    continue;
                }
                let dx = if cx > 0.0 { (x as f64 - cx) / cx } else { 0.0 };
                let dy = if cy > 0.0 { (y as f64 - cy) / cy } else { 0.0 };
                let r2 = (dx * dx + dy * dy) / 2.0;
                let level = dark as f64 + SIGNAL_LEVEL * (1.0 - VIGNETTE * r2);
                samples.push(level.round().clamp(0.0, 255.0) as u8);
            }
        }
        samples
    }

    fn render(&self, state: &mut SimState) -> Result<RawImage> {
        let format = self.config.pixel_format;
        let mut samples = self.scene(state.lens_covered);
        if state.device_correction_on()
            && state.active_coefficients.len() == self.config.coefficient_size()
        {
            apply_coefficients(&mut samples, &state.active_coefficients);
        }

        let data = match format {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => {
                samples.iter().flat_map(|&s| [s, s, s]).collect()
            }
            _ => match format.bytes_per_sample() {
                Some(1) => samples,
                Some(_) => {
                    let shift = format.bit_depth() - 8;
                    samples
                        .iter()
                        .flat_map(|&s| ((s as u16) << shift).to_le_bytes())
                        .collect()
                }
                None => return Err(CameraError::UnsupportedPixelFormat(format)),
            },
        };

        state.frame_id += 1;
        state.counters.frames_delivered += 1;
        Ok(RawImage {
            frame_id: state.frame_id,
            status: FrameStatus::Complete,
            width: self.config.width,
            height: self.config.height,
            pixel_format: format,
            timestamp: self.ticks(),
            data,
        })
    }

    fn read_dynamic(&self, state: &mut SimState, name: &str) -> Option<FeatureValue> {
        match name {
            names::FFC_VALUE_ALL => Some(FeatureValue::Buffer(state.active_coefficients.clone())),
            names::FFC_COEFFICIENTS_SIZE => {
                let size = if state.active_coefficients.is_empty() {
                    self.config.coefficient_size()
                } else {
                    state.active_coefficients.len()
                };
                Some(FeatureValue::Integer(size as i64))
            }
            names::GEV_SUPPORTED_OPTION => {
                let supported = matches!(
                    state.symbolic(names::GEV_SUPPORTED_OPTION_SELECTOR),
                    Some("Action" | "ScheduledAction" | "Ptp")
                );
                Some(FeatureValue::Bool(supported))
            }
            names::PTP_STATUS => {
                let status = if !state.flag(names::PTP_ENABLE) {
                    "Disabled"
                } else {
                    state.ptp_polls += 1;
                    if state.ptp_polls == 1 {
                        "Initializing"
                    } else if state.ptp_polls < self.config.ptp_settle_polls {
                        "Listening"
                    } else if self.info.index == 1 {
                        "Master"
                    } else {
                        "Slave"
                    }
                };
                state.set_symbolic(names::PTP_STATUS, status);
                state.node(names::PTP_STATUS).ok().and_then(|n| n.value.clone())
            }
            _ => None,
        }
    }

    fn execute(&self, state: &mut SimState, name: &str) -> Result<()> {
        match name {
            names::ACQUISITION_START => state.acquiring = true,
            names::ACQUISITION_STOP => state.acquiring = false,
            names::TRIGGER_SOFTWARE => {
                if state.streaming
                    && state.triggered_mode()
                    && state.symbolic(names::TRIGGER_SOURCE) == Some("Software")
                {
                    state.triggers.push(self.ticks());
                    self.wake.notify_all();
                } else {
                    log::debug!("{}: software trigger ignored", self.info.serial_number);
                }
            }
            names::USER_SET_LOAD => {
                if state.symbolic(names::USER_SET_SELECTOR) == Some("Default") {
                    state.restore_defaults();
                }
            }
            names::FFC_GENERATE => {
                if !state.streaming {
                    return Err(CameraError::Device(
                        "FFCGenerate requires an active stream".to_string(),
                    ));
                }
                let bright = self.scene(state.lens_covered);
                let block = if state.symbolic(names::FFC_ACCURACY) == Some("BlockLevel") {
                    state.integer(names::FFC_BLOCK_SIZE).map(|b| b as u32)
                } else {
                    None
                };
                let target = if state.symbolic(names::FFC_EXPECTED_GRAY_VALUE_ENABLE) == Some("On") {
                    state.integer(names::FFC_EXPECTED_GRAY).map(|g| g as u32)
                } else {
                    None
                };
                state.active_coefficients = compute_coefficients(
                    &bright,
                    None,
                    self.config.width,
                    self.config.height,
                    block,
                    target,
                );
            }
            names::FFC_FLASH_SAVE => state.flash_coefficients = state.active_coefficients.clone(),
            names::FFC_FLASH_LOAD => state.active_coefficients = state.flash_coefficients.clone(),
            names::TIMESTAMP_LATCH => {
                let now = self.ticks() as i64;
                if let Some(node) = state.nodes.get_mut(names::TIMESTAMP_LATCH_VALUE) {
                    node.value = Some(FeatureValue::Integer(now));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Whether an action command addresses this camera.
    fn armed_for(&self, state: &SimState, command: &ActionCommand) -> bool {
        state.open
            && state.streaming
            && state.triggered_mode()
            && state.symbolic(names::TRIGGER_SOURCE) == Some("Action0")
            && state.integer(names::ACTION_DEVICE_KEY) == Some(command.device_key as i64)
            && state.integer(names::ACTION_GROUP_KEY) == Some(command.group_key as i64)
            && state
                .integer(names::ACTION_GROUP_MASK)
                .map(|mask| mask as u32 & command.group_mask != 0)
                .unwrap_or(false)
    }
}

// ----------------------------------------------------------------------------
// Open device
// ----------------------------------------------------------------------------

/// An opened simulated camera. Implements the node map and data stream
/// directly.
pub struct SimDevice {
    shared: Arc<SimShared>,
}

impl FeatureControl for SimDevice {
    fn is_implemented(&self, name: &str) -> bool {
        self.shared
            .lock()
            .map(|s| s.nodes.contains_key(name))
            .unwrap_or(false)
    }

    fn is_readable(&self, name: &str) -> bool {
        self.shared
            .lock()
            .map(|s| s.nodes.get(name).map(|n| n.readable).unwrap_or(false))
            .unwrap_or(false)
    }

    fn is_writable(&self, name: &str) -> bool {
        self.shared
            .lock()
            .map(|s| s.nodes.get(name).map(|n| n.writable).unwrap_or(false))
            .unwrap_or(false)
    }

    fn kind_of(&self, name: &str) -> Option<FeatureKind> {
        self.shared
            .lock()
            .ok()
            .and_then(|s| s.nodes.get(name).map(|n| n.kind))
    }

    fn read(&self, name: &str) -> Result<FeatureValue> {
        let mut state = self.shared.lock()?;
        state.ensure_open()?;
        if !state.node(name)?.readable {
            return Err(CameraError::NotReadable(name.to_string()));
        }
        if state.failing_reads.contains(name) {
            return Err(CameraError::Device(format!("{name}: read failed")));
        }
        if let Some(value) = self.shared.read_dynamic(&mut state, name) {
            return Ok(value);
        }
        state
            .node(name)?
            .value
            .clone()
            .ok_or_else(|| CameraError::NotReadable(name.to_string()))
    }

    fn write(&self, name: &str, value: WriteValue) -> Result<()> {
        let mut state = self.shared.lock()?;
        state.ensure_open()?;
        let node = state.node(name)?;
        if !node.writable {
            return Err(CameraError::NotWritable(name.to_string()));
        }
        let accepted = node.accept(name, value)?;

        if name == names::FFC_VALUE_ALL {
            let FeatureValue::Buffer(data) = accepted else {
                return Err(CameraError::invalid_value(name, "expected a buffer"));
            };
            let expected = self.shared.config.coefficient_size();
            if data.len() != expected {
                return Err(CameraError::invalid_value(
                    name,
                    format!("{} bytes, device expects {expected}", data.len()),
                ));
            }
            state.active_coefficients = data;
            return Ok(());
        }

        if let Some(node) = state.nodes.get_mut(name) {
            node.value = Some(accepted);
        }
        if name == names::PTP_ENABLE {
            state.ptp_polls = 0;
        }
        Ok(())
    }

    fn range(&self, name: &str) -> Result<Option<FeatureRange>> {
        let state = self.shared.lock()?;
        state.ensure_open()?;
        Ok(state.node(name)?.range.clone())
    }

    fn execute(&self, name: &str) -> Result<()> {
        let mut state = self.shared.lock()?;
        state.ensure_open()?;
        let node = state.node(name)?;
        if node.kind != FeatureKind::Command {
            return Err(CameraError::InvalidKind {
                name: name.to_string(),
                expected: FeatureKind::Command,
                actual: node.kind,
            });
        }
        if !node.writable {
            return Err(CameraError::NotWritable(name.to_string()));
        }
        if state.failing_commands.contains(name) {
            return Err(CameraError::Device(format!("{name} rejected by device")));
        }
        state.counters.commands.push(name.to_string());
        self.shared.execute(&mut state, name)
    }

    fn string_max_length(&self, name: &str) -> Result<usize> {
        let state = self.shared.lock()?;
        state.ensure_open()?;
        Ok(state.node(name)?.max_len)
    }

    fn buffer_length(&self, name: &str) -> Result<usize> {
        let state = self.shared.lock()?;
        state.ensure_open()?;
        state.node(name)?;
        if name == names::FFC_VALUE_ALL {
            Ok(state.active_coefficients.len())
        } else {
            Ok(0)
        }
    }
}

impl DataStream for SimDevice {
    fn stream_on(&self) -> Result<()> {
        let mut state = self.shared.lock()?;
        state.ensure_open()?;
        state.streaming = true;
        state.triggers.clear();
        state.counters.stream_ons += 1;
        Ok(())
    }

    fn stream_off(&self) -> Result<()> {
        let mut state = self.shared.lock()?;
        state.ensure_open()?;
        state.streaming = false;
        state.acquiring = false;
        state.triggers.clear();
        state.counters.stream_offs += 1;
        self.shared.wake.notify_all();
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.shared.lock().map(|s| s.streaming).unwrap_or(false)
    }

    fn get_image(&self, timeout: Duration) -> Result<RawImage> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock()?;
        loop {
            state.ensure_open()?;
            if !state.streaming {
                return Err(CameraError::Device("stream is off".to_string()));
            }
            if state.fail_frames > 0 {
                state.fail_frames -= 1;
                return Err(CameraError::AcquisitionTimeout(timeout));
            }
            if !state.triggered_mode() {
                break;
            }
            let now_tick = self.shared.ticks();
            if let Some(pos) = state.triggers.iter().position(|&t| t <= now_tick) {
                state.triggers.remove(pos);
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(CameraError::AcquisitionTimeout(timeout));
            }
            let mut wait = deadline - now;
            if let Some(next) = state.triggers.iter().min() {
                wait = wait.min(Duration::from_nanos(next.saturating_sub(now_tick)));
            }
            state = self
                .shared
                .wake
                .wait_timeout(state, wait)
                .map_err(|_| CameraError::Device("simulated device state poisoned".to_string()))?
                .0;
        }
        self.shared.render(&mut state)
    }

    fn flush_queue(&self) -> Result<usize> {
        let mut state = self.shared.lock()?;
        state.ensure_open()?;
        state.counters.flushes += 1;
        let now_tick = self.shared.ticks();
        let before = state.triggers.len();
        state.triggers.retain(|&t| t > now_tick);
        Ok(before - state.triggers.len())
    }
}

impl Device for SimDevice {
    fn info(&self) -> &DeviceInfo {
        &self.shared.info
    }

    fn features(&self) -> &dyn FeatureControl {
        self
    }

    fn stream(&self) -> &dyn DataStream {
        self
    }

    fn close(&self) -> Result<()> {
        let mut state = self.shared.lock()?;
        state.ensure_open()?;
        state.open = false;
        state.streaming = false;
        state.acquiring = false;
        state.triggers.clear();
        self.shared.wake.notify_all();
        log::debug!("{}: closed", self.shared.info.serial_number);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Test probe
// ----------------------------------------------------------------------------

/// Back door into a simulated camera's state.
#[derive(Clone)]
pub struct SimProbe {
    shared: Arc<SimShared>,
}

impl SimProbe {
    fn with<T>(&self, f: impl FnOnce(&mut SimState) -> T) -> T {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut *state)
    }

    pub fn is_open(&self) -> bool {
        self.with(|s| s.open)
    }

    pub fn is_streaming(&self) -> bool {
        self.with(|s| s.streaming)
    }

    pub fn is_acquiring(&self) -> bool {
        self.with(|s| s.acquiring)
    }

    /// Stored value of a node, bypassing access modes.
    pub fn value(&self, name: &str) -> Option<FeatureValue> {
        self.with(|s| s.nodes.get(name).and_then(|n| n.value.clone()))
    }

    pub fn set_access(&self, name: &str, readable: bool, writable: bool) {
        self.with(|s| {
            if let Some(node) = s.nodes.get_mut(name) {
                node.readable = readable;
                node.writable = writable;
            }
        })
    }

    /// The next `count` frame requests time out.
    pub fn fail_next_frames(&self, count: u32) {
        self.with(|s| s.fail_frames = count)
    }

    pub fn fail_command(&self, name: &str) {
        self.with(|s| {
            s.failing_commands.insert(name.to_string());
        })
    }

    /// Reads of `name` fail with a device error while the node stays
    /// readable.
    pub fn fail_read(&self, name: &str) {
        self.with(|s| {
            s.failing_reads.insert(name.to_string());
        })
    }

    pub fn cover_lens(&self, covered: bool) {
        self.with(|s| s.lens_covered = covered)
    }

    pub fn counters(&self) -> SimCounters {
        self.with(|s| s.counters.clone())
    }

    pub fn active_coefficients(&self) -> Vec<u8> {
        self.with(|s| s.active_coefficients.clone())
    }

    pub fn flash_coefficients(&self) -> Vec<u8> {
        self.with(|s| s.flash_coefficients.clone())
    }
}

// ----------------------------------------------------------------------------
// Device manager
// ----------------------------------------------------------------------------

/// In-process device manager over a fixed set of simulated cameras.
pub struct SimDeviceManager {
    devices: Vec<Arc<SimShared>>,
    processor: Arc<SimImageProcessor>,
    engine: Arc<SimFlatField>,
}

impl SimDeviceManager {
    pub fn new(cameras: Vec<SimCamera>) -> Self {
        let clock = Instant::now();
        let devices = cameras
            .into_iter()
            .enumerate()
            .map(|(i, config)| Arc::new(SimShared::new(i as u32 + 1, config, clock)))
            .collect();
        Self {
            devices,
            processor: Arc::new(SimImageProcessor),
            engine: Arc::new(SimFlatField::default()),
        }
    }

    /// Build from a `stub://` URI.
    ///
    /// Query parameters: `cameras=N`, `ffc=<ShadingCorrectionMode>`,
    /// `format=<PixelFormat>`, `width=`, `height=`, `gige=1`.
    /// `stub://` alone is one Mono8 camera without flat-field nodes.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let url = Url::parse(uri)
            .map_err(|e| CameraError::invalid_value("device uri", e.to_string()))?;
        if url.scheme() != "stub" {
            return Err(CameraError::invalid_value("device uri", "expected stub://"));
        }

        let mut count = 1u32;
        let mut template = SimCamera::new("");
        let mut gige = false;
        for (key, value) in url.query_pairs() {
            let bad = |what: &str| CameraError::invalid_value("device uri", format!("{what}: '{value}'"));
            match &*key {
                "cameras" => count = value.parse().map_err(|_| bad("cameras"))?,
                "ffc" => {
                    if value != "none" {
                        template = template.with_ffc_mode(&*value);
                    }
                }
                "format" => {
                    let format = PixelFormat::from_symbolic(&value).ok_or_else(|| bad("format"))?;
                    template = template.with_pixel_format(format);
                }
                "width" => {
                    let width = value.parse().map_err(|_| bad("width"))?;
                    let height = template.height;
                    template = template.with_size(width, height);
                }
                "height" => {
                    let height = value.parse().map_err(|_| bad("height"))?;
                    let width = template.width;
                    template = template.with_size(width, height);
                }
                "gige" => gige = matches!(&*value, "1" | "true" | "on"),
                other => {
                    return Err(CameraError::invalid_value(
                        "device uri",
                        format!("unknown parameter '{other}'"),
                    ))
                }
            }
        }

        let cameras = (1..=count)
            .map(|i| {
                let mut camera = template.clone();
                camera.serial = format!("SIM-{i:04}");
                if gige {
                    camera = camera.with_gige(format!("192.168.42.{}", 10 + i));
                }
                camera
            })
            .collect();
        Ok(Self::new(cameras))
    }

    pub fn probe(&self, serial: &str) -> Option<SimProbe> {
        self.devices
            .iter()
            .find(|d| d.info.serial_number == serial)
            .map(|shared| SimProbe {
                shared: shared.clone(),
            })
    }

    /// Make the software flat-field engine fail its next calculations.
    pub fn fail_calculation(&self, fail: bool) {
        self.engine.fail.store(fail, Ordering::SeqCst);
    }

    fn open(&self, shared: &Arc<SimShared>) -> Result<Box<dyn Device>> {
        let mut state = shared.lock()?;
        state.open = true;
        state.counters.opens += 1;
        log::debug!("{}: opened", shared.info.serial_number);
        Ok(Box::new(SimDevice {
            shared: shared.clone(),
        }))
    }
}

impl DeviceManager for SimDeviceManager {
    fn update_device_list(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.devices.iter().map(|d| d.info.clone()).collect())
    }

    fn open_by_index(&self, index: u32) -> Result<Box<dyn Device>> {
        let shared = index
            .checked_sub(1)
            .and_then(|i| self.devices.get(i as usize))
            .ok_or_else(|| CameraError::DeviceNotFound(format!("index {index}")))?;
        self.open(shared)
    }

    fn open_by_serial(&self, serial: &str) -> Result<Box<dyn Device>> {
        let shared = self
            .devices
            .iter()
            .find(|d| d.info.serial_number == serial)
            .ok_or_else(|| CameraError::DeviceNotFound(format!("serial {serial}")))?;
        self.open(shared)
    }

    fn image_processor(&self) -> Arc<dyn ImageProcessor> {
        self.processor.clone()
    }

    fn flat_field(&self) -> Arc<dyn FlatFieldEngine> {
        self.engine.clone()
    }

    fn issue_action_command(&self, command: &ActionCommand) -> Result<Vec<ActionAck>> {
        let mut acks = Vec::new();
        for device in &self.devices {
            if device.info.transport != TransportLayer::Gev {
                continue;
            }
            let mut state = device.lock()?;
            if !device.armed_for(&state, command) {
                continue;
            }
            let now = device.ticks();
            let status = match command.action_time {
                Some(_) if !state.flag(names::PTP_ENABLE) => ActionStatus::NoRefTime,
                Some(at) if at < now => ActionStatus::Late,
                Some(at) => {
                    state.triggers.push(at);
                    ActionStatus::Success
                }
                None => {
                    state.triggers.push(now);
                    ActionStatus::Success
                }
            };
            device.wake.notify_all();
            acks.push(ActionAck {
                device_ip: device.info.ip_address.clone().unwrap_or_default(),
                status,
            });
        }
        if command.expected_acks > 0 && acks.len() < command.expected_acks {
            log::warn!(
                "action command: {} of {} expected acknowledgements",
                acks.len(),
                command.expected_acks
            );
        }
        Ok(acks)
    }
}

// ----------------------------------------------------------------------------
// Flat-field engine
// ----------------------------------------------------------------------------

/// Software flat-field engine.
///
/// Coefficients hold three bytes per pixel: the dark offset, then the gain
/// as little-endian Q8.8.
#[derive(Debug, Default)]
pub struct SimFlatField {
    fail: AtomicBool,
}

fn check_mono8(format: PixelFormat) -> Result<()> {
    if format.bit_depth() == 8 && format.channels() == 1 {
        Ok(())
    } else {
        Err(CameraError::UnsupportedPixelFormat(format))
    }
}

impl FlatFieldEngine for SimFlatField {
    fn coefficients_size(&self, input: &FlatFieldInput<'_>) -> Result<usize> {
        check_mono8(input.pixel_format)?;
        Ok(input.width as usize * input.height as usize * 3)
    }

    fn calculate(&self, input: &FlatFieldInput<'_>, coefficients: &mut [u8]) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CameraError::CalculationFailed("engine rejected input".to_string()));
        }
        let size = self.coefficients_size(input)?;
        let pixels = input.width as usize * input.height as usize;
        if input.bright.len() != pixels {
            return Err(CameraError::CalculationFailed(format!(
                "bright field has {} bytes, expected {pixels}",
                input.bright.len()
            )));
        }
        if let Some(dark) = input.dark {
            if dark.len() != pixels {
                return Err(CameraError::CalculationFailed(format!(
                    "dark field has {} bytes, expected {pixels}",
                    dark.len()
                )));
            }
        }
        if input.frame_count == 0 || input.frame_count > MAX_FFC_FRAME_COUNT {
            return Err(CameraError::CalculationFailed(format!(
                "frame count {} outside 1..={MAX_FFC_FRAME_COUNT}",
                input.frame_count
            )));
        }
        if coefficients.len() != size {
            return Err(CameraError::CalculationFailed(format!(
                "coefficient buffer has {} bytes, expected {size}",
                coefficients.len()
            )));
        }
        let computed = compute_coefficients(
            input.bright,
            input.dark,
            input.width,
            input.height,
            input.block_size,
            input.expected_gray,
        );
        coefficients.copy_from_slice(&computed);
        Ok(())
    }

    fn apply(&self, image: &mut RawImage, coefficients: &[u8]) -> Result<()> {
        check_mono8(image.pixel_format)?;
        if coefficients.len() != image.data.len() * 3 {
            return Err(CameraError::invalid_value(
                "coefficients",
                format!(
                    "{} bytes do not match a {}x{} image",
                    coefficients.len(),
                    image.width,
                    image.height
                ),
            ));
        }
        apply_coefficients(&mut image.data, coefficients);
        Ok(())
    }
}

fn compute_coefficients(
    bright: &[u8],
    dark: Option<&[u8]>,
    width: u32,
    height: u32,
    block: Option<u32>,
    target: Option<u32>,
) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let dark_at = |i: usize| dark.map(|d| d[i]).unwrap_or(0);
    let signal: Vec<f64> = (0..w * h)
        .map(|i| (bright[i] as f64 - dark_at(i) as f64).max(0.0))
        .collect();
    let target = match target {
        Some(t) => t as f64,
        None if signal.is_empty() => 0.0,
        None => signal.iter().sum::<f64>() / signal.len() as f64,
    };
    let block = block.unwrap_or(1).max(1) as usize;

    let mut out = vec![0u8; w * h * 3];
    for by in (0..h).step_by(block) {
        for bx in (0..w).step_by(block) {
            let ys = by..(by + block).min(h);
            let xs = bx..(bx + block).min(w);
            let mut sum = 0.0;
            let mut n = 0.0;
            for y in ys.clone() {
                for x in xs.clone() {
                    sum += signal[y * w + x];
                    n += 1.0;
                }
            }
            let mean = sum / n;
            let gain = if mean < 1.0 { 1.0 } else { target / mean };
            let q = (gain * 256.0).round().clamp(0.0, u16::MAX as f64) as u16;
            for y in ys.clone() {
                for x in xs.clone() {
                    let i = y * w + x;
                    out[i * 3] = dark_at(i);
                    out[i * 3 + 1..i * 3 + 3].copy_from_slice(&q.to_le_bytes());
                }
            }
        }
    }
    out
}

fn apply_coefficients(samples: &mut [u8], coefficients: &[u8]) {
    for (sample, c) in samples.iter_mut().zip(coefficients.chunks_exact(3)) {
        let gain = u16::from_le_bytes([c[1], c[2]]) as u32;
        let signal = sample.saturating_sub(c[0]) as u32;
        *sample = ((signal * gain + 128) / 256).min(255) as u8;
    }
}

// ----------------------------------------------------------------------------
// Image processor
// ----------------------------------------------------------------------------

/// Format converter and image improvement.
#[derive(Debug, Default)]
pub struct SimImageProcessor;

fn samples_8bit(raw: &RawImage, valid_bits: ValidBits) -> Result<Vec<u8>> {
    let format = raw.pixel_format;
    let pixels = raw.width as usize * raw.height as usize;
    let samples: Vec<u8> = match format.bytes_per_sample() {
        Some(1) => raw.data.clone(),
        Some(2) => raw
            .data
            .chunks_exact(2)
            .map(|b| (u16::from_le_bytes([b[0], b[1]]) >> valid_bits.shift()).min(255) as u8)
            .collect(),
        _ => return Err(CameraError::UnsupportedPixelFormat(format)),
    };
    if samples.len() != pixels {
        return Err(CameraError::Device(format!(
            "{format} frame {}x{} carries {} samples",
            raw.width,
            raw.height,
            samples.len()
        )));
    }
    Ok(samples)
}

/// Nearest-neighbour demosaic over 2x2 cells.
fn demosaic(samples: &[u8], width: u32, height: u32, pattern: BayerPattern) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let mut rgb = Vec::with_capacity(w * h * 3);
    for y in 0..h {
        for x in 0..w {
            let (x0, y0) = (x & !1, y & !1);
            if x0 + 1 >= w || y0 + 1 >= h {
                let s = samples[y * w + x];
                rgb.extend_from_slice(&[s, s, s]);
                continue;
            }
            let tl = samples[y0 * w + x0] as u16;
            let tr = samples[y0 * w + x0 + 1] as u16;
            let bl = samples[(y0 + 1) * w + x0] as u16;
            let br = samples[(y0 + 1) * w + x0 + 1] as u16;
            let (r, g, b) = match pattern {
                BayerPattern::Rg => (tl, (tr + bl) / 2, br),
                BayerPattern::Gr => (tr, (tl + br) / 2, bl),
                BayerPattern::Gb => (bl, (tl + br) / 2, tr),
                BayerPattern::Bg => (br, (tr + bl) / 2, tl),
            };
            rgb.extend_from_slice(&[r as u8, g as u8, b as u8]);
        }
    }
    rgb
}

impl ImageProcessor for SimImageProcessor {
    fn convert(&self, raw: &RawImage, valid_bits: ValidBits) -> Result<Frame> {
        let format = raw.pixel_format;
        match format {
            PixelFormat::Rgb8 => Frame::new(raw.width, raw.height, ChannelOrder::Rgb, raw.data.clone()),
            PixelFormat::Bgr8 => Ok(Frame::new(raw.width, raw.height, ChannelOrder::Bgr, raw.data.clone())?
                .into_rgb()),
            _ => {
                let samples = samples_8bit(raw, valid_bits)?;
                let rgb = match format.bayer_pattern() {
                    Some(pattern) => demosaic(&samples, raw.width, raw.height, pattern),
                    None => samples.iter().flat_map(|&s| [s, s, s]).collect(),
                };
                Frame::new(raw.width, raw.height, ChannelOrder::Rgb, rgb)
            }
        }
    }

    fn improve(&self, frame: &mut Frame, config: &ImprovementConfig) -> Result<()> {
        if !(config.gamma > 0.0) {
            return Err(CameraError::invalid_value(
                "GammaParam",
                format!("{} is not positive", config.gamma),
            ));
        }
        let contrast = 1.0 + config.contrast as f64 / 100.0;
        let lut: Vec<u8> = (0..=255u32)
            .map(|v| {
                let g = 255.0 * (v as f64 / 255.0).powf(1.0 / config.gamma);
                ((g - 128.0) * contrast + 128.0).round().clamp(0.0, 255.0) as u8
            })
            .collect();
        for byte in frame.data_mut() {
            *byte = lut[*byte as usize];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(camera: SimCamera) -> SimDeviceManager {
        SimDeviceManager::new(vec![camera])
    }

    #[test]
    fn uri_parameters_shape_the_cameras() {
        let manager =
            SimDeviceManager::from_uri("stub://lab?cameras=2&ffc=FlatFieldCorrection&gige=1")
                .unwrap();
        let list = manager.update_device_list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].serial_number, "SIM-0002");
        assert_eq!(list[0].transport, TransportLayer::Gev);
        assert!(SimDeviceManager::from_uri("stub://?bogus=1").is_err());
        assert!(SimDeviceManager::from_uri("stub://?format=YUV").is_err());
    }

    #[test]
    fn uri_query_is_decoded_and_fragment_ignored() {
        let manager = SimDeviceManager::from_uri(
            "stub://lab?cameras=2&ffc=Device%46latFieldCorrection&width=32&height=16#front",
        )
        .unwrap();
        assert_eq!(manager.update_device_list().unwrap().len(), 2);
        let probe = manager.probe("SIM-0002").unwrap();
        assert_eq!(
            probe.value(names::SHADING_CORRECTION_MODE).and_then(|v| v.as_str().map(String::from)),
            Some("DeviceFlatFieldCorrection".to_string())
        );
        assert_eq!(probe.value(names::WIDTH).and_then(|v| v.as_i64()), Some(32));
        assert_eq!(probe.value(names::HEIGHT).and_then(|v| v.as_i64()), Some(16));
        assert!(SimDeviceManager::from_uri("rtsp://cam/stream").is_err());
    }

    #[test]
    fn continuous_stream_delivers_frames() {
        let manager = manager(SimCamera::new("A"));
        let device = manager.open_by_index(1).unwrap();
        assert!(device.stream().get_image(Duration::from_millis(10)).is_err());
        device.stream().stream_on().unwrap();
        let image = device.stream().get_image(Duration::from_millis(10)).unwrap();
        assert_eq!(image.data.len(), (DEFAULT_WIDTH * DEFAULT_HEIGHT) as usize);
        let centre = image.data[(24 * DEFAULT_WIDTH + 32) as usize];
        let corner = image.data[0];
        assert!(centre > corner, "vignetting: centre {centre} corner {corner}");
    }

    #[test]
    fn triggered_stream_waits_for_a_trigger() {
        let manager = manager(SimCamera::new("A"));
        let device = manager.open_by_index(1).unwrap();
        let features = device.features();
        features
            .write(names::TRIGGER_MODE, WriteValue::Enum(EnumSelection::Symbolic("On".into())))
            .unwrap();
        device.stream().stream_on().unwrap();
        let err = device.stream().get_image(Duration::from_millis(20)).unwrap_err();
        assert!(err.is_timeout());
        features.execute(names::TRIGGER_SOFTWARE).unwrap();
        assert!(device.stream().get_image(Duration::from_millis(20)).is_ok());
    }

    #[test]
    fn user_set_default_restores_settings() {
        let manager = manager(SimCamera::new("A"));
        let device = manager.open_by_index(1).unwrap();
        let features = device.features();
        features.write(names::GAIN, WriteValue::Float(12.0)).unwrap();
        features.execute(names::USER_SET_LOAD).unwrap();
        assert_eq!(features.read(names::GAIN).unwrap(), FeatureValue::Float(0.0));
    }

    #[test]
    fn per_pixel_coefficients_flatten_the_scene() {
        let manager = manager(SimCamera::new("A"));
        let shared = &manager.devices[0];
        let bright = shared.scene(false);
        let coefficients = compute_coefficients(&bright, None, DEFAULT_WIDTH, DEFAULT_HEIGHT, None, Some(127));
        let mut corrected = bright.clone();
        apply_coefficients(&mut corrected, &coefficients);
        assert!(corrected.iter().all(|&v| (126..=128).contains(&v)));
    }

    #[test]
    fn improvement_with_unit_gamma_is_identity() {
        let processor = SimImageProcessor;
        let mut frame = Frame::new(1, 1, ChannelOrder::Rgb, vec![0, 100, 255]).unwrap();
        processor
            .improve(&mut frame, &ImprovementConfig::default())
            .unwrap();
        assert_eq!(frame.data(), &[0, 100, 255]);
    }

    #[test]
    fn deep_mono_converts_with_valid_bits() {
        let processor = SimImageProcessor;
        let raw = RawImage {
            frame_id: 1,
            status: FrameStatus::Complete,
            width: 1,
            height: 1,
            pixel_format: PixelFormat::Mono12,
            timestamp: 0,
            data: (200u16 << 4).to_le_bytes().to_vec(),
        };
        let frame = processor
            .convert(&raw, PixelFormat::Mono12.best_valid_bits())
            .unwrap();
        assert_eq!(frame.data(), &[200, 200, 200]);
    }
}
