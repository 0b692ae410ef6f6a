//! GigE Vision action commands and PTP-scheduled actions.
//!
//! Cameras are armed to trigger on `Action0`, then a single broadcast
//! command (immediate or at a PTP timestamp) fires every camera whose keys
//! and group mask match.

use std::fmt;
use std::thread;
use std::time::Duration;

use crate::camera::Camera;
use crate::device::{ActionAck, ActionCommand, ActionStatus, DeviceManager};
use crate::error::{CameraError, Result};
use crate::feature::catalog as names;
use crate::feature::FeatureKind;

const OPTION_ACTION: &str = "Action";
const OPTION_SCHEDULED_ACTION: &str = "ScheduledAction";
const OPTION_PTP: &str = "Ptp";

/// Which of the action options a camera reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActionSupport {
    pub action: bool,
    pub scheduled_action: bool,
    pub ptp: bool,
}

impl ActionSupport {
    pub fn is_complete(&self) -> bool {
        self.action && self.scheduled_action && self.ptp
    }
}

/// Read the three action options through `GevSupportedOptionSelector`.
///
/// Options missing from the selector's entries count as unsupported; a
/// camera without the selector supports none of them.
pub fn check_support(camera: &Camera) -> Result<ActionSupport> {
    let selector = camera.feature(names::GEV_SUPPORTED_OPTION_SELECTOR, FeatureKind::Enum);
    let option = camera.feature(names::GEV_SUPPORTED_OPTION, FeatureKind::Bool);
    if !selector.is_available() || !option.is_readable() {
        return Ok(ActionSupport::default());
    }
    let range = selector.range()?;

    let query = |symbolic: &str| -> Result<bool> {
        let listed = range
            .as_ref()
            .map(|r| r.contains_symbolic(symbolic))
            .unwrap_or(false);
        if !listed {
            return Ok(false);
        }
        selector.set(symbolic)?;
        option.get_bool()
    };

    let support = ActionSupport {
        action: query(OPTION_ACTION)?,
        scheduled_action: query(OPTION_SCHEDULED_ACTION)?,
        ptp: query(OPTION_PTP)?,
    };
    log::info!("{}: {:?}", camera.info().serial_number, support);
    Ok(support)
}

/// Device-side keys an action command must match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActionKeys {
    pub device_key: u32,
    pub group_key: u32,
    pub group_mask: u32,
}

impl Default for ActionKeys {
    fn default() -> Self {
        Self {
            device_key: 1,
            group_key: 1,
            group_mask: 0xFFFF_FFFF,
        }
    }
}

impl ActionKeys {
    /// An immediate command addressed to cameras armed with these keys.
    pub fn command(&self, expected_acks: usize) -> ActionCommand {
        ActionCommand {
            device_key: self.device_key,
            group_key: self.group_key,
            group_mask: self.group_mask,
            expected_acks,
            ..ActionCommand::default()
        }
    }
}

/// Restore defaults, trigger on `Action0` with `keys`, and turn the stream
/// on so the camera is waiting for the command.
pub fn arm(camera: &Camera, keys: &ActionKeys) -> Result<()> {
    camera.load_user_set("Default")?;
    camera.feature(names::TRIGGER_MODE, FeatureKind::Enum).set("On")?;
    camera
        .feature(names::TRIGGER_SOURCE, FeatureKind::Enum)
        .set("Action0")?;
    camera
        .feature(names::ACTION_DEVICE_KEY, FeatureKind::Integer)
        .set(keys.device_key)?;
    camera
        .feature(names::ACTION_GROUP_KEY, FeatureKind::Integer)
        .set(keys.group_key)?;
    camera
        .feature(names::ACTION_GROUP_MASK, FeatureKind::Integer)
        .set(keys.group_mask)?;
    camera.stream().stream_on()?;
    log::info!("{}: armed for action commands", camera.info().serial_number);
    Ok(())
}

/// Turn the stream off after `arm`.
pub fn disarm(camera: &Camera) -> Result<()> {
    camera.stream().stream_off()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PtpRole {
    Master,
    Slave,
}

impl fmt::Display for PtpRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PtpRole::Master => f.write_str("Master"),
            PtpRole::Slave => f.write_str("Slave"),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PtpWait {
    /// Extra reads after the first one.
    pub max_polls: u32,
    pub interval: Duration,
}

impl Default for PtpWait {
    fn default() -> Self {
        Self {
            max_polls: 8,
            interval: Duration::from_secs(1),
        }
    }
}

fn read_role(camera: &Camera) -> Result<Option<PtpRole>> {
    let status = camera
        .feature(names::PTP_STATUS, FeatureKind::Enum)
        .get_string()?;
    Ok(match status.as_str() {
        "Master" => Some(PtpRole::Master),
        "Slave" => Some(PtpRole::Slave),
        _ => None,
    })
}

/// Enable PTP and poll `PtpStatus` until the camera is Master or Slave.
///
/// Returns `None` when no role was assigned within `wait`; clock accuracy
/// is not checked.
pub fn wait_for_ptp_role(camera: &Camera, wait: &PtpWait) -> Result<Option<PtpRole>> {
    camera
        .feature(names::PTP_ENABLE, FeatureKind::Bool)
        .set(true)?;
    let mut role = read_role(camera)?;
    let mut polls = 0;
    while role.is_none() && polls < wait.max_polls {
        thread::sleep(wait.interval);
        polls += 1;
        role = read_role(camera)?;
    }
    match role {
        Some(role) => log::info!("{}: PTP role {role}", camera.info().serial_number),
        None => log::warn!("{}: PTP role not assigned in time", camera.info().serial_number),
    }
    Ok(role)
}

/// Latch and read the device timestamp (nanoseconds).
pub fn latch_timestamp(camera: &Camera) -> Result<u64> {
    camera
        .feature(names::TIMESTAMP_LATCH, FeatureKind::Command)
        .send_command()?;
    let value = camera
        .feature(names::TIMESTAMP_LATCH_VALUE, FeatureKind::Integer)
        .get_i64()?;
    u64::try_from(value)
        .map_err(|_| CameraError::invalid_value(names::TIMESTAMP_LATCH_VALUE, "negative timestamp"))
}

/// Broadcast `command` and log every acknowledgement.
pub fn issue(manager: &dyn DeviceManager, command: &ActionCommand) -> Result<Vec<ActionAck>> {
    let acks = manager.issue_action_command(command)?;
    for ack in &acks {
        if ack.status == ActionStatus::Success {
            log::info!("ack from {}: {:?}", ack.device_ip, ack.status);
        } else {
            log::warn!("ack from {}: {:?}", ack.device_ip, ack.status);
        }
    }
    if acks.len() < command.expected_acks {
        log::warn!(
            "{} of {} cameras acknowledged",
            acks.len(),
            command.expected_acks
        );
    }
    Ok(acks)
}

/// Schedule `command` to fire `delay` after `reference`'s current device
/// time.
pub fn issue_scheduled(
    manager: &dyn DeviceManager,
    reference: &Camera,
    command: &ActionCommand,
    delay: Duration,
) -> Result<Vec<ActionAck>> {
    let now = latch_timestamp(reference)?;
    let at = now.saturating_add(delay.as_nanos() as u64);
    let scheduled = ActionCommand {
        action_time: Some(at),
        ..command.clone()
    };
    log::info!("scheduled action at device time {at} ({delay:?} from now)");
    issue(manager, &scheduled)
}
