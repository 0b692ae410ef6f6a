use std::sync::Arc;
use std::time::Duration;

use galaxy_camera::action::{self, ActionKeys, ActionSupport, PtpRole, PtpWait};
use galaxy_camera::device::{ActionCommand, ActionStatus, SimDeviceManager, TransportLayer};
use galaxy_camera::{Camera, CameraOptions, DeviceManager, DeviceSelector};

const QUICK_PTP: PtpWait = PtpWait {
    max_polls: 8,
    interval: Duration::from_millis(1),
};

fn open_all(uri: &str) -> (Arc<SimDeviceManager>, Vec<Camera>) {
    let sim = Arc::new(SimDeviceManager::from_uri(uri).unwrap());
    let cameras = sim
        .update_device_list_ex(TransportLayer::Gev)
        .unwrap()
        .into_iter()
        .map(|info| {
            Camera::open(
                sim.clone(),
                DeviceSelector::Serial(info.serial_number),
                CameraOptions::default(),
            )
            .unwrap()
        })
        .collect();
    (sim, cameras)
}

#[test]
fn gige_cameras_report_full_support() {
    let (_sim, cameras) = open_all("stub://?cameras=2&gige=1");
    assert_eq!(cameras.len(), 2);
    for camera in &cameras {
        assert!(action::check_support(camera).unwrap().is_complete());
    }

    let (sim, _) = open_all("stub://");
    let usb = Camera::open(sim, DeviceSelector::default(), CameraOptions::default()).unwrap();
    assert_eq!(action::check_support(&usb).unwrap(), ActionSupport::default());
}

#[test]
fn immediate_command_fires_every_armed_camera() {
    let (sim, cameras) = open_all("stub://?cameras=2&gige=1");
    let keys = ActionKeys::default();
    for camera in &cameras {
        action::arm(camera, &keys).unwrap();
    }

    // Wrong device key: nobody answers, nothing fires.
    let stray = ActionKeys {
        device_key: 7,
        ..keys
    };
    assert!(action::issue(&*sim, &stray.command(2)).unwrap().is_empty());

    let acks = action::issue(&*sim, &keys.command(2)).unwrap();
    assert_eq!(acks.len(), 2);
    assert!(acks.iter().all(|ack| ack.status == ActionStatus::Success));
    for camera in &cameras {
        let image = camera.grab_raw(Duration::from_millis(1000)).unwrap();
        assert!(image.is_complete());
    }
    for camera in &cameras {
        assert!(camera.grab_raw(Duration::from_millis(20)).unwrap_err().is_timeout());
        action::disarm(camera).unwrap();
        assert!(!camera.stream().is_streaming());
    }
}

#[test]
fn ptp_assigns_one_master() {
    let (_sim, cameras) = open_all("stub://?cameras=2&gige=1");
    let roles: Vec<_> = cameras
        .iter()
        .map(|camera| action::wait_for_ptp_role(camera, &QUICK_PTP).unwrap())
        .collect();
    assert_eq!(roles, vec![Some(PtpRole::Master), Some(PtpRole::Slave)]);

    let impatient = PtpWait {
        max_polls: 0,
        interval: Duration::from_millis(1),
    };
    assert_eq!(action::wait_for_ptp_role(&cameras[0], &impatient).unwrap(), None);
}

#[test]
fn scheduled_command_fires_at_device_time() {
    let (sim, cameras) = open_all("stub://?cameras=2&gige=1");
    let keys = ActionKeys::default();
    for camera in &cameras {
        action::arm(camera, &keys).unwrap();
    }

    // Without PTP there is no reference time.
    let acks = action::issue_scheduled(
        &*sim,
        &cameras[0],
        &keys.command(2),
        Duration::from_millis(50),
    )
    .unwrap();
    assert!(acks.iter().all(|ack| ack.status == ActionStatus::NoRefTime));

    for camera in &cameras {
        assert!(action::wait_for_ptp_role(camera, &QUICK_PTP).unwrap().is_some());
    }

    let late = ActionCommand {
        action_time: Some(0),
        ..keys.command(2)
    };
    let acks = action::issue(&*sim, &late).unwrap();
    assert!(acks.iter().all(|ack| ack.status == ActionStatus::Late));

    let delay = Duration::from_millis(50);
    let latched = action::latch_timestamp(&cameras[0]).unwrap();
    let acks = action::issue_scheduled(&*sim, &cameras[0], &keys.command(2), delay).unwrap();
    assert_eq!(acks.len(), 2);
    assert!(acks.iter().all(|ack| ack.status == ActionStatus::Success));

    let fire_at = latched + delay.as_nanos() as u64;
    for camera in &cameras {
        let image = camera.grab_raw(delay + Duration::from_secs(1)).unwrap();
        assert!(image.timestamp >= fire_at);
    }
}

#[test]
fn timestamps_advance() {
    let (_sim, cameras) = open_all("stub://?cameras=1&gige=1");
    let first = action::latch_timestamp(&cameras[0]).unwrap();
    std::thread::sleep(Duration::from_millis(2));
    let second = action::latch_timestamp(&cameras[0]).unwrap();
    assert!(second > first);
}
