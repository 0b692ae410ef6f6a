use std::sync::Arc;
use std::thread;
use std::time::Duration;

use galaxy_camera::device::SimDeviceManager;
use galaxy_camera::feature::catalog as names;
use galaxy_camera::trigger::{LoopEnd, TriggerSettings};
use galaxy_camera::{
    run_software_trigger_loop, Camera, CameraOptions, CancelToken, ChannelOrder, DeviceSelector,
};

fn open() -> (Arc<SimDeviceManager>, Camera) {
    let sim = Arc::new(SimDeviceManager::from_uri("stub://").unwrap());
    let camera = Camera::open(sim.clone(), DeviceSelector::default(), CameraOptions::default())
        .unwrap();
    (sim, camera)
}

fn fast() -> TriggerSettings {
    TriggerSettings {
        interval: Duration::from_millis(20),
        grab_timeout: Duration::from_millis(1000),
        max_frames: None,
    }
}

#[test]
fn stops_after_frame_limit() {
    let (sim, camera) = open();
    let probe = sim.probe("SIM-0001").unwrap();
    let settings = TriggerSettings {
        max_frames: Some(3),
        ..fast()
    };

    let mut seen = Vec::new();
    let stats = run_software_trigger_loop(&camera, &CancelToken::new(), &settings, |frame| {
        seen.push((frame.width, frame.height, frame.order));
        true
    })
    .unwrap();

    assert!(matches!(stats.end, LoopEnd::Finished));
    assert_eq!(stats.frames, 3);
    assert!(stats.triggers >= 3);
    assert_eq!(seen, vec![(64, 48, ChannelOrder::Bgr); 3]);
    assert!(!probe.is_streaming());
    assert_eq!(
        probe.value(names::TRIGGER_SOURCE).and_then(|v| v.as_str().map(String::from)),
        Some("Software".to_string())
    );
}

#[test]
fn callback_can_end_the_loop() {
    let (_sim, camera) = open();
    let stats = run_software_trigger_loop(&camera, &CancelToken::new(), &fast(), |_| false).unwrap();
    assert!(matches!(stats.end, LoopEnd::Finished));
    assert_eq!(stats.frames, 1);
}

#[test]
fn cancellation_from_another_thread() {
    let (sim, camera) = open();
    let probe = sim.probe("SIM-0001").unwrap();
    let cancel = CancelToken::new();
    let remote = cancel.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        remote.cancel();
    });

    let stats = run_software_trigger_loop(&camera, &cancel, &fast(), |_| true).unwrap();
    canceller.join().unwrap();

    assert!(matches!(stats.end, LoopEnd::Cancelled));
    assert!(stats.frames >= 1);
    assert!(!stats.is_failure());
    assert!(!probe.is_streaming());
}

#[test]
fn frame_failure_ends_the_loop() {
    let (sim, camera) = open();
    let probe = sim.probe("SIM-0001").unwrap();
    probe.fail_next_frames(1);

    let stats = run_software_trigger_loop(&camera, &CancelToken::new(), &fast(), |_| true).unwrap();

    assert!(stats.is_failure());
    match stats.end {
        LoopEnd::Failed(err) => assert!(err.is_timeout()),
        other => panic!("unexpected end {other:?}"),
    }
    assert_eq!(stats.frames, 0);
    assert!(!probe.is_streaming());
}
