use std::sync::Arc;

use galaxy_camera::device::{SimCamera, SimDeviceManager};
use galaxy_camera::feature::catalog as names;
use galaxy_camera::feature::SetValue;
use galaxy_camera::{Camera, CameraError, CameraOptions, DeviceSelector, FeatureKind};

fn open_full_camera() -> (Arc<SimDeviceManager>, Camera) {
    let sim = Arc::new(SimDeviceManager::new(vec![SimCamera::new("F")
        .with_gige("192.168.42.20")
        .with_ffc_mode("FlatFieldCorrection")]));
    let camera = Camera::open(sim.clone(), DeviceSelector::default(), CameraOptions::default())
        .expect("open simulated camera");
    (sim, camera)
}

/// One writable control per valued kind, with a value that differs from
/// its default.
fn valued_controls() -> Vec<(&'static str, FeatureKind, SetValue)> {
    vec![
        (names::BINNING_HORIZONTAL, FeatureKind::Integer, SetValue::Integer(2)),
        (names::GAIN, FeatureKind::Float, SetValue::Float(12.0)),
        (names::DEVICE_USER_ID, FeatureKind::String, SetValue::Text("left".into())),
        (names::PTP_ENABLE, FeatureKind::Bool, SetValue::Bool(true)),
        (names::GAIN_AUTO, FeatureKind::Enum, SetValue::Text("Continuous".into())),
        (names::FFC_VALUE_ALL, FeatureKind::Buffer, SetValue::Bytes(vec![1; 64 * 48 * 3])),
    ]
}

#[test]
fn every_valued_kind_round_trips_when_writable() {
    let (_sim, camera) = open_full_camera();
    for (name, kind, value) in valued_controls() {
        let feature = camera.feature(name, kind);
        assert!(feature.is_available(), "{name}");
        feature.set(value.clone()).unwrap_or_else(|e| panic!("{name}: {e}"));
        let read = feature.get().unwrap();
        assert_eq!(read.kind(), kind, "{name}");
    }
    assert_eq!(camera.feature(names::GAIN, FeatureKind::Float).get_f64().unwrap(), 12.0);
    assert_eq!(
        camera
            .feature(names::GAIN_AUTO, FeatureKind::Enum)
            .get_string()
            .unwrap(),
        "Continuous"
    );
    assert_eq!(
        camera
            .feature(names::DEVICE_USER_ID, FeatureKind::String)
            .get_string()
            .unwrap(),
        "left"
    );
}

#[test]
fn set_on_read_only_control_leaves_value_untouched() {
    let (sim, camera) = open_full_camera();
    let probe = sim.probe("F").unwrap();

    for (name, kind, value) in valued_controls() {
        probe.set_access(name, true, false);
        let before = probe.value(name);

        let feature = camera.feature(name, kind);
        assert!(!feature.is_writable(), "{name}");
        let err = feature.set(value).unwrap_err();
        assert!(
            matches!(err, CameraError::NotWritable(ref n) if n == name),
            "{name}: {err}"
        );
        assert_eq!(probe.value(name), before, "{name} changed");
    }

    let err = camera
        .feature(names::FFC_VALUE_ALL, FeatureKind::Buffer)
        .set_buffer(&[0; 16])
        .unwrap_err();
    assert!(matches!(err, CameraError::NotWritable(_)));
}

#[test]
fn unavailable_controls_report_errors_instead_of_panicking() {
    let sim = Arc::new(SimDeviceManager::new(vec![SimCamera::new("U")]));
    let camera = Camera::open(sim, DeviceSelector::default(), CameraOptions::default()).unwrap();

    let missing = camera.feature(names::FFC_GENERATE, FeatureKind::Command);
    assert!(!missing.is_available());
    assert!(!missing.is_readable());
    assert!(!missing.is_writable());
    assert!(matches!(
        missing.send_command().unwrap_err(),
        CameraError::FeatureUnavailable { .. }
    ));

    let missing = camera.feature(names::FFC_EXPECTED_GRAY, FeatureKind::Integer);
    for result in [
        missing.get().map(|_| ()),
        missing.set(127).map(|_| ()),
        missing.range().map(|_| ()),
    ] {
        assert!(matches!(
            result.unwrap_err(),
            CameraError::FeatureUnavailable { .. }
        ));
    }
    assert!(missing.clone().require().is_err());

    // Declared with the wrong kind: treated as absent.
    let mistyped = camera.feature(names::GAIN, FeatureKind::Integer);
    assert!(!mistyped.is_available());
    assert!(mistyped.get().is_err());
}

#[test]
fn kind_mismatched_operations_are_rejected() {
    let (_sim, camera) = open_full_camera();

    let gain = camera.feature(names::GAIN, FeatureKind::Float);
    assert!(matches!(
        gain.send_command().unwrap_err(),
        CameraError::InvalidKind { .. }
    ));
    assert!(matches!(gain.get_i64().unwrap_err(), CameraError::InvalidKind { .. }));

    let trigger = camera.feature(names::TRIGGER_SOFTWARE, FeatureKind::Command);
    assert!(matches!(trigger.get().unwrap_err(), CameraError::InvalidKind { .. }));
    assert!(matches!(trigger.set(1).unwrap_err(), CameraError::InvalidKind { .. }));
}

#[test]
fn out_of_range_writes_are_refused() {
    let (_sim, camera) = open_full_camera();

    let gain = camera.feature(names::GAIN, FeatureKind::Float);
    assert!(matches!(gain.set(99.0).unwrap_err(), CameraError::InvalidValue { .. }));
    assert_eq!(gain.get_f64().unwrap(), 0.0);

    let auto = camera.feature(names::GAIN_AUTO, FeatureKind::Enum);
    assert!(auto.set("Sometimes").is_err());
    assert_eq!(auto.get_string().unwrap(), "Off");

    let range = camera
        .feature(names::BINNING_HORIZONTAL, FeatureKind::Integer)
        .range()
        .unwrap()
        .unwrap();
    assert_eq!(range.bounds().map(|(min, max, _)| (min, max)), Some((1.0, 4.0)));
}
