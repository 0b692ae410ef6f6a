use std::sync::Arc;

use galaxy_camera::device::{SimDeviceManager, SimProbe};
use galaxy_camera::feature::catalog as names;
use galaxy_camera::ffc::FfcState;
use galaxy_camera::{
    Camera, CameraError, CameraOptions, DeviceSelector, FfcParameters, FfcTier,
    FlatFieldCorrection,
};

const COEFFICIENT_BYTES: usize = 64 * 48 * 3;

fn open(uri: &str) -> (Arc<SimDeviceManager>, SimProbe, Camera) {
    let sim = Arc::new(SimDeviceManager::from_uri(uri).expect("stub uri"));
    let probe = sim.probe("SIM-0001").expect("probe");
    let camera = Camera::open(sim.clone(), DeviceSelector::default(), CameraOptions::default())
        .expect("open simulated camera");
    (sim, probe, camera)
}

fn params() -> FfcParameters {
    FfcParameters {
        expected_gray: 127,
        frame_count: 1,
        expected_gray_enabled: true,
        ..FfcParameters::default()
    }
}

fn assert_flat(data: &[u8], target: u8) {
    let (min, max) = data
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    assert!(
        min >= target - 2 && max <= target + 2,
        "corrected image spans {min}..={max}, expected about {target}"
    );
}

#[test]
fn tiers_follow_shading_correction_mode() {
    let cases = [
        ("stub://", FfcTier::SoftwareCalculateSoftwareApply),
        ("stub://?ffc=TailorFlatFieldCorrection", FfcTier::SoftwareCalculateDeviceApply),
        ("stub://?ffc=FlatFieldCorrection", FfcTier::SoftwareCalculateDeviceApplyVariant),
        ("stub://?ffc=DeviceFlatFieldCorrection", FfcTier::DeviceCalculateDeviceApply),
    ];
    for (uri, tier) in cases {
        let (_sim, _probe, camera) = open(uri);
        let ffc = FlatFieldCorrection::new(&camera).unwrap();
        assert_eq!(ffc.tier(), &tier, "{uri}");
        assert_eq!(ffc.state(), FfcState::Unconfigured);
    }
}

#[test]
fn unknown_mode_is_refused() {
    let (_sim, _probe, camera) = open("stub://?ffc=LensShading");
    let err = FlatFieldCorrection::new(&camera).unwrap_err();
    assert!(matches!(err, CameraError::UnknownCapability(ref mode) if mode == "LensShading"));
}

#[test]
fn mode_read_failure_is_not_mistaken_for_software_tier() {
    let (_sim, probe, camera) = open("stub://?ffc=DeviceFlatFieldCorrection");
    probe.fail_read(names::SHADING_CORRECTION_MODE);
    let err = FlatFieldCorrection::new(&camera).unwrap_err();
    assert!(matches!(err, CameraError::Device(_)), "{err}");
}

#[test]
fn device_tier_generates_and_applies_on_camera() {
    let (_sim, probe, camera) = open("stub://?ffc=DeviceFlatFieldCorrection");
    let mut ffc = FlatFieldCorrection::new(&camera).unwrap();

    let params = FfcParameters {
        coefficient_selector: Some("Coefficient1".into()),
        accuracy_selector: Some("PixelLevel".into()),
        ..params()
    };
    ffc.configure(&params).unwrap();
    assert_eq!(ffc.state(), FfcState::Configured);
    assert_eq!(
        probe.value(names::FFC_EXPECTED_GRAY).and_then(|v| v.as_i64()),
        Some(127)
    );
    assert_eq!(
        probe.value(names::FFC_COEFFICIENT).and_then(|v| v.as_str().map(String::from)),
        Some("Coefficient1".to_string())
    );

    ffc.calculate(false).unwrap();
    assert_eq!(ffc.state(), FfcState::Calculated);
    assert_eq!(probe.counters().executed(names::FFC_GENERATE), 1);
    assert!(!probe.is_streaming());

    ffc.enable_correction(true).unwrap();
    assert_eq!(ffc.state(), FfcState::CorrectionEnabled);
    assert_eq!(
        probe.value(names::FLAT_FIELD_CORRECTION).and_then(|v| v.as_str().map(String::from)),
        Some("On".to_string())
    );

    let image = ffc.corrected_image().unwrap();
    assert_eq!(image.data.len(), 64 * 48);
    assert_flat(&image.data, 127);
    assert!(!probe.is_streaming());

    ffc.enable_correction(false).unwrap();
    let raw = ffc.corrected_image().unwrap();
    let (min, max) = raw
        .data
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    assert!(max - min > 40, "vignetting should be visible without correction");
}

#[test]
fn software_tier_applies_with_dark_field() {
    let (_sim, probe, camera) = open("stub://");
    let lens = probe.clone();
    let mut prompted = 0;
    {
        let mut ffc = FlatFieldCorrection::new(&camera).unwrap().with_dark_prompt(|| {
            prompted += 1;
            lens.cover_lens(true);
            Ok::<(), CameraError>(())
        });
        ffc.configure(&params()).unwrap();
        ffc.calculate(true).unwrap();
        assert_eq!(ffc.coefficients().len(), COEFFICIENT_BYTES);
        assert!(probe.counters().flushes >= 1);
        assert!(!probe.is_streaming());

        probe.cover_lens(false);
        ffc.enable_correction(true).unwrap();
        let image = ffc.corrected_image().unwrap();
        assert_flat(&image.data, 127);
    }
    assert_eq!(prompted, 1);
}

#[test]
fn bright_only_tier_ignores_dark_request() {
    let (_sim, probe, camera) = open("stub://?ffc=TailorFlatFieldCorrection");
    let mut ffc = FlatFieldCorrection::new(&camera)
        .unwrap()
        .with_dark_prompt(|| -> galaxy_camera::Result<()> { panic!("no dark field on this tier") });
    ffc.configure(&params()).unwrap();
    ffc.calculate(true).unwrap();
    ffc.enable_correction(true).unwrap();

    let image = ffc.corrected_image().unwrap();
    assert_eq!(probe.active_coefficients().len(), COEFFICIENT_BYTES);
    assert_flat(&image.data, 127);
}

#[test]
fn failed_calculation_leaves_stream_off() {
    // Frame timeout, every tier.
    for uri in [
        "stub://",
        "stub://?ffc=TailorFlatFieldCorrection",
        "stub://?ffc=FlatFieldCorrection",
    ] {
        let (_sim, probe, camera) = open(uri);
        let mut ffc = FlatFieldCorrection::new(&camera).unwrap();
        ffc.configure(&params()).unwrap();
        probe.fail_next_frames(1);
        let err = ffc.calculate(false).unwrap_err();
        assert!(err.is_timeout(), "{uri}: {err}");
        assert!(!probe.is_streaming(), "{uri}");
        assert_eq!(ffc.state(), FfcState::Configured);
    }

    // Dark frame lost after the bright one was captured.
    let (_sim, probe, camera) = open("stub://?ffc=FlatFieldCorrection");
    let lens = probe.clone();
    let mut ffc = FlatFieldCorrection::new(&camera).unwrap().with_dark_prompt(move || {
        lens.fail_next_frames(1);
        Ok::<(), CameraError>(())
    });
    ffc.configure(&params()).unwrap();
    assert!(ffc.calculate(true).is_err());
    assert!(!probe.is_streaming());

    // Engine failure.
    let (sim, probe, camera) = open("stub://");
    let mut ffc = FlatFieldCorrection::new(&camera).unwrap();
    ffc.configure(&params()).unwrap();
    sim.fail_calculation(true);
    let err = ffc.calculate(false).unwrap_err();
    assert!(matches!(err, CameraError::CalculationFailed(_)));
    assert!(!probe.is_streaming());

    // Device rejects FFCGenerate.
    let (_sim, probe, camera) = open("stub://?ffc=DeviceFlatFieldCorrection");
    let mut ffc = FlatFieldCorrection::new(&camera).unwrap();
    ffc.configure(&params()).unwrap();
    probe.fail_command(names::FFC_GENERATE);
    let err = ffc.calculate(false).unwrap_err();
    assert!(matches!(err, CameraError::CalculationFailed(_)));
    assert!(!probe.is_streaming());
}

#[test]
fn device_tier_without_generate_fails_before_streaming() {
    let (_sim, probe, camera) = open("stub://?ffc=DeviceFlatFieldCorrection");
    probe.set_access(names::FFC_GENERATE, false, false);
    let mut ffc = FlatFieldCorrection::new(&camera).unwrap();
    ffc.configure(&params()).unwrap();

    let before = probe.counters().stream_ons;
    let err = ffc.calculate(false).unwrap_err();
    assert!(matches!(err, CameraError::CalculationFailed(_)));
    assert_eq!(probe.counters().stream_ons, before);
}

#[test]
fn software_coefficients_round_trip_through_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("soft.ffc");
    let (_sim, _probe, camera) = open("stub://");

    let mut ffc = FlatFieldCorrection::new(&camera).unwrap();
    assert!(!ffc.save_coefficients(&path).unwrap(), "nothing calculated yet");
    ffc.configure(&params()).unwrap();
    ffc.calculate(false).unwrap();
    assert!(ffc.save_coefficients(&path).unwrap());
    assert_eq!(ffc.state(), FfcState::Persisted);
    assert!(!ffc.save_coefficients("").unwrap(), "no flash on this tier");
    let saved = ffc.coefficients().clone();

    let mut reloaded = FlatFieldCorrection::new(&camera).unwrap();
    assert!(!reloaded.load_coefficients("").unwrap());
    assert!(reloaded.load_coefficients(&path).unwrap());
    assert_eq!(reloaded.state(), FfcState::Calculated);
    assert_eq!(reloaded.coefficients(), &saved);

    reloaded.enable_correction(true).unwrap();
    assert_flat(&reloaded.corrected_image().unwrap().data, 127);
}

#[test]
fn device_coefficients_round_trip_through_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tailor.ffc");

    let (_sim, probe, camera) = open("stub://?ffc=TailorFlatFieldCorrection");
    let mut ffc = FlatFieldCorrection::new(&camera).unwrap();
    ffc.configure(&params()).unwrap();
    ffc.calculate(false).unwrap();
    assert!(ffc.save_coefficients(&path).unwrap());
    let on_device = probe.active_coefficients();
    assert_eq!(on_device.len(), COEFFICIENT_BYTES);
    assert_eq!(std::fs::read(&path).unwrap(), on_device);

    let (_sim, other_probe, other) = open("stub://?ffc=TailorFlatFieldCorrection");
    let mut loaded = FlatFieldCorrection::new(&other).unwrap();
    assert!(loaded.load_coefficients(&path).unwrap());
    assert_eq!(other_probe.active_coefficients(), on_device);
}

#[test]
fn device_coefficients_round_trip_through_flash() {
    let (_sim, probe, camera) = open("stub://?ffc=DeviceFlatFieldCorrection");
    let mut ffc = FlatFieldCorrection::new(&camera).unwrap();
    ffc.configure(&params()).unwrap();
    ffc.calculate(false).unwrap();

    assert!(ffc.save_coefficients("").unwrap());
    assert_eq!(probe.counters().executed(names::FFC_FLASH_SAVE), 1);
    let flash = probe.flash_coefficients();
    assert_eq!(flash.len(), COEFFICIENT_BYTES);

    let mut reloaded = FlatFieldCorrection::new(&camera).unwrap();
    assert!(reloaded.load_coefficients("").unwrap());
    assert_eq!(probe.counters().executed(names::FFC_FLASH_LOAD), 1);
    assert_eq!(reloaded.coefficients().as_bytes(), flash.as_slice());
}

#[test]
fn bright_only_tier_round_trips_through_flash() {
    let (_sim, probe, camera) = open("stub://?ffc=TailorFlatFieldCorrection");
    let mut ffc = FlatFieldCorrection::new(&camera).unwrap();
    ffc.configure(&params()).unwrap();
    ffc.calculate(false).unwrap();

    assert!(ffc.save_coefficients("").unwrap());
    assert_eq!(ffc.state(), FfcState::Persisted);
    assert_eq!(probe.counters().executed(names::FFC_FLASH_SAVE), 1);
    let flash = probe.flash_coefficients();
    assert_eq!(flash.len(), COEFFICIENT_BYTES);
    assert_eq!(flash, ffc.coefficients().as_bytes());

    let mut reloaded = FlatFieldCorrection::new(&camera).unwrap();
    assert!(reloaded.load_coefficients("").unwrap());
    assert_eq!(reloaded.state(), FfcState::Calculated);
    assert_eq!(reloaded.coefficients().as_bytes(), flash.as_slice());
}

#[test]
fn empty_flash_loads_nothing() {
    for uri in [
        "stub://?ffc=TailorFlatFieldCorrection",
        "stub://?ffc=DeviceFlatFieldCorrection",
    ] {
        let (_sim, probe, camera) = open(uri);
        let mut ffc = FlatFieldCorrection::new(&camera).unwrap();
        assert!(!ffc.load_coefficients("").unwrap(), "{uri}");
        assert_eq!(ffc.state(), FfcState::Unconfigured, "{uri}");
        assert!(ffc.coefficients().is_empty(), "{uri}");
        assert_eq!(probe.counters().executed(names::FFC_FLASH_LOAD), 1, "{uri}");
    }

    // Coefficients cannot be read back: the load command is not issued.
    let (_sim, probe, camera) = open("stub://?ffc=DeviceFlatFieldCorrection");
    probe.set_access(names::FFC_VALUE_ALL, false, true);
    let mut ffc = FlatFieldCorrection::new(&camera).unwrap();
    assert!(!ffc.load_coefficients("").unwrap());
    assert_eq!(probe.counters().executed(names::FFC_FLASH_LOAD), 0);
}

#[test]
fn device_expected_gray_is_written_even_when_disabled() {
    let (_sim, probe, camera) = open("stub://?ffc=DeviceFlatFieldCorrection");
    let mut ffc = FlatFieldCorrection::new(&camera).unwrap();
    ffc.configure(&FfcParameters {
        expected_gray: 90,
        expected_gray_enabled: false,
        ..params()
    })
    .unwrap();
    assert_eq!(
        probe.value(names::FFC_EXPECTED_GRAY).and_then(|v| v.as_i64()),
        Some(90)
    );
    assert_eq!(
        probe
            .value(names::FFC_EXPECTED_GRAY_VALUE_ENABLE)
            .and_then(|v| v.as_str().map(String::from)),
        Some("Off".to_string())
    );
}

#[test]
fn configure_rejects_invalid_parameters() {
    let (_sim, _probe, camera) = open("stub://?ffc=DeviceFlatFieldCorrection");
    let mut ffc = FlatFieldCorrection::new(&camera).unwrap();
    let err = ffc
        .configure(&FfcParameters {
            frame_count: 3,
            ..params()
        })
        .unwrap_err();
    assert!(matches!(err, CameraError::InvalidValue { .. }));
    assert_eq!(ffc.state(), FfcState::Unconfigured);
}

#[test]
fn parameters_can_be_read_back_from_the_device() {
    let (_sim, _probe, camera) = open("stub://?ffc=DeviceFlatFieldCorrection");
    let params = FfcParameters::from_device(&camera).unwrap();
    assert_eq!(params.coefficient_selector.as_deref(), Some("Coefficient0"));
    assert_eq!(params.accuracy_selector.as_deref(), Some("PixelLevel"));
    assert_eq!(params.block_size, Some(32));

    let (_sim, _probe, camera) = open("stub://");
    let params = FfcParameters::from_device(&camera).unwrap();
    assert_eq!(params, FfcParameters::default());
}
