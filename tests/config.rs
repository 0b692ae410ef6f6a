use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use galaxy_camera::config::ToolConfig;
use galaxy_camera::DeviceSelector;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "GALAXY_CONFIG",
        "GALAXY_DEVICE_URI",
        "GALAXY_DEVICE",
        "GALAXY_TIMEOUT_MS",
        "GALAXY_FFC_FILE",
        "GALAXY_DETECT_API_KEY",
        "GALAXY_DETECT_MODEL",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ToolConfig::load().expect("load defaults");
    assert_eq!(cfg.device_uri, "stub://");
    assert_eq!(cfg.device, DeviceSelector::Index(1));
    assert_eq!(cfg.grab_timeout, Duration::from_millis(1000));
    assert_eq!(cfg.trigger.interval, Duration::from_millis(500));
    assert_eq!(cfg.ffc.params.expected_gray, 127);
    assert_eq!(cfg.ffc.params.frame_count, 1);
    assert!(cfg.ffc.file.is_none());
    assert_eq!(cfg.detect.endpoint, "https://detect.roboflow.com");
    assert_eq!(cfg.detect.model, "simplefruits/1");
    assert!(cfg.detect.api_key.is_none());

    clear_env();
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "device": {
                "uri": "stub://?cameras=2",
                "selector": "sn:SIM-0002",
                "timeout_ms": 2500,
                "require_color": true
            },
            "acquisition": { "exposure_time": 10000.0, "gain": 3.5, "binning": 2 },
            "trigger": { "interval_ms": 250, "max_frames": 10 },
            "ffc": {
                "expected_gray": 100,
                "frame_count": 4,
                "expected_gray_enabled": false,
                "file": "coeffs.ffc",
                "need_dark": true
            },
            "detect": {
                "endpoint": "https://infer.example.test/",
                "model": "/fruit/3/",
                "confidence": 55
            }
        }"#,
    );

    std::env::set_var("GALAXY_CONFIG", file.path());
    std::env::set_var("GALAXY_TIMEOUT_MS", "4000");
    std::env::set_var("GALAXY_DETECT_API_KEY", "key-from-env");

    let cfg = ToolConfig::load().expect("load config");

    assert_eq!(cfg.device_uri, "stub://?cameras=2");
    assert_eq!(cfg.device, DeviceSelector::Serial("SIM-0002".to_string()));
    assert_eq!(cfg.grab_timeout, Duration::from_millis(4000));
    assert!(cfg.require_color);
    assert_eq!(cfg.acquisition.exposure_time, Some(10000.0));
    assert_eq!(cfg.acquisition.gain, Some(3.5));
    assert_eq!(cfg.acquisition.binning, Some(2));
    assert_eq!(cfg.trigger.interval, Duration::from_millis(250));
    assert_eq!(cfg.trigger.max_frames, Some(10));
    assert_eq!(cfg.ffc.params.expected_gray, 100);
    assert_eq!(cfg.ffc.params.frame_count, 4);
    assert!(!cfg.ffc.params.expected_gray_enabled);
    assert_eq!(cfg.ffc.file, Some(PathBuf::from("coeffs.ffc")));
    assert!(cfg.ffc.need_dark);
    assert_eq!(cfg.detect.endpoint, "https://infer.example.test");
    assert_eq!(cfg.detect.model, "fruit/3");
    assert_eq!(cfg.detect.confidence, 55);
    assert_eq!(cfg.detect.overlap, 30);
    assert_eq!(cfg.detect.api_key.as_deref(), Some("key-from-env"));

    let options = cfg.camera_options();
    assert!(options.require_color);
    assert_eq!(options.grab_timeout, Duration::from_millis(4000));

    clear_env();
}

#[test]
fn rejects_bad_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("GALAXY_TIMEOUT_MS", "soon");
    let err = ToolConfig::load().unwrap_err();
    assert!(err.to_string().contains("GALAXY_TIMEOUT_MS"));
    clear_env();

    let file = write_config(r#"{ "ffc": { "frame_count": 3 } }"#);
    std::env::set_var("GALAXY_CONFIG", file.path());
    let err = ToolConfig::load().unwrap_err();
    assert!(format!("{err:#}").contains("invalid ffc settings"));
    clear_env();

    let file = write_config(r#"{ "device": { "timeout_ms": 0 } }"#);
    std::env::set_var("GALAXY_CONFIG", file.path());
    assert!(ToolConfig::load().is_err());
    clear_env();

    let file = write_config(r#"{ "detect": { "overlap": 150 } }"#);
    std::env::set_var("GALAXY_CONFIG", file.path());
    assert!(ToolConfig::load().is_err());
    clear_env();

    std::env::set_var("GALAXY_CONFIG", "/nonexistent/galaxy.json");
    let err = ToolConfig::load().unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    clear_env();
}
