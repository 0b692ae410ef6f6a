use std::process::{Command, Output};

fn gx_ffc(uri: &str) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_gx_ffc"));
    for key in [
        "GALAXY_CONFIG",
        "GALAXY_DEVICE_URI",
        "GALAXY_DEVICE",
        "GALAXY_TIMEOUT_MS",
        "GALAXY_FFC_FILE",
    ] {
        cmd.env_remove(key);
    }
    cmd.args(["--uri", uri, "--no-save", "--ui", "plain"])
        .env("RUST_LOG", "off")
        .output()
        .expect("run gx_ffc")
}

#[test]
fn unknown_mode_exits_with_failure() {
    let out = gx_ffc("stub://?ffc=LensShading");
    assert!(!out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Create flat field correction process failed"), "{stdout}");
    assert!(!stdout.contains("<App exit!>"));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("LensShading"), "{stderr}");
}

#[test]
fn device_tier_workflow_succeeds() {
    let out = gx_ffc("stub://?ffc=DeviceFlatFieldCorrection");
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(out.status.success(), "{stdout}\n{}", String::from_utf8_lossy(&out.stderr));
    assert!(stdout.contains("<App get FFC Image Success!>"), "{stdout}");
    assert!(stdout.contains("<App exit!>"));
}
