//! gx_info - enumerate cameras and dump their standard controls

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;

use galaxy_camera::config::ToolConfig;
use galaxy_camera::feature::catalog::FFC_FEATURES;
use galaxy_camera::feature::Feature;
use galaxy_camera::ffc::FfcTier;
use galaxy_camera::{open_manager, Camera, DeviceSelector};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Device URI (`stub://...` for the simulated backend).
    #[arg(long, env = "GALAXY_DEVICE_URI")]
    uri: Option<String>,
    /// Camera to open: 1-based index or `sn:<serial>`.
    #[arg(long, env = "GALAXY_DEVICE")]
    device: Option<String>,
    /// Only list devices; do not open any.
    #[arg(long)]
    list: bool,
    /// Print the device list as JSON.
    #[arg(long)]
    json: bool,
    /// Include the flat-field controls.
    #[arg(long)]
    ffc: bool,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::from_args(&args.ui, std::io::stderr().is_terminal());
    let cfg = ToolConfig::load()?;

    let uri = args.uri.unwrap_or(cfg.device_uri.clone());
    let selector: DeviceSelector = match &args.device {
        Some(device) => device.parse().context("invalid --device")?,
        None => cfg.device.clone(),
    };

    let manager = {
        let _stage = ui.stage("Enumerate devices");
        open_manager(&uri)?
    };
    let devices = manager.update_device_list()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
    } else {
        println!("{} device(s)", devices.len());
        for info in &devices {
            println!(
                "<idx:{}> <{:?}> <Vendor: {}> <Model: {}> <SN: {}>{}",
                info.index,
                info.transport,
                info.vendor_name,
                info.model_name,
                info.serial_number,
                info.ip_address
                    .as_deref()
                    .map(|ip| format!(" <IP: {ip}>"))
                    .unwrap_or_default()
            );
        }
    }
    if args.list || devices.is_empty() {
        return Ok(());
    }

    let camera = {
        let _stage = ui.stage(&format!("Open camera {selector}"));
        Camera::open(manager, selector, cfg.camera_options())?
    };
    println!(
        "pixel format {} ({})",
        camera.pixel_format(),
        if camera.is_color() { "color" } else { "mono" }
    );
    println!("flat-field tier: {}", FfcTier::classify(camera.features())?);

    for feature in camera.standard_features() {
        print_feature(&feature);
    }
    if args.ffc {
        for descriptor in FFC_FEATURES.iter() {
            print_feature(&camera.resolve(descriptor));
        }
    }

    camera.close()?;
    Ok(())
}

fn print_feature(feature: &Feature<'_>) {
    if !feature.is_available() {
        println!("{:<28} {:<8} not implemented", feature.name(), feature.kind());
        return;
    }
    let access = match (feature.is_readable(), feature.is_writable()) {
        (true, true) => "RW",
        (true, false) => "R",
        (false, true) => "W",
        (false, false) => "-",
    };
    let value = if feature.is_readable() && feature.kind() != galaxy_camera::FeatureKind::Command {
        feature
            .get()
            .map(|v| v.to_string())
            .unwrap_or_else(|err| format!("<{err}>"))
    } else {
        String::new()
    };
    let range = match feature.range() {
        Ok(Some(range)) => format!("  {range}"),
        _ => String::new(),
    };
    println!(
        "{:<28} {:<8} {:<3} {}{}",
        feature.name(),
        feature.kind(),
        access,
        value,
        range
    );
}
