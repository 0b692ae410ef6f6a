//! gx_ffc - calculate, apply and persist flat-field correction
//!
//! The calculation runs wherever the camera can do it: on the device for
//! cameras that generate their own coefficients, in the SDK otherwise.
//! Coefficients are saved to `--file` (or `ffc.file` in the config), or to
//! device flash when no file is given and the camera has one.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use galaxy_camera::config::ToolConfig;
use galaxy_camera::{open_manager, Camera, DeviceSelector, FfcParameters, FlatFieldCorrection};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, env = "GALAXY_DEVICE_URI")]
    uri: Option<String>,
    /// 1-based index or `sn:<serial>`.
    #[arg(long, env = "GALAXY_DEVICE")]
    device: Option<String>,
    /// Also capture a dark field (software-calculating cameras only).
    #[arg(long)]
    need_dark: bool,
    /// Load stored coefficients instead of calculating new ones.
    #[arg(long)]
    load: bool,
    /// Do not store the coefficients afterwards.
    #[arg(long)]
    no_save: bool,
    /// Coefficient file; omit to use device flash.
    #[arg(long, env = "GALAXY_FFC_FILE")]
    file: Option<PathBuf>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::from_args(&args.ui, std::io::stderr().is_terminal());
    let cfg = ToolConfig::load()?;

    let uri = args.uri.clone().unwrap_or(cfg.device_uri.clone());
    let selector: DeviceSelector = match &args.device {
        Some(device) => device.parse().context("invalid --device")?,
        None => cfg.device.clone(),
    };

    let camera = {
        let mut stage = ui.stage("Open camera");
        let manager = stage.check(open_manager(&uri))?;
        stage.check(Camera::open(manager, selector, cfg.camera_options()))?
    };
    let info = camera.info();
    println!("***********************************************");
    println!("<Vendor Name:   {}>", info.vendor_name);
    println!("<Model Name:    {}>", info.model_name);
    println!("<Serial Number: {}>", info.serial_number);
    println!("***********************************************");

    let result = run(&camera, &cfg, &args, &ui);
    camera.close()?;
    result?;
    println!("<App exit!>");
    Ok(())
}

fn run(camera: &Camera, cfg: &ToolConfig, args: &Args, ui: &ui::Ui) -> Result<()> {
    let mut ffc = match FlatFieldCorrection::new(camera) {
        Ok(ffc) => ffc,
        Err(err) => {
            println!("<Create flat field correction process failed, App exit!>");
            return Err(err).context("flat-field correction unavailable");
        }
    };
    println!("<Flat-field tier: {}>", ffc.tier());

    let params = merged_params(camera, &cfg.ffc.params)?;
    {
        let mut stage = ui.stage("Configure");
        stage.check(ffc.configure(&params))?;
    }

    let file = args.file.clone().or_else(|| cfg.ffc.file.clone());
    let store = file.clone().unwrap_or_default();
    if args.load {
        let mut stage = ui.stage("Load coefficients");
        let loaded = stage.check(ffc.load_coefficients(&store))?;
        if !loaded {
            return Err(anyhow!("no stored coefficients to load"));
        }
    } else {
        let mut stage = ui.stage("Calculate");
        let need_dark = args.need_dark || cfg.ffc.need_dark;
        if let Err(err) = stage.check(ffc.calculate(need_dark)) {
            println!("<Calculate flat field correction error, App exit!>");
            return Err(err).context("flat-field calculation failed");
        }
    }

    ffc.enable_correction(true)?;
    println!("<Enable flat-field correction.>");

    let image = {
        let mut stage = ui.stage("Grab corrected image");
        stage.check(ffc.corrected_image())?
    };
    let (min, max) = image
        .data
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let mean = if image.data.is_empty() {
        0.0
    } else {
        image.data.iter().map(|&v| f64::from(v)).sum::<f64>() / image.data.len() as f64
    };
    println!(
        "<App get FFC Image Success!> {}x{} mean={mean:.1} min={min} max={max}",
        image.width, image.height
    );

    if !args.no_save && !args.load {
        let mut stage = ui.stage("Save coefficients");
        let saved = stage.check(ffc.save_coefficients(&store))?;
        match (&file, saved) {
            (Some(path), true) => println!("<Coefficients saved to {}>", path.display()),
            (None, true) => println!("<Coefficients saved to device flash>"),
            (_, false) => println!("<Coefficients not saved: no storage on this camera>"),
        }
    }
    log::debug!("{ffc:?}");
    Ok(())
}

/// Configured parameters, with the device-side selectors the camera
/// currently uses filled in where the config leaves them open.
fn merged_params(camera: &Camera, configured: &FfcParameters) -> Result<FfcParameters> {
    let device = FfcParameters::from_device(camera).context("read flat-field settings")?;
    Ok(FfcParameters {
        coefficient_selector: configured
            .coefficient_selector
            .clone()
            .or(device.coefficient_selector),
        accuracy_selector: configured
            .accuracy_selector
            .clone()
            .or(device.accuracy_selector),
        block_size: configured.block_size.or(device.block_size),
        ..configured.clone()
    })
}
