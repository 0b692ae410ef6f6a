//! gx_stream - continuous acquisition driven by console commands
//!
//! [a] starts acquisition, [s] stops it, [x]/[q] exits. Each frame is
//! converted to BGR and summarised on stdout. The first failed frame ends
//! the session; nothing is retried.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::sync::mpsc::TryRecvError;
use std::time::{Duration, Instant};

use galaxy_camera::config::ToolConfig;
use galaxy_camera::feature::catalog as names;
use galaxy_camera::{open_manager, Acquisition, Camera, CancelToken, DeviceSelector, FeatureKind};

#[path = "../ui.rs"]
mod ui;

use ui::ConsoleCommand;

const IDLE_POLL: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, env = "GALAXY_DEVICE_URI")]
    uri: Option<String>,
    /// 1-based index or `sn:<serial>`.
    #[arg(long, env = "GALAXY_DEVICE")]
    device: Option<String>,
    /// Exposure time in microseconds.
    #[arg(long)]
    exposure: Option<f64>,
    /// Gain in dB.
    #[arg(long)]
    gain: Option<f64>,
    /// Horizontal and vertical binning factor.
    #[arg(long)]
    binning: Option<u32>,
    /// Start acquiring without waiting for [a].
    #[arg(long)]
    autostart: bool,
    /// Exit after this many frames.
    #[arg(long)]
    frames: Option<u64>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::from_args(&args.ui, std::io::stderr().is_terminal());
    let mut cfg = ToolConfig::load()?;

    if args.exposure.is_some() {
        cfg.acquisition.exposure_time = args.exposure;
    }
    if args.gain.is_some() {
        cfg.acquisition.gain = args.gain;
    }
    if args.binning.is_some() {
        cfg.acquisition.binning = args.binning;
    }
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

    cfg.acquisition.apply(&camera)?;
    for name in [names::EXPOSURE_TIME, names::GAIN] {
        let feature = camera.feature(name, FeatureKind::Float);
        if let (Ok(value), Ok(Some(range))) = (feature.get(), feature.range()) {
            println!("{name}: {value} {range}");
        }
    }
    camera.set_continuous_mode()?;

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel()).context("install Ctrl-C handler")?;
    }

    let result = stream(&camera, &cfg, &args, &cancel);
    camera.close()?;
    result
}

fn stream(camera: &Camera, cfg: &ToolConfig, args: &Args, cancel: &CancelToken) -> Result<()> {
    let console = ui::spawn_console();
    eprintln!("{}", ConsoleCommand::help());

    let mut acquisition: Option<Acquisition<'_>> = None;
    if args.autostart {
        acquisition = Some(camera.acquire()?);
    }

    let mut frames = 0u64;
    let mut last = Instant::now();
    while !cancel.is_cancelled() {
        match console.try_recv() {
            Ok(ConsoleCommand::StartAcquisition) => {
                if acquisition.is_none() {
                    acquisition = Some(camera.acquire()?);
                    log::info!("acquisition started");
                }
            }
            Ok(ConsoleCommand::StopAcquisition) => {
                if let Some(running) = acquisition.take() {
                    running.stop()?;
                    log::info!("acquisition stopped");
                }
            }
            Ok(ConsoleCommand::Exit) => break,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
        }

        let Some(running) = &acquisition else {
            std::thread::sleep(IDLE_POLL);
            continue;
        };
        let frame = match running.grab_frame(cfg.grab_timeout) {
            Ok(frame) => frame,
            Err(err) if cancel.is_cancelled() => {
                log::debug!("frame wait interrupted: {err}");
                break;
            }
            Err(err) => return Err(err).context("frame acquisition failed"),
        };
        frames += 1;
        let now = Instant::now();
        let fps = 1.0 / now.duration_since(last).as_secs_f64().max(1e-6);
        last = now;
        println!(
            "<Frame OK: Width={}, Height={}, Frame={}, Mean={:.1}, FPS={:.1}>",
            frame.width,
            frame.height,
            frames,
            frame.mean_intensity(),
            fps
        );
        if args.frames.is_some_and(|max| frames >= max) {
            break;
        }
    }

    if let Some(running) = acquisition.take() {
        running.stop()?;
    }
    log::info!("{frames} frames received");
    Ok(())
}
