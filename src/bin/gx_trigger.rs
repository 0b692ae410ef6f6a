//! gx_trigger - software-trigger acquisition on two threads

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::time::Duration;

use galaxy_camera::config::ToolConfig;
use galaxy_camera::trigger::{LoopEnd, TriggerSettings};
use galaxy_camera::{open_manager, run_software_trigger_loop, Camera, CancelToken, DeviceSelector};

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
    /// Milliseconds between software triggers.
    #[arg(long)]
    interval_ms: Option<u64>,
    /// Stop after this many frames.
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
    let cfg = ToolConfig::load()?;

    let uri = args.uri.unwrap_or(cfg.device_uri.clone());
    let selector: DeviceSelector = match &args.device {
        Some(device) => device.parse().context("invalid --device")?,
        None => cfg.device.clone(),
    };
    let settings = TriggerSettings {
        interval: args
            .interval_ms
            .map(Duration::from_millis)
            .unwrap_or(cfg.trigger.interval),
        grab_timeout: cfg.grab_timeout,
        max_frames: args.frames.or(cfg.trigger.max_frames),
    };

    let camera = {
        let mut stage = ui.stage("Open camera");
        let manager = stage.check(open_manager(&uri))?;
        stage.check(Camera::open(manager, selector, cfg.camera_options()))?
    };
    cfg.acquisition.apply(&camera)?;

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel()).context("install Ctrl-C handler")?;
    }
    eprintln!("Press Ctrl-C to stop");

    let stats = run_software_trigger_loop(&camera, &cancel, &settings, |frame| {
        println!(
            "<Frame OK: Width={}, Height={}, Mean={:.1}>",
            frame.width,
            frame.height,
            frame.mean_intensity()
        );
        true
    });
    camera.close()?;

    let stats = stats?;
    println!("{} triggers, {} frames", stats.triggers, stats.frames);
    match stats.end {
        LoopEnd::Failed(err) => Err(anyhow!("trigger loop failed: {err}")),
        LoopEnd::Cancelled | LoopEnd::Finished => Ok(()),
    }
}
