//! gx_action - fire GigE Vision cameras with action commands
//!
//! Every GigE camera found is armed on `Action0`. One immediate command is
//! broadcast and each camera's frame is read back; then PTP is enabled and
//! a second command is scheduled `--delay-ms` into the future.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::time::Duration;

use galaxy_camera::action::{self, ActionKeys, PtpWait};
use galaxy_camera::config::ToolConfig;
use galaxy_camera::device::TransportLayer;
use galaxy_camera::{open_manager, Camera, DeviceSelector};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, env = "GALAXY_DEVICE_URI")]
    uri: Option<String>,
    /// Delay between latching the reference time and the scheduled action.
    #[arg(long, default_value_t = 5000)]
    delay_ms: u64,
    #[arg(long, default_value_t = 1)]
    device_key: u32,
    #[arg(long, default_value_t = 1)]
    group_key: u32,
    #[arg(long, default_value_t = 0xFFFF_FFFF)]
    group_mask: u32,
    /// Skip the PTP-scheduled command.
    #[arg(long)]
    no_schedule: bool,
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

    let manager = open_manager(&uri)?;
    let devices = manager.update_device_list_ex(TransportLayer::Gev)?;
    if devices.is_empty() {
        return Err(anyhow!("no GigE Vision cameras found"));
    }
    println!("{} GigE camera(s)", devices.len());

    let mut cameras = Vec::with_capacity(devices.len());
    for info in &devices {
        let mut stage = ui.stage(&format!("Open {}", info.serial_number));
        let camera = stage.check(Camera::open(
            manager.clone(),
            DeviceSelector::Serial(info.serial_number.clone()),
            cfg.camera_options(),
        ))?;
        let support = action::check_support(&camera)?;
        if !support.is_complete() {
            return Err(anyhow!(
                "{} lacks action command support ({support:?})",
                info.serial_number
            ));
        }
        cameras.push(camera);
    }

    let keys = ActionKeys {
        device_key: args.device_key,
        group_key: args.group_key,
        group_mask: args.group_mask,
    };
    let result = run(&cameras, &keys, &args, &ui);

    for camera in cameras {
        if let Err(err) = action::disarm(&camera) {
            log::warn!("{}: disarm: {err}", camera.info().serial_number);
        }
        camera.close()?;
    }
    result
}

fn run(cameras: &[Camera], keys: &ActionKeys, args: &Args, ui: &ui::Ui) -> Result<()> {
    let Some(reference) = cameras.first() else {
        return Ok(());
    };
    let manager = reference.manager().clone();

    for camera in cameras {
        action::arm(camera, keys)
            .with_context(|| format!("arm {}", camera.info().serial_number))?;
    }

    {
        let _stage = ui.stage("Immediate action command");
        action::issue(manager.as_ref(), &keys.command(cameras.len()))?;
        read_back(cameras, Duration::from_millis(1000));
    }

    if args.no_schedule {
        return Ok(());
    }

    {
        let _stage = ui.stage("Wait for PTP");
        for camera in cameras {
            let role = action::wait_for_ptp_role(camera, &PtpWait::default())?;
            match role {
                Some(role) => println!("<{}: PTP {role}>", camera.info().serial_number),
                None => println!("<{}: PTP not settled>", camera.info().serial_number),
            }
        }
    }

    let delay = Duration::from_millis(args.delay_ms);
    {
        let _stage = ui.stage("Scheduled action command");
        action::issue_scheduled(
            manager.as_ref(),
            reference,
            &keys.command(cameras.len()),
            delay,
        )?;
        read_back(cameras, delay + Duration::from_secs(1));
    }
    Ok(())
}

fn read_back(cameras: &[Camera], timeout: Duration) {
    for camera in cameras {
        let serial = &camera.info().serial_number;
        match camera.grab_raw(timeout) {
            Ok(image) if image.is_complete() => println!(
                "<{serial}: frame {} {}x{} at {}>",
                image.frame_id, image.width, image.height, image.timestamp
            ),
            Ok(image) => println!("<{serial}: frame {} incomplete>", image.frame_id),
            Err(err) => println!("<{serial}: no frame ({err})>"),
        }
    }
}
