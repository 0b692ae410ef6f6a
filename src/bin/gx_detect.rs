//! gx_detect - continuous acquisition with hosted object detection
//!
//! Frames go to the remote detector one at a time. By default the boxes are
//! printed; with `--annotated` the service draws them and the returned JPEGs
//! are written to `--output`.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Instant;

use galaxy_camera::config::ToolConfig;
use galaxy_camera::detect::{BackendRegistry, DetectionCapability, RemoteBackend, RemoteConfig};
use galaxy_camera::{open_manager, Camera, CancelToken, DeviceSelector};

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
    /// Ask the service for annotated images instead of boxes.
    #[arg(long)]
    annotated: bool,
    /// Directory for annotated images.
    #[arg(long, default_value = "detections")]
    output: PathBuf,
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

    let api_key = cfg
        .detect
        .api_key
        .clone()
        .ok_or_else(|| anyhow!("GALAXY_DETECT_API_KEY (or detect.api_key) is required"))?;
    let mut registry = BackendRegistry::new();
    registry.register(RemoteBackend::new(RemoteConfig {
        endpoint: cfg.detect.endpoint.clone(),
        model: cfg.detect.model.clone(),
        api_key,
        input_size: cfg.detect.input_size,
        confidence: cfg.detect.confidence,
        overlap: cfg.detect.overlap,
        ..RemoteConfig::default()
    })?);
    log::info!("detector backends: {:?}", registry.list());

    if args.annotated {
        std::fs::create_dir_all(&args.output)
            .with_context(|| format!("create {}", args.output.display()))?;
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
    cfg.acquisition.apply(&camera)?;
    camera.set_continuous_mode()?;

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel()).context("install Ctrl-C handler")?;
    }
    eprintln!("Press Ctrl-C to stop");

    let result = detect_loop(&camera, &cfg, &args, &registry, &cancel);
    camera.close()?;
    result
}

fn detect_loop(
    camera: &Camera,
    cfg: &ToolConfig,
    args: &Args,
    registry: &BackendRegistry,
    cancel: &CancelToken,
) -> Result<()> {
    let capability = if args.annotated {
        DetectionCapability::AnnotatedImage
    } else {
        DetectionCapability::ObjectDetection
    };
    let acquisition = camera.acquire()?;
    let mut frames = 0u64;
    while !cancel.is_cancelled() {
        let frame = match acquisition.grab_frame(cfg.grab_timeout) {
            Ok(frame) => frame,
            Err(err) if cancel.is_cancelled() => {
                log::debug!("frame wait interrupted: {err}");
                break;
            }
            Err(err) => return Err(err).context("frame acquisition failed"),
        };
        frames += 1;

        let started = Instant::now();
        let result = registry.detect(capability, &frame)?;
        let fps = 1.0 / started.elapsed().as_secs_f64().max(1e-6);

        match &result.annotated_image {
            Some(jpeg) => {
                let path = args.output.join(format!("frame_{frames:06}.jpg"));
                std::fs::write(&path, jpeg).with_context(|| format!("write {}", path.display()))?;
                println!("<Frame {frames}: {} FPS={fps:.1}>", path.display());
            }
            None => {
                println!(
                    "<Frame {frames}: {} object(s) FPS={fps:.1}>",
                    result.detections.len()
                );
                for detection in &result.detections {
                    let (x0, y0, x1, y1) = detection.corners();
                    println!("  {} ({x0},{y0})-({x1},{y1})", detection.label());
                }
            }
        }
        if args.frames.is_some_and(|max| frames >= max) {
            break;
        }
    }
    acquisition.stop()?;
    log::info!("{frames} frames processed");
    Ok(())
}
