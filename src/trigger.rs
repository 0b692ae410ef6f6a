//! Software-trigger acquisition loop.
//!
//! One thread issues `TriggerSoftware` at a fixed interval, another pulls
//! and converts frames. They share nothing but a [`CancelToken`]. A failed
//! trigger or frame ends the loop; nothing is retried.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::camera::{Camera, DEFAULT_GRAB_TIMEOUT};
use crate::error::{CameraError, Result};
use crate::frame::Frame;

const CANCEL_POLL: Duration = Duration::from_millis(10);

/// Shared stop flag. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` or until cancelled. Returns true if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep((deadline - now).min(CANCEL_POLL));
        }
    }
}

#[derive(Clone, Debug)]
pub struct TriggerSettings {
    /// Delay between software triggers.
    pub interval: Duration,
    pub grab_timeout: Duration,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            grab_timeout: DEFAULT_GRAB_TIMEOUT,
            max_frames: None,
        }
    }
}

/// Why the loop ended.
#[derive(Debug)]
pub enum LoopEnd {
    /// The token was cancelled from outside (Ctrl-C, console command).
    Cancelled,
    /// The frame limit was reached or the callback asked to stop.
    Finished,
    Failed(CameraError),
}

#[derive(Debug)]
pub struct TriggerStats {
    pub triggers: u64,
    pub frames: u64,
    pub end: LoopEnd,
}

impl TriggerStats {
    pub fn is_failure(&self) -> bool {
        matches!(self.end, LoopEnd::Failed(_))
    }
}

/// Put the camera in software-trigger mode and run the loop until
/// cancelled, stopped by `on_frame` (returning false), the frame limit, or
/// the first failure. Acquisition is stopped before returning.
pub fn run_software_trigger_loop<F>(
    camera: &Camera,
    cancel: &CancelToken,
    settings: &TriggerSettings,
    on_frame: F,
) -> Result<TriggerStats>
where
    F: FnMut(Frame) -> bool,
{
    camera.set_software_trigger_mode()?;
    let acquisition = camera.acquire()?;

    // Private token so that finishing the loop does not cancel the caller's.
    let stop = CancelToken::new();
    let triggers = AtomicU64::new(0);
    let frames = AtomicU64::new(0);
    let failure: Mutex<Option<CameraError>> = Mutex::new(None);
    let mut finished = false;

    let record = |err: CameraError| {
        if let Ok(mut slot) = failure.lock() {
            slot.get_or_insert(err);
        }
    };

    thread::scope(|scope| {
        scope.spawn(|| {
            while !stop.is_cancelled() && !cancel.is_cancelled() {
                if let Err(err) = camera.software_trigger() {
                    log::error!("software trigger: {err}");
                    record(err);
                    stop.cancel();
                    break;
                }
                triggers.fetch_add(1, Ordering::SeqCst);
                if stop.sleep(settings.interval) {
                    break;
                }
            }
        });

        let mut on_frame = on_frame;
        while !stop.is_cancelled() && !cancel.is_cancelled() {
            match camera.grab_frame(settings.grab_timeout) {
                Ok(frame) => {
                    let count = frames.fetch_add(1, Ordering::SeqCst) + 1;
                    let keep_going = on_frame(frame);
                    if !keep_going || settings.max_frames.is_some_and(|max| count >= max) {
                        finished = true;
                        break;
                    }
                }
                // A wait cut short by cancellation is not a failure.
                Err(_) if stop.is_cancelled() || cancel.is_cancelled() => break,
                Err(err) => {
                    log::error!("frame fetch: {err}");
                    record(err);
                    break;
                }
            }
        }
        stop.cancel();
    });

    acquisition.stop()?;

    let failure = failure
        .into_inner()
        .map_err(|_| CameraError::Device("trigger loop state poisoned".to_string()))?;
    let end = match failure {
        Some(err) => LoopEnd::Failed(err),
        None if finished => LoopEnd::Finished,
        None => LoopEnd::Cancelled,
    };
    let stats = TriggerStats {
        triggers: triggers.into_inner(),
        frames: frames.into_inner(),
        end,
    };
    log::info!(
        "trigger loop ended after {} triggers, {} frames ({:?})",
        stats.triggers,
        stats.frames,
        stats.end
    );
    Ok(stats)
}
