#![allow(dead_code)]

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn from_args(ui_flag: &str, is_tty: bool) -> Self {
        let mode = match ui_flag {
            "plain" => UiMode::Plain,
            "pretty" => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self { mode, is_tty }
    }

    fn pretty(&self) -> bool {
        self.is_tty && !matches!(self.mode, UiMode::Plain)
    }

    /// Announce a stage; it is reported done (with its duration) when the
    /// guard drops.
    pub fn stage(&self, name: &str) -> StageGuard {
        if self.pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    failed: bool,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
            failed: false,
        }
    }

    /// Pass a stage result through, marking the stage failed on error.
    pub fn check<T, E>(&mut self, result: Result<T, E>) -> Result<T, E> {
        if result.is_err() {
            self.failed = true;
        }
        result
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let mark = if self.failed || std::thread::panicking() {
            "✘"
        } else {
            "✔"
        };
        let message = format!("{mark} {} ({})", self.name, format_duration(self.start.elapsed()));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Single-letter commands typed on stdin (followed by Enter).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    StartAcquisition,
    StopAcquisition,
    Exit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "a" => Some(ConsoleCommand::StartAcquisition),
            "s" => Some(ConsoleCommand::StopAcquisition),
            "x" | "q" => Some(ConsoleCommand::Exit),
            _ => None,
        }
    }

    pub fn help() -> &'static str {
        "Press [a] then [Enter] to start acquisition, [s] to stop, [x] or [q] to exit"
    }
}

/// Read console commands on a background thread. The channel closes at
/// end of input; unknown input is ignored.
pub fn spawn_console() -> Receiver<ConsoleCommand> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match ConsoleCommand::parse(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                None if !line.trim().is_empty() => eprintln!("{}", ConsoleCommand::help()),
                None => {}
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_letters_map_to_commands() {
        assert_eq!(ConsoleCommand::parse("a\n"), Some(ConsoleCommand::StartAcquisition));
        assert_eq!(ConsoleCommand::parse(" S "), Some(ConsoleCommand::StopAcquisition));
        assert_eq!(ConsoleCommand::parse("x"), Some(ConsoleCommand::Exit));
        assert_eq!(ConsoleCommand::parse("Q"), Some(ConsoleCommand::Exit));
        assert_eq!(ConsoleCommand::parse("start"), None);
    }
}
