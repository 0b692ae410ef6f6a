use std::io::{self, BufRead, Write};

use crate::error::Result;

/// Asks the operator to cover the lens before a dark field is captured.
pub trait DarkFieldPrompt {
    /// Returns once the lens is covered.
    fn cover_lens(&mut self) -> Result<()>;
}

/// Prompt on stderr, wait for Enter on stdin.
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl DarkFieldPrompt for StdinPrompt {
    fn cover_lens(&mut self) -> Result<()> {
        let mut stderr = io::stderr();
        writeln!(
            stderr,
            "Dark field acquisition will start. Cover the lens and press Enter to continue."
        )?;
        stderr.flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(())
    }
}

impl<F> DarkFieldPrompt for F
where
    F: FnMut() -> Result<()>,
{
    fn cover_lens(&mut self) -> Result<()> {
        self()
    }
}
