//! Ctrl-C / Ctrl-Z handling: interrupts become requests the aggregator polls
//! between rounds, answered through a confirmation prompt.

use crossterm::{
    cursor, queue,
    terminal::{Clear, ClearType},
};
use std::io::{self, BufRead, Write};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Asks whether an interrupted run should stop.
pub trait Prompt {
    /// `true` to quit, `false` to resume.
    fn confirm_quit(&mut self) -> io::Result<bool>;
}

/// Asks on stderr and reads the answer from stdin.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn confirm_quit(&mut self) -> io::Result<bool> {
        let mut stderr = io::stderr();
        write!(stderr, "Do you really want to quit? [y/n] ")?;
        stderr.flush()?;

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer)? == 0 {
            // stdin closed: nobody can answer, so stop.
            return Ok(true);
        }
        let quit = is_yes(&answer);
        if !quit {
            queue!(
                stderr,
                cursor::MoveToPreviousLine(1),
                Clear(ClearType::CurrentLine)
            )?;
            stderr.flush()?;
        }
        Ok(quit)
    }
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim_start().chars().next(), Some('y' | 'Y'))
}

/// Forward every Ctrl-C onto a channel instead of terminating.
pub fn forward_interrupts() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl-C");
                return;
            }
            debug!("interrupt requested");
            if tx.send(()).is_err() {
                return;
            }
        }
    });
    rx
}

/// Swallow Ctrl-Z (SIGTSTP) so the pipeline is never stopped mid-round.
pub fn ignore_suspend() -> io::Result<()> {
    let mut stream = signal(SignalKind::from_raw(libc::SIGTSTP))?;
    tokio::spawn(async move {
        while stream.recv().await.is_some() {
            debug!("ignoring suspend request");
        }
    });
    Ok(())
}
