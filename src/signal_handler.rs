use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use signal_hook::consts::SIGINT;
use signal_hook::flag;
use signal_hook::iterator::Signals;
use tracing::{error, info};

use crate::history::{self, Ledger, SharedLedger};

/// Exit status when a second interrupt arrives while shutting down.
pub const FORCED_EXIT_STATUS: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
}

/// Turns SIGINT into a ledger dump followed by process exit.
///
/// The OS-level handler only wakes a dedicated thread through signal-hook's
/// self-pipe. That thread prints the ledger under its mutex, so the dump is
/// safe whatever the input loop is doing, including waiting on a pipeline.
pub struct ShutdownController {
    shutting_down: Arc<AtomicBool>,
}

impl ShutdownController {
    pub fn install(ledger: SharedLedger) -> io::Result<Self> {
        let shutting_down = Arc::new(AtomicBool::new(false));

        // armed once shutdown has begun: a further SIGINT exits on the spot
        flag::register_conditional_shutdown(SIGINT, FORCED_EXIT_STATUS, Arc::clone(&shutting_down))?;
        let mut signals = Signals::new([SIGINT])?;

        let state = Arc::clone(&shutting_down);
        thread::Builder::new()
            .name("pipesh-signals".into())
            .spawn(move || {
                if signals.forever().next().is_some() {
                    state.store(true, Ordering::SeqCst);
                    info!("interrupt received, shutting down");
                    let status = match dump(&history::lock(&ledger)) {
                        Ok(()) => 0,
                        Err(err) => {
                            error!(error = %err, "could not print history on interrupt");
                            1
                        }
                    };
                    std::process::exit(status);
                }
            })?;

        Ok(Self { shutting_down })
    }

    pub fn state(&self) -> ShutdownState {
        if self.shutting_down.load(Ordering::SeqCst) {
            ShutdownState::ShuttingDown
        } else {
            ShutdownState::Running
        }
    }
}

fn dump(ledger: &Ledger) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_interrupt_report(ledger, &mut out)?;
    out.flush()
}

/// What the shell prints on its way out after an interrupt.
pub fn write_interrupt_report<W: Write>(ledger: &Ledger, out: &mut W) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "Ctrl+C detected. Printing history before exiting...")?;
    ledger.write_full(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    #[test]
    fn report_is_banner_then_full_history() {
        let mut ledger = Ledger::new(4);
        ledger.record("true", SystemTime::now());

        let mut out = Vec::new();
        write_interrupt_report(&ledger, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("\nCtrl+C detected. Printing history before exiting...\nFull command history:\n"));
        assert_eq!(text.matches("Command: true").count(), 1);
    }

    #[test]
    fn installed_controller_starts_running() {
        let controller = ShutdownController::install(Ledger::shared(1)).unwrap();
        assert_eq!(controller.state(), ShutdownState::Running);
    }
}
