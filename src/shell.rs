use std::io::{self, BufRead, Read, Write};
use std::time::SystemTime;

use colored::Colorize;
use tracing::{debug, error, info};

use crate::command::{Command, Pipeline};
use crate::config::Config;
use crate::errors::{Result, ShellError};
use crate::history::{self, Ledger, Recorded, SharedLedger};
use crate::jobs::{self, PipelineResult};
use crate::pipes::PipelinePlan;
use crate::prompt::Prompt;
use crate::signal_handler::ShutdownController;
use crate::spawn;

/// What the loop does after a line has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct Shell {
    config: Config,
    prompt: Prompt,
    ledger: SharedLedger,
}

impl Shell {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let ledger = Ledger::shared(config.limits.history_capacity);
        let prompt = Prompt::new(config.prompt.clone());
        Ok(Self {
            config,
            prompt,
            ledger,
        })
    }

    pub fn ledger(&self) -> SharedLedger {
        SharedLedger::clone(&self.ledger)
    }

    /// Interactive session on the process's own stdin/stdout, with SIGINT
    /// turned into a history dump.
    ///
    /// Stdout is locked per write, never across a blocking read or wait: the
    /// interrupt thread takes the ledger and then stdout to print its dump.
    pub fn run(&mut self) -> Result<()> {
        let _shutdown = ShutdownController::install(self.ledger())?;
        self.run_session(io::stdin().lock(), &mut io::stdout())
    }

    /// Read-eval loop until `exit`, end of input, or a read failure.
    pub fn run_session<R: BufRead, W: Write>(&mut self, mut input: R, out: &mut W) -> Result<()> {
        loop {
            write!(out, "{}", self.prompt.get_string())?;
            out.flush()?;

            let line = match read_line(&mut input, self.config.limits.max_line_length) {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("end of input");
                    writeln!(out)?;
                    return self.finish(out);
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    report(&err);
                    continue;
                }
            };

            if self.execute_line(&line, out)? == Flow::Exit {
                return self.finish(out);
            }
        }
    }

    /// Handle one input line. Only failures writing to `out` are returned;
    /// everything else is reported to the user and the loop continues.
    pub fn execute_line<W: Write>(&mut self, line: &str, out: &mut W) -> Result<Flow> {
        let command = match Command::parse(line, &self.config.limits) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(Flow::Continue),
            Err(err) => {
                report(&err);
                return Ok(Flow::Continue);
            }
        };

        match command {
            Command::History => history::lock(&self.ledger).write_summary(out)?,
            Command::Exit => return Ok(Flow::Exit),
            Command::Pipeline(pipeline) => {
                out.flush()?;
                self.execute_pipeline(line.trim(), &pipeline);
            }
        }
        Ok(Flow::Continue)
    }

    /// Record, spawn, wait, complete. The ledger lock is never held while
    /// blocking so an interrupt can always dump it.
    pub fn execute_pipeline(&mut self, text: &str, pipeline: &Pipeline) -> Option<PipelineResult> {
        let started = SystemTime::now();
        let handle = match history::lock(&self.ledger).record(text, started) {
            Recorded::Entry(handle) => Some(handle),
            Recorded::Full { first_time } => {
                if first_time {
                    eprintln!(
                        "{} history is full ({} entries); further commands will not be recorded",
                        "pipesh:".red(),
                        self.config.limits.history_capacity
                    );
                }
                None
            }
        };
        info!(command = text, stages = pipeline.len(), "running pipeline");

        let result = match PipelinePlan::build(pipeline) {
            Ok(plan) => {
                let outcome = spawn::spawn(pipeline, plan);
                if let Some(err) = &outcome.error {
                    report(err);
                }

                let primary = jobs::primary_index(&outcome.processes, self.config.primary_stage)
                    .map(|i| outcome.processes[i].pid);
                if let (Some(handle), Some(pid)) = (handle, primary) {
                    history::lock(&self.ledger).set_pid(handle, pid);
                }

                Some(jobs::wait_all(outcome.processes, self.config.primary_stage))
            }
            Err(err) => {
                report(&err);
                None
            }
        };

        if let Some(handle) = handle {
            history::lock(&self.ledger).complete(handle, SystemTime::now());
        }

        if let Some(primary) = result.as_ref().and_then(|r| r.primary()) {
            match primary.status {
                Some(status) if !status.success() => {
                    eprintln!("{} {}: {}", "pipesh:".red(), primary.program, status);
                }
                _ => {}
            }
        }
        result
    }

    fn finish<W: Write>(&self, out: &mut W) -> Result<()> {
        history::lock(&self.ledger).write_full(out)?;
        out.flush()?;
        Ok(())
    }
}

/// Read one line without its newline. `None` means end of input.
///
/// At most `max + 1` bytes are buffered; the rest of an over-long line is
/// discarded so the next read starts on a fresh line.
fn read_line<R: BufRead>(input: &mut R, max: usize) -> Result<Option<String>> {
    let mut raw = Vec::new();
    let limit = (max as u64).saturating_add(1);
    let read = (&mut *input)
        .take(limit)
        .read_until(b'\n', &mut raw)
        .map_err(ShellError::Input)?;
    if read == 0 {
        return Ok(None);
    }

    if raw.last() == Some(&b'\n') {
        raw.pop();
    } else if raw.len() > max {
        let len = raw.len() + skip_line(input)?;
        return Err(ShellError::LineTooLong { len, max });
    }
    String::from_utf8(raw).map(Some).map_err(|_| ShellError::NotUtf8)
}

/// Consume up to and including the next newline, returning how many bytes
/// preceded it.
fn skip_line<R: BufRead>(input: &mut R) -> Result<usize> {
    let mut skipped = 0;
    loop {
        let buf = match input.fill_buf() {
            Ok(buf) => buf,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(ShellError::Input(err)),
        };
        if buf.is_empty() {
            return Ok(skipped);
        }
        match buf.iter().position(|&b| b == b'\n') {
            Some(i) => {
                input.consume(i + 1);
                return Ok(skipped + i);
            }
            None => {
                let n = buf.len();
                input.consume(n);
                skipped += n;
            }
        }
    }
}

fn report(err: &ShellError) {
    if err.is_fatal() {
        error!(error = %err, "fatal error");
    } else {
        debug!(error = %err, "command not run");
    }
    eprintln!("{} {}", "pipesh:".red(), err);
}
