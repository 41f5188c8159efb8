use std::fmt;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::config::PrimaryStage;
use crate::errors::ShellError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    Exited(i32),
    Signaled(Signal),
}

impl ExitState {
    pub fn success(&self) -> bool {
        matches!(self, ExitState::Exited(0))
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitState::Exited(code) => Some(*code),
            ExitState::Signaled(_) => None,
        }
    }
}

impl fmt::Display for ExitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitState::Exited(code) => write!(f, "exited with code {code}"),
            ExitState::Signaled(sig) => write!(f, "terminated by signal {}", sig.as_str()),
        }
    }
}

/// A child started for one pipeline stage.
#[derive(Debug, Clone)]
pub struct SpawnedProcess {
    pub pid: Pid,
    pub stage: usize,
    pub program: String,
    /// Unset until the child has been reaped.
    pub status: Option<ExitState>,
}

impl SpawnedProcess {
    pub fn new(pid: Pid, stage: usize, program: impl Into<String>) -> Self {
        Self {
            pid,
            stage,
            program: program.into(),
            status: None,
        }
    }
}

/// Index of the primary process among those actually started.
pub fn primary_index(processes: &[SpawnedProcess], policy: PrimaryStage) -> Option<usize> {
    if processes.is_empty() {
        return None;
    }
    match policy {
        PrimaryStage::First => Some(0),
        PrimaryStage::Last => Some(processes.len() - 1),
    }
}

#[derive(Debug)]
pub struct PipelineResult {
    processes: Vec<SpawnedProcess>,
    primary: Option<usize>,
}

impl PipelineResult {
    pub fn processes(&self) -> &[SpawnedProcess] {
        &self.processes
    }

    pub fn primary(&self) -> Option<&SpawnedProcess> {
        self.primary.map(|i| &self.processes[i])
    }

    pub fn primary_pid(&self) -> Option<Pid> {
        self.primary().map(|p| p.pid)
    }

    /// True when the primary process exited with status zero.
    pub fn success(&self) -> bool {
        self.primary()
            .and_then(|p| p.status)
            .is_some_and(|s| s.success())
    }

    pub fn all_reaped(&self) -> bool {
        self.processes.iter().all(|p| p.status.is_some())
    }
}

/// Block until every process has terminated. There is no timeout.
pub fn wait_all(mut processes: Vec<SpawnedProcess>, policy: PrimaryStage) -> PipelineResult {
    for process in processes.iter_mut() {
        match wait_one(process.pid) {
            Ok(state) => {
                debug!(pid = %process.pid, stage = process.stage, %state, "stage finished");
                process.status = Some(state);
            }
            Err(err) => warn!(pid = %process.pid, error = %err, "could not reap stage"),
        }
    }

    let primary = primary_index(&processes, policy);
    PipelineResult { processes, primary }
}

fn wait_one(pid: Pid) -> Result<ExitState, ShellError> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(ExitState::Exited(code)),
            Ok(WaitStatus::Signaled(_, sig, _)) => return Ok(ExitState::Signaled(sig)),
            // stop/continue notifications are not requested, but keep waiting if one shows up
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(err) => return Err(ShellError::Wait(err)),
        }
    }
}
