//! Forking one child per stage and wiring its standard streams.
//!
//! Between `fork` and `exec` the child runs only async-signal-safe libc
//! calls: the shell has a signal thread, so the child must not allocate or
//! take locks. Everything the child touches is prepared before forking.

use std::ffi::CString;
use std::os::fd::RawFd;
use std::os::raw::c_char;

use nix::errno::Errno;
use nix::unistd::{self, ForkResult};
use tracing::{debug, warn};

use crate::command::{Pipeline, Stage};
use crate::errors::{Result, ShellError};
use crate::jobs::SpawnedProcess;
use crate::pipes::PipelinePlan;

/// Exit status of a child whose program could not be found.
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit status of a child whose program was found but could not be started.
pub const EXIT_CANNOT_EXECUTE: i32 = 126;

/// Argument vector and failure messages for one stage, ready for `execvp`.
struct ExecImage {
    // owns the strings `argv_ptrs` points into
    _argv: Vec<CString>,
    argv_ptrs: Vec<*const c_char>,
    not_found: Vec<u8>,
    denied: Vec<u8>,
    failed: Vec<u8>,
}

impl ExecImage {
    fn new(stage: &Stage) -> Result<Self> {
        let argv = stage
            .argv()
            .iter()
            .map(|arg| CString::new(arg.as_bytes()).map_err(|_| ShellError::InvalidArgument(arg.clone())))
            .collect::<Result<Vec<_>>>()?;

        let mut argv_ptrs: Vec<*const c_char> = argv.iter().map(|a| a.as_ptr()).collect();
        argv_ptrs.push(std::ptr::null());

        let program = stage.program();
        Ok(Self {
            _argv: argv,
            argv_ptrs,
            not_found: format!("pipesh: {program}: command not found\n").into_bytes(),
            denied: format!("pipesh: {program}: permission denied\n").into_bytes(),
            failed: format!("pipesh: {program}: cannot execute\n").into_bytes(),
        })
    }
}

/// Children started for a pipeline, plus the error that stopped spawning
/// early, if any. Started children must still be waited on.
#[derive(Debug)]
pub struct SpawnOutcome {
    pub processes: Vec<SpawnedProcess>,
    pub error: Option<ShellError>,
}

/// Start every stage of `pipeline` in index order.
///
/// The plan is consumed: once all children exist (or spawning stops early)
/// the parent's copies of every endpoint are closed.
pub fn spawn(pipeline: &Pipeline, plan: PipelinePlan) -> SpawnOutcome {
    let mut processes = Vec::with_capacity(pipeline.len());

    let images = match pipeline.stages().iter().map(ExecImage::new).collect::<Result<Vec<_>>>() {
        Ok(images) => images,
        Err(error) => {
            return SpawnOutcome {
                processes,
                error: Some(error),
            }
        }
    };
    let close_set = plan.close_set();

    for (i, (stage, image)) in pipeline.stages().iter().zip(&images).enumerate() {
        let binding = plan.binding(i);
        let stdin = plan.raw_fd(binding.stdin);
        let stdout = plan.raw_fd(binding.stdout);

        // SAFETY: the child branch only calls async-signal-safe functions
        // before exec or _exit.
        match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => exec_child(image, stdin, stdout, &close_set),
            Ok(ForkResult::Parent { child }) => {
                debug!(pid = %child, stage = i, program = stage.program(), "spawned stage");
                processes.push(SpawnedProcess::new(child, i, stage.program()));
            }
            Err(source) => {
                let error = ShellError::Spawn { stage: i + 1, source };
                warn!(%error, started = processes.len(), "aborting pipeline");
                drop(plan);
                return SpawnOutcome {
                    processes,
                    error: Some(error),
                };
            }
        }
    }

    drop(plan);
    SpawnOutcome {
        processes,
        error: None,
    }
}

fn exec_child(image: &ExecImage, stdin: Option<RawFd>, stdout: Option<RawFd>, close_set: &[RawFd]) -> ! {
    unsafe {
        // the shell ignores SIGPIPE and catches SIGINT; programs expect defaults
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        libc::signal(libc::SIGINT, libc::SIG_DFL);

        if let Some(fd) = stdin {
            if libc::dup2(fd, libc::STDIN_FILENO) == -1 {
                libc::_exit(EXIT_CANNOT_EXECUTE);
            }
        }
        if let Some(fd) = stdout {
            if libc::dup2(fd, libc::STDOUT_FILENO) == -1 {
                libc::_exit(EXIT_CANNOT_EXECUTE);
            }
        }
        // the duplicates live on as 0 and 1; the originals must all go
        for &fd in close_set {
            libc::close(fd);
        }

        libc::execvp(image.argv_ptrs[0], image.argv_ptrs.as_ptr());

        let (message, code) = match Errno::last() {
            Errno::ENOENT | Errno::ENOTDIR => (&image.not_found, EXIT_NOT_FOUND),
            Errno::EACCES | Errno::EPERM => (&image.denied, EXIT_CANNOT_EXECUTE),
            _ => (&image.failed, EXIT_CANNOT_EXECUTE),
        };
        libc::write(libc::STDERR_FILENO, message.as_ptr().cast(), message.len());
        libc::_exit(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Limits, PrimaryStage};
    use crate::jobs::{wait_all, ExitState};

    fn run(line: &str) -> crate::jobs::PipelineResult {
        let pipeline = Pipeline::parse(line, &Limits::default()).unwrap();
        let plan = PipelinePlan::build(&pipeline).unwrap();
        let outcome = spawn(&pipeline, plan);
        assert!(outcome.error.is_none());
        wait_all(outcome.processes, PrimaryStage::First)
    }

    #[test]
    fn exec_image_is_null_terminated() {
        let pipeline = Pipeline::parse("echo a b", &Limits::default()).unwrap();
        let image = ExecImage::new(&pipeline.stages()[0]).unwrap();
        assert_eq!(image.argv_ptrs.len(), 4);
        assert!(image.argv_ptrs[3].is_null());
        assert!(String::from_utf8_lossy(&image.not_found).contains("echo: command not found"));
    }

    #[test]
    fn spawns_and_reaps_every_stage() {
        let result = run("true | true | true");
        assert_eq!(result.processes().len(), 3);
        assert!(result.all_reaped());
        assert!(result.success());
        let stages: Vec<usize> = result.processes().iter().map(|p| p.stage).collect();
        assert_eq!(stages, vec![0, 1, 2]);
    }

    #[test]
    fn missing_program_exits_not_found() {
        let result = run("pipesh_no_such_program_xyz");
        assert_eq!(result.processes().len(), 1);
        assert_eq!(
            result.primary().and_then(|p| p.status),
            Some(ExitState::Exited(EXIT_NOT_FOUND))
        );
        assert!(!result.success());
    }
}
