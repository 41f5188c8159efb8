//! Channel allocation and per-stage descriptor bindings.
//!
//! A plan for N stages owns N-1 pipes. Stage `i` reads channel `i-1` and
//! writes channel `i`; the outer ends are either inherited from the shell or
//! supplied by the caller. Every endpoint the plan owns shows up in the
//! close-set, which each child closes in full after rewiring its standard
//! streams. The parent closes its copies by dropping the plan.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use nix::fcntl::OFlag;
use nix::unistd;
use tracing::trace;

use crate::command::Pipeline;
use crate::errors::{Result, ShellError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum End {
    Read,
    Write,
}

/// Where a stage's standard input or output comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Left as the shell's own stream.
    Inherit,
    /// One end of an inter-stage channel.
    Channel { channel: usize, end: End },
    /// Caller-supplied descriptor feeding the first stage.
    Source,
    /// Caller-supplied descriptor receiving the last stage's output.
    Sink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageBinding {
    pub stdin: Endpoint,
    pub stdout: Endpoint,
}

/// A unidirectional pipe from stage `k` to stage `k + 1`.
#[derive(Debug)]
pub struct Channel {
    read: OwnedFd,
    write: OwnedFd,
}

impl Channel {
    /// Opened close-on-exec: stray copies inherited by unrelated children
    /// vanish at exec. The dup2'd standard streams are not affected.
    pub fn open() -> Result<Self> {
        let (read, write) = unistd::pipe2(OFlag::O_CLOEXEC).map_err(ShellError::Channel)?;
        Ok(Self { read, write })
    }

    pub fn raw_fd(&self, end: End) -> RawFd {
        match end {
            End::Read => self.read.as_raw_fd(),
            End::Write => self.write.as_raw_fd(),
        }
    }
}

#[derive(Debug)]
pub struct PipelinePlan {
    stages: usize,
    channels: Vec<Channel>,
    source: Option<OwnedFd>,
    sink: Option<OwnedFd>,
}

impl PipelinePlan {
    /// Plan with the outer streams inherited from the shell.
    pub fn build(pipeline: &Pipeline) -> Result<Self> {
        Self::with_io(pipeline.len(), None, None)
    }

    /// Plan whose first stage reads `source` and last stage writes `sink`
    /// when given. The plan takes ownership of both.
    ///
    /// The interactive shell always passes `None` for both (see [`build`]);
    /// the descriptors are for embedders and tests that capture a
    /// pipeline's outer streams instead of the terminal.
    ///
    /// [`build`]: PipelinePlan::build
    pub fn with_io(stages: usize, source: Option<OwnedFd>, sink: Option<OwnedFd>) -> Result<Self> {
        let wanted = stages.saturating_sub(1);
        let mut channels = Vec::with_capacity(wanted);
        for _ in 0..wanted {
            // already-opened channels are closed on drop if this fails
            channels.push(Channel::open()?);
        }
        trace!(stages, channels = channels.len(), "allocated pipeline channels");

        Ok(Self {
            stages,
            channels,
            source,
            sink,
        })
    }

    pub fn stage_count(&self) -> usize {
        self.stages
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn binding(&self, stage: usize) -> StageBinding {
        assert!(stage < self.stages, "stage {stage} out of range");

        let stdin = if stage > 0 {
            Endpoint::Channel {
                channel: stage - 1,
                end: End::Read,
            }
        } else if self.source.is_some() {
            Endpoint::Source
        } else {
            Endpoint::Inherit
        };

        let stdout = if stage + 1 < self.stages {
            Endpoint::Channel {
                channel: stage,
                end: End::Write,
            }
        } else if self.sink.is_some() {
            Endpoint::Sink
        } else {
            Endpoint::Inherit
        };

        StageBinding { stdin, stdout }
    }

    /// Descriptor behind an endpoint; `None` for inherited streams.
    pub fn raw_fd(&self, endpoint: Endpoint) -> Option<RawFd> {
        match endpoint {
            Endpoint::Inherit => None,
            Endpoint::Channel { channel, end } => Some(self.channels[channel].raw_fd(end)),
            Endpoint::Source => self.source.as_ref().map(AsRawFd::as_raw_fd),
            Endpoint::Sink => self.sink.as_ref().map(AsRawFd::as_raw_fd),
        }
    }

    /// Every descriptor owned by the plan.
    pub fn close_set(&self) -> Vec<RawFd> {
        let mut fds: Vec<RawFd> = self
            .channels
            .iter()
            .flat_map(|c| [c.raw_fd(End::Read), c.raw_fd(End::Write)])
            .collect();
        fds.extend(self.source.as_ref().map(AsRawFd::as_raw_fd));
        fds.extend(self.sink.as_ref().map(AsRawFd::as_raw_fd));
        fds
    }
}
