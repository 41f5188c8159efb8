//! Crate-wide error type.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("error reading command: {0}")]
    Input(#[source] io::Error),

    #[error("line too long ({len} bytes, limit is {max})")]
    LineTooLong { len: usize, max: usize },

    #[error("input line is not valid UTF-8")]
    NotUtf8,

    #[error("syntax error: empty command in pipeline stage {index}")]
    EmptyStage { index: usize },

    #[error("too many pipeline stages ({count}, limit is {max})")]
    TooManyStages { count: usize, max: usize },

    #[error("{program}: too many arguments ({count}, limit is {max})")]
    TooManyArguments {
        program: String,
        count: usize,
        max: usize,
    },

    #[error("argument contains a NUL byte: {0:?}")]
    InvalidArgument(String),

    #[error("pipe failed: {0}")]
    Channel(#[source] nix::Error),

    #[error("fork failed for stage {stage}: {source}")]
    Spawn {
        stage: usize,
        #[source]
        source: nix::Error,
    },

    #[error("wait failed: {0}")]
    Wait(#[source] nix::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ShellError {
    /// Errors that end the session instead of being reported at the prompt.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShellError::Input(_) | ShellError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, ShellError>;
