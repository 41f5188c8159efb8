//! Session limits and policies.

use crate::errors::{Result, ShellError};

pub const DEFAULT_MAX_LINE_LENGTH: usize = 256;
/// Five pipes, six stages.
pub const DEFAULT_MAX_STAGES: usize = 6;
pub const DEFAULT_MAX_ARGS: usize = 16;
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Which stage's pid a ledger entry and the pipeline's success refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimaryStage {
    #[default]
    First,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_line_length: usize,
    pub max_stages: usize,
    /// Program name included.
    pub max_args: usize,
    pub history_capacity: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_stages: DEFAULT_MAX_STAGES,
            max_args: DEFAULT_MAX_ARGS,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl Limits {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("max-line-length", self.max_line_length),
            ("max-stages", self.max_stages),
            ("max-args", self.max_args),
            ("history-capacity", self.history_capacity),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(ShellError::Config(format!("{name} must be at least 1")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub limits: Limits,
    pub primary_stage: PrimaryStage,
    /// Used verbatim instead of the default `user@host:cwd> ` prompt.
    pub prompt: Option<String>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.limits.validate()
    }
}
